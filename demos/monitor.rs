use magiq_touch::{Config, MagiqClientBuilder, MessageLogMode};
use std::env;
use std::time::Duration;

#[tokio::main]
async fn main() -> magiq_touch::Result<()> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env()?;
    let log_path = env::args().nth(1);

    let mut builder = MagiqClientBuilder::from_config(&config).on_event(|event| {
        println!("{event:?}");
    });
    if let Some(path) = log_path {
        builder = builder.message_log(MessageLogMode::Diffed, path);
    }
    let client = builder.build()?;

    println!("Discovering devices...");
    let devices = client.discover().await?;
    if devices.is_empty() {
        println!("No devices found.");
        return Ok(());
    }

    loop {
        for device in &devices {
            let id = &device.descriptor.device_id;
            if let Some(status) = client.status(id) {
                println!(
                    "[{}] {:?} | target: {:?} | inside: {} | heat: {:?} | cool: {:?} | fan: {}%{}",
                    device.descriptor.display_name(),
                    status.current,
                    status.target,
                    status
                        .temperature
                        .map(|t| format!("{t:.1}\u{00b0}C"))
                        .unwrap_or_else(|| "?".to_string()),
                    status.heat_setpoint,
                    status.cool_setpoint,
                    status.rotation_speed,
                    if status.fan_only { " | FAN ONLY" } else { "" },
                );
            }
        }
        tokio::time::sleep(Duration::from_secs(30)).await;
    }
}
