mod api;
pub mod capability;
mod client;
mod config;
mod diff;
mod error;
mod logger;
pub mod normalize;
mod protocol;
pub mod readings;
mod reconciler;
pub mod session;
pub mod translator;
mod types;

pub use capability::{
    Capabilities, CoolingCapability, CoolingVariant, HeatingCapability, TemperatureRange,
};
pub use client::{DiscoveredDevice, MagiqClient, MagiqClientBuilder};
pub use config::Config;
pub use error::{Error, Result};
pub use logger::MessageLogMode;
pub use readings::Status;
pub use reconciler::{DEFAULT_POLL_INTERVAL, Reconciler};
pub use session::{AuthSession, CognitoExchange, CredentialExchange, SessionCache, StaticExchange};
pub use translator::{Intent, translate};
pub use types::*;
