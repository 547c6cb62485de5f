use crate::capability::Capabilities;
use crate::normalize::ROTATION_SPEED;
use crate::readings::is_fan_only;
use crate::types::{Delta, Field, Mode, RemoteState};
use crate::{Error, Result};

const ON: f64 = 1.0;
const OFF: f64 = 0.0;

/// `FanOrTempControl` values.
const TEMPERATURE_CONTROL: f64 = 1.0;
const FAN_CONTROL: f64 = 0.0;

/// A change requested through the control surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Intent {
    SetActive(bool),
    SetMode(Mode),
    SetSetpoint(Mode, f64),
    /// Percentage, 0-100 in steps of 10.
    SetFanSpeed(f64),
    SetFanOnly(bool),
    SetManualFanOverride(bool),
}

/// Compute the field changes that carry out `intent` on a device currently in
/// `state`. Pure; nothing is sent.
pub fn translate(intent: &Intent, state: &RemoteState, caps: &Capabilities) -> Result<Delta> {
    match *intent {
        Intent::SetActive(on) => Ok(set_active(on, state)),
        Intent::SetMode(mode) => set_mode(mode, caps),
        Intent::SetSetpoint(mode, celsius) => set_setpoint(mode, celsius, caps),
        Intent::SetFanSpeed(percent) => set_fan_speed(percent, state, caps),
        Intent::SetFanOnly(on) => set_fan_only(on, state, caps),
        Intent::SetManualFanOverride(manual) => Ok(Delta::new().with(
            Field::FanOrTempControl,
            if manual { FAN_CONTROL } else { TEMPERATURE_CONTROL },
        )),
    }
}

fn unsupported(mode: Mode) -> Error {
    Error::Validation(format!("device has no {mode} capability"))
}

fn set_active(on: bool, state: &RemoteState) -> Delta {
    let target = if on { ON } else { OFF };
    if state.get(Field::SystemOn) == Some(target) {
        return Delta::new();
    }
    Delta::new().with(Field::SystemOn, target)
}

// The firmware accepts heat and cool running together, so every other
// running flag is cleared explicitly.
fn set_mode(mode: Mode, caps: &Capabilities) -> Result<Delta> {
    let running = caps.running_field(mode).ok_or_else(|| unsupported(mode))?;

    let mut delta = Delta::new();
    delta
        .set(Field::SystemOn, ON)
        .set(Field::HeaterRunning, OFF)
        .set(Field::HeaterFanOnly, OFF)
        .set(Field::CoolerFanOnly, OFF);
    for field in Field::COOLING_RUNNING {
        delta.set(field, OFF);
    }
    delta.set(running, ON);
    Ok(delta)
}

// A temperature target and a fixed fan speed cannot both hold in one mode;
// the target wins.
fn set_setpoint(mode: Mode, celsius: f64, caps: &Capabilities) -> Result<Delta> {
    let range = caps.range(mode).ok_or_else(|| unsupported(mode))?;
    if !celsius.is_finite() {
        return Err(Error::Validation(format!("setpoint is not a number: {celsius}")));
    }
    Ok(Delta::new()
        .with(Field::FanOrTempControl, TEMPERATURE_CONTROL)
        .with(mode.setpoint_field(), range.normalize(celsius))
        .with(mode.fan_only_field(), OFF))
}

fn set_fan_speed(percent: f64, state: &RemoteState, caps: &Capabilities) -> Result<Delta> {
    if !percent.is_finite() {
        return Err(Error::Validation(format!("fan speed is not a number: {percent}")));
    }
    let mut percent = ROTATION_SPEED.normalize(percent);
    if is_fan_only(state, caps) && percent < ROTATION_SPEED.step {
        percent = ROTATION_SPEED.step;
    }

    let speed = (percent / 10.0).round();
    let control = if speed == 0.0 { TEMPERATURE_CONTROL } else { FAN_CONTROL };
    Ok(Delta::new()
        .with(Field::FanOrTempControl, control)
        .with(Field::CoolerFanSpeed, speed)
        .with(Field::HeaterFanSpeed, speed))
}

// Speed 0 would read as "not fan-only", so fan-only forces at least 1.
// Turning it off clears both flags whatever is fitted.
fn set_fan_only(on: bool, state: &RemoteState, caps: &Capabilities) -> Result<Delta> {
    if !on {
        return Ok(Delta::new()
            .with(Field::HeaterFanOnly, OFF)
            .with(Field::CoolerFanOnly, OFF));
    }

    let modes = caps.supported_modes();
    if modes.is_empty() {
        return Err(Error::Validation(
            "device has neither heating nor cooling".to_string(),
        ));
    }

    let mut delta = Delta::new();
    for mode in modes {
        delta.set(mode.fan_only_field(), ON);
        if state.number(mode.fan_speed_field()) < 1.0 {
            delta.set(mode.fan_speed_field(), 1.0);
        }
    }
    Ok(delta)
}
