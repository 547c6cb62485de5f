//! Control-surface values derived from an effective state.
//!
//! Everything here takes the merged snapshot+overlay, so a read straight after
//! a command reflects that command.

use crate::capability::Capabilities;
use crate::normalize::ROTATION_SPEED;
use crate::types::{CurrentState, Field, Mode, RemoteState};

pub fn is_active(state: &RemoteState) -> bool {
    state.flag(Field::SystemOn)
}

/// Whether `mode` is running. Always false for a mode the device lacks.
pub fn is_running(state: &RemoteState, caps: &Capabilities, mode: Mode) -> bool {
    caps.running_field(mode).is_some_and(|f| state.flag(f))
}

pub fn is_heating_running(state: &RemoteState, caps: &Capabilities) -> bool {
    is_running(state, caps, Mode::Heat)
}

pub fn is_cooling_running(state: &RemoteState, caps: &Capabilities) -> bool {
    is_running(state, caps, Mode::Cool)
}

pub fn is_fan_only(state: &RemoteState, caps: &Capabilities) -> bool {
    caps.supported_modes()
        .into_iter()
        .any(|m| state.flag(m.fan_only_field()))
}

/// Fixed fan speed engaged instead of temperature control.
pub fn manual_fan_override(state: &RemoteState) -> bool {
    state.get(Field::FanOrTempControl) == Some(0.0)
}

pub fn current_state(state: &RemoteState, caps: &Capabilities) -> CurrentState {
    if !is_active(state) {
        CurrentState::Inactive
    } else if is_heating_running(state, caps) {
        CurrentState::Heating
    } else if is_cooling_running(state, caps) {
        CurrentState::Cooling
    } else {
        CurrentState::Idle
    }
}

/// The mode a target-mode control should show. Heating only when it is
/// actually selected; otherwise cooling if fitted.
pub fn target_mode(state: &RemoteState, caps: &Capabilities) -> Option<Mode> {
    if is_heating_running(state, caps) {
        Some(Mode::Heat)
    } else if caps.cooling.is_some() {
        Some(Mode::Cool)
    } else if caps.heating.is_some() {
        Some(Mode::Heat)
    } else {
        None
    }
}

pub fn current_temperature(state: &RemoteState) -> Option<f64> {
    state.get(Field::InternalTemperature)
}

/// Setpoint for `mode`, pulled into the capability's range.
pub fn setpoint(state: &RemoteState, caps: &Capabilities, mode: Mode) -> Option<f64> {
    let range = caps.range(mode)?;
    state.get(mode.setpoint_field()).map(|v| range.normalize(v))
}

/// Fan speed of the running mode as a 0-100 percentage.
pub fn rotation_speed(state: &RemoteState, caps: &Capabilities) -> f64 {
    let mode = if is_heating_running(state, caps) {
        Mode::Heat
    } else {
        Mode::Cool
    };
    ROTATION_SPEED.normalize(state.number(mode.fan_speed_field()) * 10.0)
}

/// Everything a control surface shows for one device.
#[derive(Debug, Clone, PartialEq)]
pub struct Status {
    pub active: bool,
    pub current: CurrentState,
    pub target: Option<Mode>,
    pub temperature: Option<f64>,
    pub heat_setpoint: Option<f64>,
    pub cool_setpoint: Option<f64>,
    pub rotation_speed: f64,
    pub fan_only: bool,
    pub manual_fan: bool,
}

impl Status {
    pub fn from_state(state: &RemoteState, caps: &Capabilities) -> Self {
        Self {
            active: is_active(state),
            current: current_state(state, caps),
            target: target_mode(state, caps),
            temperature: current_temperature(state),
            heat_setpoint: setpoint(state, caps, Mode::Heat),
            cool_setpoint: setpoint(state, caps, Mode::Cool),
            rotation_speed: rotation_speed(state, caps),
            fan_only: is_fan_only(state, caps),
            manual_fan: manual_fan_override(state),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{CoolingCapability, CoolingVariant, HeatingCapability, TemperatureRange};
    use serde_json::json;

    fn state(v: serde_json::Value) -> RemoteState {
        serde_json::from_value(v).unwrap()
    }

    fn evap_only() -> Capabilities {
        Capabilities {
            heating: None,
            cooling: Some(CoolingCapability {
                variant: CoolingVariant::Evaporative,
                range: TemperatureRange { min: 19.0, max: 28.0 },
            }),
        }
    }

    fn heat_and_inverter() -> Capabilities {
        Capabilities {
            heating: Some(HeatingCapability {
                range: TemperatureRange { min: 18.0, max: 28.0 },
            }),
            cooling: Some(CoolingCapability {
                variant: CoolingVariant::InverterAoc,
                range: TemperatureRange { min: 16.0, max: 30.0 },
            }),
        }
    }

    #[test]
    fn running_flags_follow_the_capability_key() {
        let s = state(json!({"SystemOn": 1, "IAOCRunning": 1, "EvapCRunning": 0}));
        assert!(is_cooling_running(&s, &heat_and_inverter()));
        assert!(!is_cooling_running(&s, &evap_only()));
    }

    #[test]
    fn absent_capability_never_runs() {
        let s = state(json!({"SystemOn": 1, "HRunning": 1}));
        assert!(!is_heating_running(&s, &evap_only()));
        assert_eq!(current_state(&s, &evap_only()), CurrentState::Idle);
    }

    #[test]
    fn current_state_requires_power() {
        let s = state(json!({"SystemOn": 0, "HRunning": 1}));
        assert_eq!(current_state(&s, &heat_and_inverter()), CurrentState::Inactive);
        let s = state(json!({"SystemOn": 1, "HRunning": 1}));
        assert_eq!(current_state(&s, &heat_and_inverter()), CurrentState::Heating);
    }

    #[test]
    fn rotation_speed_uses_running_mode() {
        let s = state(json!({"HRunning": 1, "HFanSpeed": 7, "CFanSpeed": 3}));
        assert_eq!(rotation_speed(&s, &heat_and_inverter()), 70.0);
        assert_eq!(rotation_speed(&s, &evap_only()), 30.0);
    }

    #[test]
    fn setpoint_reads_are_normalized() {
        let s = state(json!({"CTemp": 35, "HTemp": 21}));
        assert_eq!(setpoint(&s, &evap_only(), Mode::Cool), Some(28.0));
        assert_eq!(setpoint(&s, &evap_only(), Mode::Heat), None);
        assert_eq!(setpoint(&s, &heat_and_inverter(), Mode::Heat), Some(21.0));
    }

    #[test]
    fn fan_only_is_capability_gated() {
        let s = state(json!({"HFanOnly": 1, "CFanOnlyOrCool": 0}));
        assert!(!is_fan_only(&s, &evap_only()));
        assert!(is_fan_only(&s, &heat_and_inverter()));
    }

    #[test]
    fn status_summarizes_state() {
        let s = state(json!({
            "SystemOn": 1, "EvapCRunning": 1, "InternalTemp": 26,
            "CTemp": 23, "CFanSpeed": 5, "FanOrTempControl": 0
        }));
        let status = Status::from_state(&s, &evap_only());
        assert!(status.active);
        assert_eq!(status.current, CurrentState::Cooling);
        assert_eq!(status.target, Some(Mode::Cool));
        assert_eq!(status.temperature, Some(26.0));
        assert_eq!(status.cool_setpoint, Some(23.0));
        assert_eq!(status.heat_setpoint, None);
        assert_eq!(status.rotation_speed, 50.0);
        assert!(status.manual_fan);
        assert!(!status.fan_only);
    }
}
