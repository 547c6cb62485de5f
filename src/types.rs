use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Device fields this crate reads or writes. The remote state carries more
/// keys than these; unknown keys are preserved but never interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Field {
    SystemOn,
    HeaterRunning,
    EvapCoolerRunning,
    FixedAocRunning,
    InverterAocRunning,
    HeaterFanOnly,
    CoolerFanOnly,
    HeaterFanSpeed,
    CoolerFanSpeed,
    HeaterSetpoint,
    CoolerSetpoint,
    /// 1 = temperature control, 0 = fixed (manual) fan speed.
    FanOrTempControl,
    InternalTemperature,
}

impl Field {
    pub const ALL: [Field; 13] = [
        Field::SystemOn,
        Field::HeaterRunning,
        Field::EvapCoolerRunning,
        Field::FixedAocRunning,
        Field::InverterAocRunning,
        Field::HeaterFanOnly,
        Field::CoolerFanOnly,
        Field::HeaterFanSpeed,
        Field::CoolerFanSpeed,
        Field::HeaterSetpoint,
        Field::CoolerSetpoint,
        Field::FanOrTempControl,
        Field::InternalTemperature,
    ];

    pub const COOLING_RUNNING: [Field; 3] = [
        Field::EvapCoolerRunning,
        Field::FixedAocRunning,
        Field::InverterAocRunning,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            Field::SystemOn => "SystemOn",
            Field::HeaterRunning => "HRunning",
            Field::EvapCoolerRunning => "EvapCRunning",
            Field::FixedAocRunning => "FAOCRunning",
            Field::InverterAocRunning => "IAOCRunning",
            Field::HeaterFanOnly => "HFanOnly",
            Field::CoolerFanOnly => "CFanOnlyOrCool",
            Field::HeaterFanSpeed => "HFanSpeed",
            Field::CoolerFanSpeed => "CFanSpeed",
            Field::HeaterSetpoint => "HTemp",
            Field::CoolerSetpoint => "CTemp",
            Field::FanOrTempControl => "FanOrTempControl",
            Field::InternalTemperature => "InternalTemp",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Field::ALL.into_iter().find(|f| f.key() == key)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    Heat,
    Cool,
}

impl Mode {
    pub fn setpoint_field(&self) -> Field {
        match self {
            Mode::Heat => Field::HeaterSetpoint,
            Mode::Cool => Field::CoolerSetpoint,
        }
    }

    pub fn fan_only_field(&self) -> Field {
        match self {
            Mode::Heat => Field::HeaterFanOnly,
            Mode::Cool => Field::CoolerFanOnly,
        }
    }

    pub fn fan_speed_field(&self) -> Field {
        match self {
            Mode::Heat => Field::HeaterFanSpeed,
            Mode::Cool => Field::CoolerFanSpeed,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Heat => f.write_str("heat"),
            Mode::Cool => f.write_str("cool"),
        }
    }
}

/// What the unit is doing right now, as a control surface would show it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CurrentState {
    #[default]
    Inactive,
    Idle,
    Heating,
    Cooling,
}

/// A controller as returned by the device listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    #[serde(rename = "MacAddressId")]
    pub device_id: String,
    #[serde(flatten)]
    pub metadata: Map<String, Value>,
}

impl DeviceDescriptor {
    pub fn display_name(&self) -> &str {
        self.metadata
            .get("SystemName")
            .and_then(|v| v.as_str())
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(&self.device_id)
    }
}

/// Field changes keyed by [`Field`]. Used both as a translator output and as
/// the pending overlay.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Delta(BTreeMap<Field, f64>);

impl Delta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, field: Field, value: f64) -> &mut Self {
        self.0.insert(field, value);
        self
    }

    pub fn with(mut self, field: Field, value: f64) -> Self {
        self.0.insert(field, value);
        self
    }

    pub fn get(&self, field: Field) -> Option<f64> {
        self.0.get(&field).copied()
    }

    pub fn contains(&self, field: Field) -> bool {
        self.0.contains_key(&field)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// Later writes win, matching how the overlay accumulates commands.
    pub fn merge(&mut self, other: &Delta) {
        for (field, value) in other.iter() {
            self.0.insert(field, value);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Field, f64)> + '_ {
        self.0.iter().map(|(f, v)| (*f, *v))
    }
}

impl FromIterator<(Field, f64)> for Delta {
    fn from_iter<I: IntoIterator<Item = (Field, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// A complete device state record as returned by the running-state endpoint.
/// Stored verbatim so full-state writes carry fields this crate never reads.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteState(Map<String, Value>);

impl RemoteState {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    pub fn raw(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_raw(self) -> Map<String, Value> {
        self.0
    }

    pub fn get(&self, field: Field) -> Option<f64> {
        self.0.get(field.key()).and_then(as_number)
    }

    /// Missing or non-numeric fields read as 0, as the device reports "off".
    pub fn number(&self, field: Field) -> f64 {
        self.get(field).unwrap_or(0.0)
    }

    pub fn flag(&self, field: Field) -> bool {
        self.get(field) == Some(1.0)
    }

    pub fn set(&mut self, field: Field, value: f64) {
        self.0.insert(field.key().to_string(), number_value(value));
    }

    /// Snapshot with the overlay applied on top.
    pub fn with_delta(&self, delta: &Delta) -> RemoteState {
        let mut merged = self.clone();
        for (field, value) in delta.iter() {
            merged.set(field, value);
        }
        merged
    }
}

impl From<Map<String, Value>> for RemoteState {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Integral values go back on the wire as integers; the firmware expects `1`,
/// not `1.0`, for its flags and speeds.
pub(crate) fn number_value(value: f64) -> Value {
    if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        Value::from(value as i64)
    } else {
        Value::from(value)
    }
}

/// Events emitted after a refresh when a field changed between snapshots.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    PowerChanged { device_id: String, on: bool },
    TemperatureChanged { device_id: String, celsius: f64 },
    SetpointChanged { device_id: String, mode: Mode, celsius: f64 },
    FanSpeedChanged { device_id: String, mode: Mode, speed: u8 },
    ControlModeChanged { device_id: String, manual_fan: bool },
    FieldChanged { device_id: String, key: String, value: Value },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn state(v: Value) -> RemoteState {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn field_keys_roundtrip() {
        for field in Field::ALL {
            assert_eq!(Field::from_key(field.key()), Some(field));
        }
        assert_eq!(Field::from_key("NotAField"), None);
    }

    #[test]
    fn overlay_wins_and_unknown_fields_survive() {
        let snapshot = state(json!({"SystemOn": 0, "CTemp": 22, "Serial": "abc"}));
        let delta = Delta::new().with(Field::SystemOn, 1.0);
        let merged = snapshot.with_delta(&delta);
        assert!(merged.flag(Field::SystemOn));
        assert_eq!(merged.get(Field::CoolerSetpoint), Some(22.0));
        assert_eq!(merged.raw()["Serial"], "abc");
        assert_eq!(merged.raw()["SystemOn"], json!(1));
    }

    #[test]
    fn numbers_read_from_loose_encodings() {
        let s = state(json!({"SystemOn": true, "CTemp": "23", "HTemp": null}));
        assert!(s.flag(Field::SystemOn));
        assert_eq!(s.get(Field::CoolerSetpoint), Some(23.0));
        assert_eq!(s.get(Field::HeaterSetpoint), None);
        assert_eq!(s.number(Field::HeaterSetpoint), 0.0);
    }

    #[test]
    fn fractional_values_stay_fractional() {
        assert_eq!(number_value(21.5), json!(21.5));
        assert_eq!(number_value(3.0), json!(3));
    }

    #[test]
    fn delta_merge_last_write_wins() {
        let mut overlay = Delta::new().with(Field::CoolerFanSpeed, 3.0);
        overlay.merge(&Delta::new().with(Field::CoolerFanSpeed, 5.0).with(Field::SystemOn, 1.0));
        assert_eq!(overlay.get(Field::CoolerFanSpeed), Some(5.0));
        assert_eq!(overlay.len(), 2);
    }

    #[test]
    fn display_name_falls_back_to_id() {
        let d: DeviceDescriptor = serde_json::from_value(json!({
            "MacAddressId": "aa:bb",
            "SystemName": "Lounge"
        }))
        .unwrap();
        assert_eq!(d.display_name(), "Lounge");
        let d: DeviceDescriptor = serde_json::from_value(json!({"MacAddressId": "aa:bb"})).unwrap();
        assert_eq!(d.display_name(), "aa:bb");
    }
}
