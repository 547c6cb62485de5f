use serde_json::{Map, Value};

use crate::types::*;

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct FieldChange {
    pub key: String,
    pub old: Value,
    pub new: Value,
}

/// Top-level keys whose value differs between two state records. Keys that
/// disappeared are reported with `new = null`.
pub(crate) fn diff_fields(
    previous: &Map<String, Value>,
    current: &Map<String, Value>,
) -> Vec<FieldChange> {
    let mut changes: Vec<FieldChange> = current
        .iter()
        .filter_map(|(key, new)| {
            let old = previous.get(key).unwrap_or(&Value::Null);
            (old != new).then(|| FieldChange {
                key: key.clone(),
                old: old.clone(),
                new: new.clone(),
            })
        })
        .collect();

    changes.extend(
        previous
            .iter()
            .filter(|(key, _)| !current.contains_key(*key))
            .map(|(key, old)| FieldChange {
                key: key.clone(),
                old: old.clone(),
                new: Value::Null,
            }),
    );
    changes
}

pub(crate) fn map_typed_event(
    device_id: &str,
    change: &FieldChange,
    current: &RemoteState,
) -> Option<Event> {
    let field = Field::from_key(&change.key)?;
    let device_id = device_id.to_string();
    match field {
        Field::SystemOn => Some(Event::PowerChanged {
            device_id,
            on: current.flag(field),
        }),
        Field::InternalTemperature => Some(Event::TemperatureChanged {
            device_id,
            celsius: current.get(field)?,
        }),
        Field::HeaterSetpoint | Field::CoolerSetpoint => Some(Event::SetpointChanged {
            device_id,
            mode: if field == Field::HeaterSetpoint { Mode::Heat } else { Mode::Cool },
            celsius: current.get(field)?,
        }),
        Field::HeaterFanSpeed | Field::CoolerFanSpeed => Some(Event::FanSpeedChanged {
            device_id,
            mode: if field == Field::HeaterFanSpeed { Mode::Heat } else { Mode::Cool },
            speed: current.get(field)?.round().clamp(0.0, f64::from(u8::MAX)) as u8,
        }),
        Field::FanOrTempControl => Some(Event::ControlModeChanged {
            device_id,
            manual_fan: current.get(field)? == 0.0,
        }),
        _ => None,
    }
}

pub(crate) fn generic_event(device_id: &str, change: &FieldChange) -> Event {
    Event::FieldChanged {
        device_id: device_id.to_string(),
        key: change.key.clone(),
        value: change.new.clone(),
    }
}

/// Events for everything that moved between two snapshots. Fields with a
/// typed meaning get a typed event; the rest are reported generically.
pub(crate) fn snapshot_events(
    device_id: &str,
    previous: Option<&RemoteState>,
    current: &RemoteState,
) -> Vec<Event> {
    let empty = Map::new();
    let previous = previous.map(RemoteState::raw).unwrap_or(&empty);
    diff_fields(previous, current.raw())
        .iter()
        .map(|change| {
            map_typed_event(device_id, change, current)
                .unwrap_or_else(|| generic_event(device_id, change))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(v: Value) -> Map<String, Value> {
        match v {
            Value::Object(m) => m,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn diff_detects_changed_field() {
        let prev = map(json!({"CTemp": 22, "SystemOn": 1}));
        let curr = map(json!({"CTemp": 24, "SystemOn": 1}));
        let changes = diff_fields(&prev, &curr);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].key, "CTemp");
        assert_eq!(changes[0].old, json!(22));
        assert_eq!(changes[0].new, json!(24));
    }

    #[test]
    fn diff_ignores_unchanged() {
        let val = map(json!({"CTemp": 22, "SystemOn": 1}));
        assert!(diff_fields(&val, &val).is_empty());
    }

    #[test]
    fn diff_reports_new_and_removed_keys() {
        let prev = map(json!({"Gone": 1}));
        let curr = map(json!({"CTemp": 22}));
        let changes = diff_fields(&prev, &curr);
        assert_eq!(changes.len(), 2);
        assert!(changes.iter().any(|c| c.key == "CTemp" && c.old.is_null()));
        assert!(changes.iter().any(|c| c.key == "Gone" && c.new.is_null()));
    }

    #[test]
    fn known_fields_map_to_typed_events() {
        let current: RemoteState = serde_json::from_value(json!({
            "SystemOn": 1, "HTemp": 21, "CFanSpeed": 4, "FanOrTempControl": 0
        }))
        .unwrap();
        let events = snapshot_events("dev1", None, &current);
        assert!(events.contains(&Event::PowerChanged { device_id: "dev1".into(), on: true }));
        assert!(events.contains(&Event::SetpointChanged {
            device_id: "dev1".into(),
            mode: Mode::Heat,
            celsius: 21.0
        }));
        assert!(events.contains(&Event::FanSpeedChanged {
            device_id: "dev1".into(),
            mode: Mode::Cool,
            speed: 4
        }));
        assert!(events.contains(&Event::ControlModeChanged {
            device_id: "dev1".into(),
            manual_fan: true
        }));
    }

    #[test]
    fn unknown_field_emits_generic() {
        let prev: RemoteState = serde_json::from_value(json!({"ProgramMode": 0})).unwrap();
        let curr: RemoteState = serde_json::from_value(json!({"ProgramMode": 2})).unwrap();
        let events = snapshot_events("dev1", Some(&prev), &curr);
        match events.as_slice() {
            [Event::FieldChanged { device_id, key, value }] => {
                assert_eq!(device_id, "dev1");
                assert_eq!(key, "ProgramMode");
                assert_eq!(value, &json!(2));
            }
            other => panic!("expected one FieldChanged, got {other:?}"),
        }
    }

    #[test]
    fn identical_snapshots_emit_nothing() {
        let s: RemoteState = serde_json::from_value(json!({"SystemOn": 1, "CTemp": 22})).unwrap();
        assert!(snapshot_events("dev1", Some(&s), &s).is_empty());
    }
}
