use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::Write;

use chrono::Utc;
use serde_json::{Map, Value, json};
use tracing::warn;

use crate::diff::diff_fields;

/// How polled state bodies are written to the message log.
pub enum MessageLogMode {
    /// Every poll body in full.
    Full,
    /// The first body per device in full, then only changed fields.
    Diffed,
}

/// Append-only NDJSON record of the traffic with the remote API.
pub(crate) struct MessageLogger {
    mode: MessageLogMode,
    file: File,
    previous_state: HashMap<String, Map<String, Value>>,
}

impl MessageLogger {
    pub fn new(mode: MessageLogMode, path: &str) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            mode,
            file,
            previous_state: HashMap::new(),
        })
    }

    pub fn log_request(&mut self, method: &str, path: &str) {
        let entry = json!({
            "ts": Utc::now().to_rfc3339(),
            "dir": "req",
            "method": method,
            "path": path,
        });
        self.write_line(&entry);
    }

    pub fn log_write(&mut self, device_id: &str, body: &Value) {
        let entry = json!({
            "ts": Utc::now().to_rfc3339(),
            "dir": "write",
            "device": device_id,
            "body": body,
        });
        self.write_line(&entry);
    }

    pub fn log_poll(&mut self, device_id: &str, status: u16, body: &Value) {
        let fields = match body {
            Value::Object(fields) if matches!(self.mode, MessageLogMode::Diffed) => fields,
            _ => {
                let entry = json!({
                    "ts": Utc::now().to_rfc3339(),
                    "dir": "poll",
                    "device": device_id,
                    "status": status,
                    "body": body,
                });
                self.write_line(&entry);
                return;
            }
        };

        let entry = match self.previous_state.get(device_id) {
            None => json!({
                "ts": Utc::now().to_rfc3339(),
                "dir": "poll",
                "device": device_id,
                "status": status,
                "full": true,
                "body": body,
            }),
            Some(prev) => {
                let changes: Vec<Value> = diff_fields(prev, fields)
                    .into_iter()
                    .map(|c| json!({ "field": c.key, "old": c.old, "new": c.new }))
                    .collect();
                json!({
                    "ts": Utc::now().to_rfc3339(),
                    "dir": "poll",
                    "device": device_id,
                    "status": status,
                    "changes": changes,
                })
            }
        };
        self.previous_state.insert(device_id.to_string(), fields.clone());
        self.write_line(&entry);
    }

    fn write_line(&mut self, entry: &Value) {
        if let Ok(line) = serde_json::to_string(entry)
            && let Err(e) = writeln!(self.file, "{line}")
        {
            warn!("failed to write log entry: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn lines(path: &str) -> Vec<Value> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn log_request_writes_ndjson() {
        let tmp = NamedTempFile::new().unwrap();
        let path = tmp.path().to_str().unwrap();
        let mut logger = MessageLogger::new(MessageLogMode::Full, path).unwrap();
        logger.log_request("GET", "/api/loadmobiledevice");

        let lines = lines(path);
        assert_eq!(lines[0]["dir"], "req");
        assert_eq!(lines[0]["method"], "GET");
        assert!(lines[0]["ts"].as_str().is_some());
    }

    #[test]
    fn diffed_mode_is_tracked_per_device() {
        let tmp = NamedTempFile::new().unwrap();
        let path = tmp.path().to_str().unwrap();
        let mut logger = MessageLogger::new(MessageLogMode::Diffed, path).unwrap();

        logger.log_poll("a", 200, &json!({"CTemp": 22, "SystemOn": 1}));
        logger.log_poll("b", 200, &json!({"CTemp": 20}));
        logger.log_poll("a", 200, &json!({"CTemp": 24, "SystemOn": 1}));
        logger.log_poll("a", 200, &json!({"CTemp": 24, "SystemOn": 1}));

        let lines = lines(path);
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0]["full"], true);
        assert_eq!(lines[1]["full"], true);
        assert_eq!(lines[1]["device"], "b");
        let changes = lines[2]["changes"].as_array().unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0]["field"], "CTemp");
        assert_eq!(changes[0]["new"], 24);
        assert_eq!(lines[3]["changes"].as_array().unwrap().len(), 0);
    }

    #[test]
    fn full_mode_logs_whole_body() {
        let tmp = NamedTempFile::new().unwrap();
        let path = tmp.path().to_str().unwrap();
        let mut logger = MessageLogger::new(MessageLogMode::Full, path).unwrap();
        logger.log_poll("a", 200, &json!({"CTemp": 22}));
        logger.log_poll("a", 200, &json!({"CTemp": 22}));

        let lines = lines(path);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1]["body"]["CTemp"], 22);
    }

    #[test]
    fn log_write_captures_device() {
        let tmp = NamedTempFile::new().unwrap();
        let path = tmp.path().to_str().unwrap();
        let mut logger = MessageLogger::new(MessageLogMode::Full, path).unwrap();
        logger.log_write("0A1B", &json!({"state": {"SystemOn": 1}}));

        let lines = lines(path);
        assert_eq!(lines[0]["dir"], "write");
        assert_eq!(lines[0]["device"], "0A1B");
        assert_eq!(lines[0]["body"]["state"]["SystemOn"], 1);
    }
}
