//! Runtime configuration. Loadable from the host's JSON config block or from
//! the environment.

use std::fmt;
use std::time::Duration;

use serde::Deserialize;

use crate::protocol::{DEFAULT_API_URL, DEFAULT_STATE_API_URL};
use crate::reconciler::DEFAULT_POLL_INTERVAL;
use crate::session::{DEFAULT_AUTH_URL, DEFAULT_CLIENT_ID};
use crate::{Error, Result};

#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub username: String,
    pub password: String,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_state_api_url")]
    pub state_api_url: String,
    #[serde(default = "default_auth_url")]
    pub auth_url: String,
    #[serde(default = "default_client_id")]
    pub client_id: String,
    /// Seconds between state polls per device.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_state_api_url() -> String {
    DEFAULT_STATE_API_URL.to_string()
}

fn default_auth_url() -> String {
    DEFAULT_AUTH_URL.to_string()
}

fn default_client_id() -> String {
    DEFAULT_CLIENT_ID.to_string()
}

fn default_poll_interval_secs() -> u64 {
    DEFAULT_POLL_INTERVAL.as_secs()
}

impl Config {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            api_url: default_api_url(),
            state_api_url: default_state_api_url(),
            auth_url: default_auth_url(),
            client_id: default_client_id(),
            poll_interval_secs: default_poll_interval_secs(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(json)?;
        config.validate()
    }

    /// Reads `MAGIQ_USERNAME`, `MAGIQ_PASSWORD` and the optional
    /// `MAGIQ_POLL_INTERVAL_SECS`, `MAGIQ_API_URL`, `MAGIQ_STATE_API_URL`,
    /// `MAGIQ_AUTH_URL`, `MAGIQ_CLIENT_ID`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &str| var(key).ok_or_else(|| Error::Config(format!("missing {key}")));

        let mut config = Config::new(required("MAGIQ_USERNAME")?, required("MAGIQ_PASSWORD")?);
        if let Some(secs) = var("MAGIQ_POLL_INTERVAL_SECS") {
            config.poll_interval_secs = secs.trim().parse().map_err(|_| {
                Error::Config(format!("MAGIQ_POLL_INTERVAL_SECS is not a number: {secs}"))
            })?;
        }
        if let Some(url) = var("MAGIQ_API_URL") {
            config.api_url = url;
        }
        if let Some(url) = var("MAGIQ_STATE_API_URL") {
            config.state_api_url = url;
        }
        if let Some(url) = var("MAGIQ_AUTH_URL") {
            config.auth_url = url;
        }
        if let Some(id) = var("MAGIQ_CLIENT_ID") {
            config.client_id = id;
        }
        config.validate()
    }

    fn validate(self) -> Result<Self> {
        if self.username.trim().is_empty() || self.password.is_empty() {
            return Err(Error::Config("username and password are required".to_string()));
        }
        if self.poll_interval_secs == 0 {
            return Err(Error::Config("poll interval must be at least one second".to_string()));
        }
        Ok(self)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("api_url", &self.api_url)
            .field("state_api_url", &self.state_api_url)
            .field("auth_url", &self.auth_url)
            .field("client_id", &self.client_id)
            .field("poll_interval_secs", &self.poll_interval_secs)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn json_fills_defaults() {
        let config =
            Config::from_json(r#"{"username": "me@example.com", "password": "pw"}"#).unwrap();
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert_eq!(config.client_id, DEFAULT_CLIENT_ID);
        assert_eq!(config.poll_interval(), Duration::from_secs(5));
    }

    #[test]
    fn json_accepts_overrides() {
        let json = r#"{
            "username": "me",
            "password": "pw",
            "pollIntervalSecs": 30,
            "apiUrl": "http://localhost/api"
        }"#;
        let config = Config::from_json(json).unwrap();
        assert_eq!(config.poll_interval_secs, 30);
        assert_eq!(config.api_url, "http://localhost/api");
    }

    #[test]
    fn json_missing_password_is_decode_error() {
        let err = Config::from_json(r#"{"username": "me"}"#).unwrap_err();
        assert!(matches!(err, Error::Decode(_)), "got {err:?}");
    }

    #[test]
    fn env_requires_credentials() {
        let err = Config::from_lookup(lookup(&[("MAGIQ_USERNAME", "me")])).unwrap_err();
        match err {
            Error::Config(msg) => assert!(msg.contains("MAGIQ_PASSWORD")),
            other => panic!("expected Config, got {other:?}"),
        }
    }

    #[test]
    fn env_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("MAGIQ_USERNAME", "me"),
            ("MAGIQ_PASSWORD", "pw"),
            ("MAGIQ_POLL_INTERVAL_SECS", "12"),
            ("MAGIQ_AUTH_URL", "http://localhost/auth"),
        ]))
        .unwrap();
        assert_eq!(config.poll_interval(), Duration::from_secs(12));
        assert_eq!(config.auth_url, "http://localhost/auth");
        assert_eq!(config.state_api_url, DEFAULT_STATE_API_URL);
    }

    #[test]
    fn env_rejects_bad_interval() {
        let err = Config::from_lookup(lookup(&[
            ("MAGIQ_USERNAME", "me"),
            ("MAGIQ_PASSWORD", "pw"),
            ("MAGIQ_POLL_INTERVAL_SECS", "soon"),
        ]))
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let json = r#"{"username": "me", "password": "pw", "pollIntervalSecs": 0}"#;
        let err = Config::from_json(json).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn debug_redacts_password() {
        let config = Config::new("me", "hunter2");
        assert!(!format!("{config:?}").contains("hunter2"));
    }
}
