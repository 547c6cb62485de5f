use std::sync::{Arc, Mutex};

use reqwest::header::AUTHORIZATION;
use reqwest::{StatusCode, Url};
use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::capability::SystemDetails;
use crate::logger::MessageLogger;
use crate::protocol::{
    devices_url, running_state_url, system_details_url, update_state_body, update_state_url,
    upstream_message,
};
use crate::session::SessionCache;
use crate::types::{DeviceDescriptor, RemoteState};
use crate::{Error, Result};

/// Authenticated access to the remote controller API.
pub(crate) struct Api {
    http: reqwest::Client,
    api_url: String,
    state_api_url: String,
    session: Arc<SessionCache>,
    logger: Option<Mutex<MessageLogger>>,
}

impl Api {
    pub(crate) fn new(
        http: reqwest::Client,
        api_url: String,
        state_api_url: String,
        session: Arc<SessionCache>,
        logger: Option<MessageLogger>,
    ) -> Self {
        Self {
            http,
            api_url,
            state_api_url,
            session,
            logger: logger.map(Mutex::new),
        }
    }

    pub fn session(&self) -> &Arc<SessionCache> {
        &self.session
    }

    pub async fn list_devices(&self) -> Result<Vec<DeviceDescriptor>> {
        let body = self.get(devices_url(&self.api_url)?).await?;
        let devices: Vec<DeviceDescriptor> = serde_json::from_str(&body)?;
        debug!(count = devices.len(), "listed devices");
        Ok(devices)
    }

    pub async fn running_state(&self, device_id: &str) -> Result<RemoteState> {
        let body = self.get(running_state_url(&self.api_url, device_id)?).await?;
        let value: Value = serde_json::from_str(&body)?;
        self.with_logger(|l| l.log_poll(device_id, 200, &value));
        let state: RemoteState = serde_json::from_value(value)?;
        trace!(device_id, fields = state.raw().len(), "fetched running state");
        Ok(state)
    }

    pub async fn system_details(&self, device_id: &str) -> Result<SystemDetails> {
        let body = self.get(system_details_url(&self.api_url, device_id)?).await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Replace the device's desired state with `state` in full.
    pub async fn update_state(&self, device_id: &str, state: &RemoteState) -> Result<()> {
        let url = update_state_url(&self.state_api_url, device_id)?;
        let body = update_state_body(device_id, state);
        debug!(device_id, "updating state");
        self.with_logger(|l| l.log_write(device_id, &body));

        let auth = self.session.auth_header().await?;
        let resp = self
            .http
            .put(url)
            .header(AUTHORIZATION, auth)
            .json(&body)
            .send()
            .await?;
        self.read_body(resp).await?;
        Ok(())
    }

    async fn get(&self, url: Url) -> Result<String> {
        self.with_logger(|l| l.log_request("GET", url.path()));
        let auth = self.session.auth_header().await?;
        let resp = self.http.get(url).header(AUTHORIZATION, auth).send().await?;
        self.read_body(resp).await
    }

    async fn read_body(&self, resp: reqwest::Response) -> Result<String> {
        let status = resp.status();
        let body = resp.text().await?;

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            warn!(%status, "token rejected by remote API");
            self.session.invalidate().await;
            return Err(Error::Authentication(
                upstream_message(&body).unwrap_or_else(|| format!("token rejected ({status})")),
            ));
        }
        if !status.is_success() {
            return Err(Error::Status {
                status: status.as_u16(),
                message: upstream_message(&body).unwrap_or(body),
            });
        }
        Ok(body)
    }

    fn with_logger(&self, f: impl FnOnce(&mut MessageLogger)) {
        if let Some(logger) = &self.logger
            && let Ok(mut logger) = logger.lock()
        {
            f(&mut logger);
        }
    }
}
