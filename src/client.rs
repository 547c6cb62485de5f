use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::api::Api;
use crate::capability::{self, Capabilities};
use crate::config::Config;
use crate::logger::{MessageLogMode, MessageLogger};
use crate::protocol::{DEFAULT_API_URL, DEFAULT_STATE_API_URL};
use crate::readings::Status;
use crate::reconciler::{DEFAULT_POLL_INTERVAL, EventCallback, Reconciler, SnapshotCallback};
use crate::session::{
    CognitoExchange, CredentialExchange, DEFAULT_AUTH_URL, DEFAULT_CLIENT_ID, SessionCache,
};
use crate::translator::{Intent, translate};
use crate::types::{Delta, DeviceDescriptor, Event, RemoteState};
use crate::{Error, Result};

pub struct MagiqClientBuilder {
    credentials: Option<(String, String)>,
    exchange: Option<Arc<dyn CredentialExchange>>,
    api_url: String,
    state_api_url: String,
    auth_url: String,
    client_id: String,
    poll_interval: Duration,
    event_callbacks: Vec<EventCallback>,
    snapshot_callbacks: Vec<SnapshotCallback>,
    log_mode: Option<MessageLogMode>,
    log_path: Option<String>,
}

impl Default for MagiqClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MagiqClientBuilder {
    pub fn new() -> Self {
        Self {
            credentials: None,
            exchange: None,
            api_url: DEFAULT_API_URL.to_string(),
            state_api_url: DEFAULT_STATE_API_URL.to_string(),
            auth_url: DEFAULT_AUTH_URL.to_string(),
            client_id: DEFAULT_CLIENT_ID.to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            event_callbacks: Vec::new(),
            snapshot_callbacks: Vec::new(),
            log_mode: None,
            log_path: None,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new()
            .credentials(&config.username, &config.password)
            .api_url(&config.api_url)
            .state_api_url(&config.state_api_url)
            .auth_url(&config.auth_url)
            .client_id(&config.client_id)
            .poll_interval(config.poll_interval())
    }

    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some((username.into(), password.into()));
        self
    }

    /// Use `exchange` to obtain tokens instead of the username/password flow.
    pub fn credential_exchange(mut self, exchange: Arc<dyn CredentialExchange>) -> Self {
        self.exchange = Some(exchange);
        self
    }

    pub fn api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    pub fn state_api_url(mut self, url: impl Into<String>) -> Self {
        self.state_api_url = url.into();
        self
    }

    pub fn auth_url(mut self, url: impl Into<String>) -> Self {
        self.auth_url = url.into();
        self
    }

    pub fn client_id(mut self, id: impl Into<String>) -> Self {
        self.client_id = id.into();
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn on_event(mut self, f: impl Fn(&Event) + Send + Sync + 'static) -> Self {
        self.event_callbacks.push(Box::new(f));
        self
    }

    /// Called with every installed snapshot, changed or not.
    pub fn on_snapshot(mut self, f: impl Fn(&str, &RemoteState) + Send + Sync + 'static) -> Self {
        self.snapshot_callbacks.push(Box::new(f));
        self
    }

    pub fn message_log(mut self, mode: MessageLogMode, path: impl Into<String>) -> Self {
        self.log_mode = Some(mode);
        self.log_path = Some(path.into());
        self
    }

    pub fn build(self) -> Result<MagiqClient> {
        if self.poll_interval.is_zero() {
            return Err(Error::Config("poll interval must be non-zero".to_string()));
        }

        let http = reqwest::Client::builder().build()?;

        let exchange: Arc<dyn CredentialExchange> = match (self.exchange, self.credentials) {
            (Some(exchange), _) => exchange,
            (None, Some((username, password))) => Arc::new(CognitoExchange::new(
                http.clone(),
                self.auth_url,
                self.client_id,
                username,
                password,
            )),
            (None, None) => {
                return Err(Error::Config("no credentials configured".to_string()));
            }
        };

        let logger = match (self.log_mode, self.log_path) {
            (Some(mode), Some(path)) => Some(MessageLogger::new(mode, &path)?),
            _ => None,
        };

        let session = Arc::new(SessionCache::new(exchange));
        let api = Arc::new(Api::new(http, self.api_url, self.state_api_url, session, logger));
        let reconciler =
            Reconciler::new(api.clone(), self.event_callbacks, self.snapshot_callbacks);

        Ok(MagiqClient {
            api,
            reconciler,
            capabilities: RwLock::new(HashMap::new()),
            poll_interval: self.poll_interval,
        })
    }
}

/// A device found by [`MagiqClient::discover`].
#[derive(Debug, Clone)]
pub struct DiscoveredDevice {
    pub descriptor: DeviceDescriptor,
    pub capabilities: Capabilities,
}

/// Client for one MagIQtouch account.
///
/// Commands go through [`apply`](Self::apply): they are checked against the
/// device's capabilities, reflected in [`effective_state`](Self::effective_state)
/// straight away and written in the background. Polling reconciles the local
/// view with the controller.
pub struct MagiqClient {
    api: Arc<Api>,
    reconciler: Reconciler,
    capabilities: RwLock<HashMap<String, Capabilities>>,
    poll_interval: Duration,
}

impl MagiqClient {
    pub fn builder() -> MagiqClientBuilder {
        MagiqClientBuilder::new()
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    pub fn session(&self) -> &Arc<SessionCache> {
        self.api.session()
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub async fn list_devices(&self) -> Result<Vec<DeviceDescriptor>> {
        self.api.list_devices().await
    }

    /// Capabilities of `device_id`, fetched once and cached.
    pub async fn detect_capabilities(&self, device_id: &str) -> Result<Capabilities> {
        if let Some(caps) = self.capabilities(device_id) {
            return Ok(caps);
        }
        let caps = capability::detect(&self.api, device_id).await?;
        self.capabilities
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(device_id.to_string(), caps);
        Ok(caps)
    }

    pub fn capabilities(&self, device_id: &str) -> Option<Capabilities> {
        let caps = self.capabilities.read().unwrap_or_else(PoisonError::into_inner);
        caps.get(device_id).copied()
    }

    pub fn effective_state(&self, device_id: &str) -> Option<RemoteState> {
        self.reconciler.effective_state(device_id)
    }

    /// Control-surface view of the effective state. `None` until both the
    /// capabilities and a first snapshot are known.
    pub fn status(&self, device_id: &str) -> Option<Status> {
        let caps = self.capabilities(device_id)?;
        let state = self.effective_state(device_id)?;
        Some(Status::from_state(&state, &caps))
    }

    pub async fn refresh(&self, device_id: &str) -> Result<()> {
        self.reconciler.refresh(device_id).await
    }

    /// `None` if no refresh was ever attempted for `device_id`.
    pub fn submit(&self, device_id: &str, delta: Delta) -> Option<JoinHandle<()>> {
        self.reconciler.submit(device_id, delta)
    }

    /// Translate `intent` against the current effective state and submit the
    /// result. Returns `None` when there is nothing to change.
    ///
    /// Validation happens before anything is recorded or sent.
    pub fn apply(&self, device_id: &str, intent: &Intent) -> Result<Option<JoinHandle<()>>> {
        let caps = self
            .capabilities(device_id)
            .ok_or_else(|| Error::UnknownDevice(device_id.to_string()))?;
        let state = self
            .effective_state(device_id)
            .ok_or_else(|| Error::UnknownDevice(device_id.to_string()))?;

        let delta = translate(intent, &state, &caps)?;
        if delta.is_empty() {
            debug!(device_id, ?intent, "no change");
            return Ok(None);
        }
        info!(device_id, ?intent, fields = delta.len(), "applying");
        Ok(self.reconciler.submit(device_id, delta))
    }

    pub fn start_polling(&self, device_id: &str) {
        self.reconciler.start_polling(device_id, self.poll_interval);
    }

    pub fn stop_polling(&self, device_id: &str) -> bool {
        self.reconciler.stop_polling(device_id)
    }

    pub fn remove_device(&self, device_id: &str) {
        self.reconciler.remove_device(device_id);
        self.capabilities
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(device_id);
    }

    pub fn shutdown(&self) {
        self.reconciler.shutdown();
    }

    /// List the account's devices and bring each one online: detect its
    /// capabilities, take a first snapshot and start polling. A device that
    /// fails any step is logged and left out.
    pub async fn discover(&self) -> Result<Vec<DiscoveredDevice>> {
        let descriptors = self.list_devices().await?;
        let mut discovered = Vec::with_capacity(descriptors.len());

        for descriptor in descriptors {
            let device_id = descriptor.device_id.clone();
            let capabilities = match self.detect_capabilities(&device_id).await {
                Ok(caps) => caps,
                Err(e) => {
                    warn!(
                        device_id = %device_id,
                        error = %e,
                        "skipping device: capability detection failed"
                    );
                    continue;
                }
            };
            if let Err(e) = self.refresh(&device_id).await {
                warn!(
                    device_id = %device_id,
                    error = %e,
                    "skipping device: initial state fetch failed"
                );
                continue;
            }
            self.start_polling(&device_id);
            info!(device_id = %device_id, name = descriptor.display_name(), "device ready");
            discovered.push(DiscoveredDevice {
                descriptor,
                capabilities,
            });
        }

        Ok(discovered)
    }
}
