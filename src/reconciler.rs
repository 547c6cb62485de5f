use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, trace, warn};

use crate::Result;
use crate::api::Api;
use crate::diff::snapshot_events;
use crate::types::{Delta, Event, RemoteState};

/// Remote polling cadence used when none is configured.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

pub(crate) type EventCallback = Box<dyn Fn(&Event) + Send + Sync>;
pub(crate) type SnapshotCallback = Box<dyn Fn(&str, &RemoteState) + Send + Sync>;

/// Snapshot and overlay, always replaced together under one lock.
#[derive(Default)]
struct Slot {
    snapshot: Option<RemoteState>,
    overlay: Delta,
    /// Bumped on every submit.
    version: u64,
}

impl Slot {
    fn effective(&self) -> Option<RemoteState> {
        self.snapshot.as_ref().map(|s| s.with_delta(&self.overlay))
    }
}

#[derive(Default)]
struct DeviceEntry {
    slot: RwLock<Slot>,
    /// Serializes refreshes for this device.
    refresh_lock: tokio::sync::Mutex<()>,
    /// Serializes writes; holds the last slot version sent.
    written: tokio::sync::Mutex<u64>,
}

struct Inner {
    api: Arc<Api>,
    devices: RwLock<HashMap<String, Arc<DeviceEntry>>>,
    pollers: Mutex<HashMap<String, JoinHandle<()>>>,
    event_callbacks: Vec<EventCallback>,
    snapshot_callbacks: Vec<SnapshotCallback>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        let pollers = self.pollers.get_mut().unwrap_or_else(PoisonError::into_inner);
        for (_, handle) in pollers.drain() {
            handle.abort();
        }
    }
}

/// Per-device remote snapshot plus the overlay of commands issued since it
/// was taken.
///
/// Reads merge the two without I/O. A successful refresh installs a new
/// snapshot and empties the overlay in the same step, which is also how a
/// silently failed write gets reconciled.
#[derive(Clone)]
pub struct Reconciler {
    inner: Arc<Inner>,
}

impl Reconciler {
    pub(crate) fn new(
        api: Arc<Api>,
        event_callbacks: Vec<EventCallback>,
        snapshot_callbacks: Vec<SnapshotCallback>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                api,
                devices: RwLock::new(HashMap::new()),
                pollers: Mutex::new(HashMap::new()),
                event_callbacks,
                snapshot_callbacks,
            }),
        }
    }

    fn entry(&self, device_id: &str) -> Arc<DeviceEntry> {
        if let Some(entry) = self.lookup(device_id) {
            return entry;
        }
        let mut devices = self.inner.devices.write().unwrap_or_else(PoisonError::into_inner);
        devices.entry(device_id.to_string()).or_default().clone()
    }

    fn lookup(&self, device_id: &str) -> Option<Arc<DeviceEntry>> {
        let devices = self.inner.devices.read().unwrap_or_else(PoisonError::into_inner);
        devices.get(device_id).cloned()
    }

    /// Snapshot with pending changes applied, or `None` before the first
    /// successful refresh.
    pub fn effective_state(&self, device_id: &str) -> Option<RemoteState> {
        let entry = self.lookup(device_id)?;
        let slot = entry.slot.read().unwrap_or_else(PoisonError::into_inner);
        slot.effective()
    }

    /// The last fetched snapshot, without pending changes.
    pub fn snapshot(&self, device_id: &str) -> Option<RemoteState> {
        let entry = self.lookup(device_id)?;
        let slot = entry.slot.read().unwrap_or_else(PoisonError::into_inner);
        slot.snapshot.clone()
    }

    /// Changes submitted since the last successful refresh.
    pub fn pending(&self, device_id: &str) -> Delta {
        self.lookup(device_id)
            .map(|entry| entry.slot.read().unwrap_or_else(PoisonError::into_inner).overlay.clone())
            .unwrap_or_default()
    }

    pub fn is_synced(&self, device_id: &str) -> bool {
        self.snapshot(device_id).is_some()
    }

    /// Fetch the device's state, install it and drop the overlay. On failure
    /// the previous snapshot stays in place.
    pub async fn refresh(&self, device_id: &str) -> Result<()> {
        let entry = self.entry(device_id);
        let _refreshing = entry.refresh_lock.lock().await;

        let fresh = self.inner.api.running_state(device_id).await?;

        let (previous, discarded) = {
            let mut slot = entry.slot.write().unwrap_or_else(PoisonError::into_inner);
            let discarded = slot.overlay.len();
            slot.overlay.clear();
            (slot.snapshot.replace(fresh.clone()), discarded)
        };
        debug!(device_id, discarded, "installed snapshot");

        self.notify(device_id, previous.as_ref(), &fresh);
        Ok(())
    }

    /// Record `delta` locally and write the resulting full state in the
    /// background.
    ///
    /// The overlay is updated before this returns, so reads see the change
    /// at once. Writes for one device go out one at a time, each carrying the
    /// effective state as of when it is sent; a write made redundant by a
    /// later one is skipped. The outcome is only logged; awaiting the handle
    /// is optional.
    ///
    /// Returns `None`, recording nothing, for a device with no refresh
    /// attempted yet or one that has been removed.
    pub fn submit(&self, device_id: &str, delta: Delta) -> Option<JoinHandle<()>> {
        let Some(entry) = self.lookup(device_id) else {
            warn!(device_id, "submit for unregistered device ignored");
            return None;
        };
        let version = {
            let mut slot = entry.slot.write().unwrap_or_else(PoisonError::into_inner);
            slot.overlay.merge(&delta);
            slot.version += 1;
            slot.version
        };
        trace!(device_id, version, ?delta, "merged into overlay");

        let api = self.inner.api.clone();
        let device_id = device_id.to_string();
        Some(tokio::spawn(async move {
            let mut written = entry.written.lock().await;
            let (current, state) = {
                let slot = entry.slot.read().unwrap_or_else(PoisonError::into_inner);
                (slot.version, slot.effective())
            };
            if current <= *written {
                trace!(device_id = %device_id, version, "superseded by a later write");
                return;
            }
            let Some(state) = state else {
                warn!(device_id = %device_id, "no snapshot yet; write skipped");
                return;
            };
            *written = current;
            if let Err(e) = api.update_state(&device_id, &state).await {
                error!(device_id = %device_id, error = %e, "error updating state");
            }
        }))
    }

    /// Refresh `device_id` every `interval` until stopped. Replaces any poller
    /// already running for the device.
    pub fn start_polling(&self, device_id: &str, interval: Duration) {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let id = device_id.to_string();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                let reconciler = Reconciler { inner };
                if let Err(e) = reconciler.refresh(&id).await {
                    error!(device_id = %id, error = %e, "error fetching current state");
                }
            }
            trace!(device_id = %id, "poller exited");
        });

        debug!(device_id, ?interval, "polling started");
        let mut pollers = self.inner.pollers.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = pollers.insert(device_id.to_string(), handle) {
            previous.abort();
        }
    }

    pub fn stop_polling(&self, device_id: &str) -> bool {
        let mut pollers = self.inner.pollers.lock().unwrap_or_else(PoisonError::into_inner);
        match pollers.remove(device_id) {
            Some(handle) => {
                handle.abort();
                debug!(device_id, "polling stopped");
                true
            }
            None => false,
        }
    }

    pub fn is_polling(&self, device_id: &str) -> bool {
        let pollers = self.inner.pollers.lock().unwrap_or_else(PoisonError::into_inner);
        pollers.get(device_id).is_some_and(|h| !h.is_finished())
    }

    /// Stop polling and forget everything held for the device.
    pub fn remove_device(&self, device_id: &str) {
        self.stop_polling(device_id);
        let mut devices = self.inner.devices.write().unwrap_or_else(PoisonError::into_inner);
        devices.remove(device_id);
    }

    pub fn shutdown(&self) {
        let mut pollers = self.inner.pollers.lock().unwrap_or_else(PoisonError::into_inner);
        for (_, handle) in pollers.drain() {
            handle.abort();
        }
    }

    fn notify(&self, device_id: &str, previous: Option<&RemoteState>, current: &RemoteState) {
        if !self.inner.event_callbacks.is_empty() {
            let events = snapshot_events(device_id, previous, current);
            if !events.is_empty() {
                debug!(device_id, count = events.len(), "snapshot changes");
            }
            for event in &events {
                for cb in &self.inner.event_callbacks {
                    cb(event);
                }
            }
        }
        for cb in &self.inner.snapshot_callbacks {
            cb(device_id, current);
        }
    }
}
