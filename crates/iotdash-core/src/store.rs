//! Synchronization state store.
//!
//! [`SyncStore`] is the single owner of session state: the connection
//! lifecycle, the mirrored [`DeviceTree`], the active [`ConnectionConfig`]
//! and the activity log. Presentation code calls its operations and observes
//! the results through watch channels, the event broadcast and the log.
//!
//! Operations never return errors. Every failure, including calling a
//! mutation while not connected, becomes an error-severity [`LogEntry`].
//! Local edits are not applied to the snapshot; the change shows up when the
//! remote store echoes it back through the subscription.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use futures::StreamExt;
use tokio::sync::{RwLock, watch};
use tracing::{debug, error, info, warn};

use iotdash_types::{
    ConnectionConfig, Device, DeviceTree, LogEntry, SensorHistory, Severity, device_key,
};

use crate::adapter::SyncAdapter;
use crate::client::Connector;
use crate::events::{ConnectionState, EventDispatcher, EventReceiver, StoreEvent};
use crate::history::HistoryTracker;
use crate::log::LogRing;
use crate::simulation::{SimulationRange, compute_batch};
use crate::subscription::{Subscription, SubscriptionEvent};

/// Session state shared between the presentation layer and the sync adapter.
///
/// Always used behind an [`Arc`]; the live feed task holds a weak reference.
///
/// # Example
///
/// ```
/// use iotdash_core::{ConnectionState, MemoryConnector, SyncStore};
/// use iotdash_types::{ConnectionConfig, Device};
///
/// # async fn example() {
/// let store = SyncStore::new(MemoryConnector::new());
/// store
///     .connect(ConnectionConfig::new("https://demo.firebaseio.com", ""))
///     .await;
/// assert_eq!(store.state(), ConnectionState::Connected);
///
/// store.create_device("Ceiling Fan", Device::dimmer(1024.0, "RPM")).await;
/// store.update_device_value("ceiling_fan", 512.0).await;
/// store.disconnect().await;
/// # }
/// ```
pub struct SyncStore<C: Connector> {
    adapter: SyncAdapter<C>,
    state: watch::Sender<ConnectionState>,
    devices: watch::Sender<DeviceTree>,
    config: RwLock<Option<ConnectionConfig>>,
    logs: Mutex<LogRing>,
    history: Mutex<HistoryTracker>,
    events: EventDispatcher,
    /// Bumped by every connect and disconnect; feed deliveries and connect
    /// completions from an older session are discarded.
    generation: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<C: Connector> SyncStore<C> {
    /// Create a disconnected store using `connector` for new sessions.
    pub fn new(connector: C) -> Arc<Self> {
        Self::with_adapter(SyncAdapter::new(connector))
    }

    /// Create a disconnected store around a configured adapter.
    pub fn with_adapter(adapter: SyncAdapter<C>) -> Arc<Self> {
        Arc::new(Self {
            adapter,
            state: watch::Sender::new(ConnectionState::Disconnected),
            devices: watch::Sender::new(DeviceTree::new()),
            config: RwLock::new(None),
            logs: Mutex::new(LogRing::default()),
            history: Mutex::new(HistoryTracker::new()),
            events: EventDispatcher::default(),
            generation: AtomicU64::new(0),
        })
    }

    // --- Observation ---

    /// The adapter used for remote calls.
    pub fn adapter(&self) -> &SyncAdapter<C> {
        &self.adapter
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Returns `true` in the [`ConnectionState::Connected`] state.
    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Receiver notified on every connection state change.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// The latest delivered snapshot.
    pub fn devices(&self) -> DeviceTree {
        self.devices.borrow().clone()
    }

    /// The device `key` in the latest snapshot.
    pub fn device(&self, key: &str) -> Option<Device> {
        self.devices.borrow().get(key).cloned()
    }

    /// Receiver notified whenever a snapshot replaces the device tree.
    pub fn watch_devices(&self) -> watch::Receiver<DeviceTree> {
        self.devices.subscribe()
    }

    /// Chart history of the sensor `key`.
    pub fn sensor_history(&self, key: &str) -> Option<SensorHistory> {
        lock(&self.history).get(key).cloned()
    }

    /// The configuration of the open session.
    pub async fn config(&self) -> Option<ConnectionConfig> {
        self.config.read().await.clone()
    }

    /// Subscribe to store events.
    pub fn subscribe_events(&self) -> EventReceiver {
        self.events.subscribe()
    }

    /// Activity log entries, oldest first.
    pub fn logs(&self) -> Vec<LogEntry> {
        lock(&self.logs).to_vec()
    }

    // --- Activity log ---

    /// Append an entry to the activity log and return it.
    ///
    /// Every entry is also emitted as a tracing event with the
    /// `iotdash::activity` target.
    pub fn log(&self, message: impl Into<String>, severity: Severity) -> LogEntry {
        let entry = LogEntry::new(message, severity);
        match severity {
            Severity::Info | Severity::Success => {
                info!(target: "iotdash::activity", "{}", entry.message)
            }
            Severity::Warning => warn!(target: "iotdash::activity", "{}", entry.message),
            Severity::Error => error!(target: "iotdash::activity", "{}", entry.message),
        }

        lock(&self.logs).push(entry.clone());
        self.events.send(StoreEvent::Log {
            entry: entry.clone(),
        });
        entry
    }

    /// Empty the activity log.
    pub fn clear_log(&self) {
        lock(&self.logs).clear();
    }

    pub(crate) fn emit(&self, event: StoreEvent) {
        self.events.send(event);
    }

    // --- Session lifecycle ---

    /// Connect to the tree described by `config` and subscribe to it.
    ///
    /// Moves to [`ConnectionState::Connecting`] while the adapter probes the
    /// remote store, then to [`ConnectionState::Connected`] on success or
    /// back to [`ConnectionState::Disconnected`] on failure. A call made
    /// while another connect is in flight is ignored.
    pub async fn connect(self: &Arc<Self>, config: ConnectionConfig) {
        if self.state() == ConnectionState::Connecting {
            self.log("Connection attempt already in progress", Severity::Warning);
            return;
        }
        if let Err(e) = config.validate() {
            self.log(
                format!("Connection failed. Please check your credentials. ({})", e),
                Severity::Error,
            );
            return;
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.set_state(ConnectionState::Connecting);
        self.log(
            format!("Attempting connection to {}...", config.base_url()),
            Severity::Info,
        );

        let result = self.adapter.connect(&config).await;
        if !self.is_current(generation) {
            debug!("Connect attempt superseded");
            if self.state() == ConnectionState::Disconnected {
                self.adapter.disconnect().await;
            }
            if let Err(e) = result {
                self.log(format!("Connection error: {}", e), Severity::Error);
            }
            return;
        }
        if let Err(e) = result {
            self.fail_connect(e).await;
            return;
        }

        let subscription = match self.adapter.subscribe(&config.normalized_path()).await {
            Ok(subscription) => subscription,
            Err(e) => {
                self.fail_connect(e).await;
                return;
            }
        };

        *self.config.write().await = Some(config);
        self.set_state(ConnectionState::Connected);
        self.log("Database connected successfully!", Severity::Success);
        self.spawn_feed(subscription, generation);
    }

    async fn fail_connect(&self, e: crate::Error) {
        self.adapter.disconnect().await;
        self.clear_session().await;
        self.set_state(ConnectionState::Disconnected);
        self.log(
            format!("Connection failed. Please check your credentials. ({})", e),
            Severity::Error,
        );
    }

    /// Tear down the session, clear the snapshot and forget the
    /// configuration. Always succeeds and always logs.
    pub async fn disconnect(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.adapter.disconnect().await;

        self.clear_session().await;
        self.set_state(ConnectionState::Disconnected);
        self.log("Disconnected from database", Severity::Info);
    }

    /// Drop the snapshot, sensor history and configuration of the last
    /// session.
    async fn clear_session(&self) {
        self.devices.send_replace(DeviceTree::new());
        lock(&self.history).clear();
        *self.config.write().await = None;
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    fn set_state(&self, state: ConnectionState) {
        let changed = self.state.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
        if changed {
            debug!("Connection state: {}", state);
            self.events.send(StoreEvent::StateChanged { state });
        }
    }

    fn spawn_feed(self: &Arc<Self>, mut subscription: Subscription, generation: u64) {
        let store: Weak<Self> = Arc::downgrade(self);
        let token = subscription.cancellation_token();

        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = token.cancelled() => break,
                    event = subscription.next() => event,
                };
                let Some(event) = event else {
                    break;
                };
                let Some(store) = store.upgrade() else {
                    break;
                };
                store.handle_feed_event(event, generation);
            }
            debug!("Store feed task stopped");
        });
    }

    fn handle_feed_event(&self, event: SubscriptionEvent, generation: u64) {
        if !self.is_current(generation) {
            debug!("Dropping delivery from a closed session");
            return;
        }

        match event {
            SubscriptionEvent::Snapshot { tree, skipped } => {
                for entry in &skipped {
                    self.log(
                        format!("Ignoring malformed device '{}': {}", entry.key, entry.reason),
                        Severity::Warning,
                    );
                }
                let count = tree.len();
                lock(&self.history).observe(&tree);
                self.devices.send_replace(tree);
                self.events.send(StoreEvent::DevicesUpdated { count });
                self.log(
                    format!("Received device update: {} devices", count),
                    Severity::Info,
                );
            }
            SubscriptionEvent::Error(message) => {
                self.log(format!("Subscription error: {}", message), Severity::Error);
            }
        }
    }

    // --- Mutations ---

    /// Tree path of the open session, or `None` after logging the
    /// precondition failure for `operation`.
    async fn require_connected(&self, operation: &str) -> Option<String> {
        let path = if self.is_connected() {
            self.config
                .read()
                .await
                .as_ref()
                .map(ConnectionConfig::normalized_path)
        } else {
            None
        };
        if path.is_none() {
            self.log(format!("Cannot {}: Not connected", operation), Severity::Error);
        }
        path
    }

    /// Write a new value for the device `key`.
    pub async fn update_device_value(&self, key: &str, value: f64) {
        let Some(path) = self.require_connected("update").await else {
            return;
        };
        match self.adapter.set_value(&path, key, value).await {
            Ok(()) => {
                self.log(format!("Device '{}' updated to {}", key, value), Severity::Success);
            }
            Err(e) => {
                self.log(format!("Update failed for '{}': {}", key, e), Severity::Error);
            }
        }
    }

    /// Flip the switch `key` based on the latest snapshot.
    pub async fn toggle_switch(&self, key: &str) {
        let message = match self.device(key) {
            Some(Device::Switch { value }) => {
                self.update_device_value(key, value.toggled().as_value())
                    .await;
                return;
            }
            Some(other) => format!(
                "Update failed for '{}': device is a {}, not a switch",
                key,
                other.kind()
            ),
            None if !self.is_connected() => "Cannot update: Not connected".to_string(),
            None => format!("Update failed for '{}': no such device", key),
        };
        self.log(message, Severity::Error);
    }

    /// Create (or replace) a device under a key derived from `name`.
    ///
    /// The name is normalized to a lower-case, underscore-separated key.
    pub async fn create_device(&self, name: &str, device: Device) {
        let Some(path) = self.require_connected("create").await else {
            return;
        };
        let key = match device_key(name) {
            Ok(key) => key,
            Err(e) => {
                self.log(format!("Create failed for '{}': {}", name, e), Severity::Error);
                return;
            }
        };
        match self.adapter.create_device(&path, &key, &device).await {
            Ok(()) => {
                self.log(format!("Device '{}' created successfully", key), Severity::Success);
            }
            Err(e) => {
                self.log(format!("Create failed for '{}': {}", key, e), Severity::Error);
            }
        }
    }

    /// Remove the device `key`.
    pub async fn delete_device(&self, key: &str) {
        let Some(path) = self.require_connected("delete").await else {
            return;
        };
        match self.adapter.delete_device(&path, key).await {
            Ok(()) => {
                self.log(format!("Device '{}' deleted", key), Severity::Success);
            }
            Err(e) => {
                self.log(format!("Delete failed for '{}': {}", key, e), Severity::Error);
            }
        }
    }

    /// Run one simulation tick with values drawn from `[min, max]`.
    pub async fn simulate(&self, min: f64, max: f64) {
        if !self.is_connected() {
            self.log("Cannot simulate: Not connected", Severity::Error);
            return;
        }
        match SimulationRange::new(min, max) {
            Ok(range) => self.simulate_range(&range).await,
            Err(e) => {
                self.log(format!("Simulation error: {}", e), Severity::Error);
            }
        }
    }

    /// Run one simulation tick over every dimmer and sensor in the snapshot,
    /// written as a single batch.
    pub async fn simulate_range(&self, range: &SimulationRange) {
        let Some(path) = self.require_connected("simulate").await else {
            return;
        };
        let batch: BTreeMap<String, f64> = {
            let tree = self.devices.borrow();
            compute_batch(&tree, range, &mut rand::rng())
        };

        match self.adapter.batch_set_values(&path, &batch).await {
            Ok(()) => {
                self.log(
                    format!("Simulator heartbeat: Updated {} devices", batch.len()),
                    Severity::Info,
                );
            }
            Err(e) => {
                self.log(format!("Simulation error: {}", e), Severity::Error);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryConnector;

    #[tokio::test]
    async fn test_initial_state() {
        let store = SyncStore::new(MemoryConnector::new());
        assert_eq!(store.state(), ConnectionState::Disconnected);
        assert!(store.devices().is_empty());
        assert!(store.logs().is_empty());
        assert!(store.config().await.is_none());
    }

    #[tokio::test]
    async fn test_log_emits_event() {
        let store = SyncStore::new(MemoryConnector::new());
        let mut events = store.subscribe_events();

        let entry = store.log("hello", Severity::Warning);
        match events.recv().await.unwrap() {
            StoreEvent::Log { entry: received } => assert_eq!(received.id, entry.id),
            other => panic!("unexpected event: {:?}", other),
        }

        store.clear_log();
        assert!(store.logs().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_config_stays_disconnected() {
        let store = SyncStore::new(MemoryConnector::new());
        store.connect(ConnectionConfig::new("", "")).await;

        assert_eq!(store.state(), ConnectionState::Disconnected);
        let last = store.logs().pop().unwrap();
        assert_eq!(last.severity, Severity::Error);
        assert!(last.message.starts_with("Connection failed."));
    }

    #[tokio::test]
    async fn test_simulate_rejects_inverted_range() {
        let connector = MemoryConnector::new();
        let tree = Arc::clone(connector.tree());
        let store = SyncStore::new(connector);
        store
            .connect(ConnectionConfig::new("https://demo.firebaseio.com", ""))
            .await;

        store.simulate(20.0, 10.0).await;
        let last = store.logs().pop().unwrap();
        assert_eq!(last.severity, Severity::Error);
        assert!(last.message.starts_with("Simulation error:"));
        assert_eq!(tree.counters().update, 0);
    }

    #[tokio::test]
    async fn test_toggle_switch_requires_switch() {
        let store = SyncStore::new(MemoryConnector::new());
        store.toggle_switch("lamp").await;
        assert_eq!(
            store.logs().pop().unwrap().message,
            "Cannot update: Not connected"
        );
    }
}
