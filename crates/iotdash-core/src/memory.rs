//! In-process tree store.
//!
//! [`MemoryTree`] implements [`TreeClient`] over a JSON document held in
//! memory, with the same write semantics as the remote store. It backs the
//! offline demo dashboard and every test that exercises the sync layer
//! without a network.
//!
//! # Features
//!
//! - **Live feeds**: every watcher receives the subtree after each change
//! - **Failure injection**: make requests fail permanently or for the next N calls
//! - **Latency simulation**: delay every request by a fixed duration
//! - **Hanging probe**: make the connect probe never answer
//! - **Call counters**: count requests per operation

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::{broadcast, watch};
use tracing::debug;

use iotdash_types::{ConnectionConfig, DeviceTree};

use crate::client::{Connector, SnapshotFeed, TreeClient, feed_channel};
use crate::error::{Error, Result};
use crate::path;

const FEED_BUFFER: usize = 16;
const DEFAULT_FAIL_MESSAGE: &str = "Simulated failure";

/// Requests served by a [`MemoryTree`], per operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounters {
    /// Sessions opened through a [`MemoryConnector`].
    pub open: u32,
    /// Connect probes.
    pub probe: u32,
    /// Feeds opened.
    pub watch: u32,
    /// Node replacements.
    pub set: u32,
    /// Multi-path updates.
    pub update: u32,
    /// Node removals.
    pub remove: u32,
}

/// An in-memory device tree store.
///
/// # Example
///
/// ```
/// use iotdash_core::{MemoryTree, TreeClient};
/// use serde_json::json;
///
/// # async fn example() -> iotdash_core::Result<()> {
/// let tree = MemoryTree::new();
/// tree.set("iot/monitoring/lamp", json!({"type": "switch", "value": 0})).await?;
/// assert_eq!(tree.get("iot/monitoring/lamp/value"), json!(0));
/// # Ok(())
/// # }
/// ```
pub struct MemoryTree {
    root: watch::Sender<Value>,
    errors: broadcast::Sender<String>,
    should_fail: AtomicBool,
    fail_message: Mutex<String>,
    remaining_failures: AtomicU32,
    latency_ms: AtomicU64,
    probe_hangs: AtomicBool,
    open_fails: AtomicBool,
    open_count: AtomicU32,
    probe_count: AtomicU32,
    watch_count: AtomicU32,
    set_count: AtomicU32,
    update_count: AtomicU32,
    remove_count: AtomicU32,
}

impl Default for MemoryTree {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTree {
    /// Create an empty tree.
    pub fn new() -> Self {
        let (errors, _) = broadcast::channel(FEED_BUFFER);
        Self {
            root: watch::Sender::new(Value::Null),
            errors,
            should_fail: AtomicBool::new(false),
            fail_message: Mutex::new(DEFAULT_FAIL_MESSAGE.to_string()),
            remaining_failures: AtomicU32::new(0),
            latency_ms: AtomicU64::new(0),
            probe_hangs: AtomicBool::new(false),
            open_fails: AtomicBool::new(false),
            open_count: AtomicU32::new(0),
            probe_count: AtomicU32::new(0),
            watch_count: AtomicU32::new(0),
            set_count: AtomicU32::new(0),
            update_count: AtomicU32::new(0),
            remove_count: AtomicU32::new(0),
        }
    }

    /// Create a tree holding `devices` under `path`.
    pub fn with_devices(path: &str, devices: &DeviceTree) -> Self {
        let tree = Self::new();
        if let Ok(value) = devices.to_json() {
            tree.set_json(path, value);
        }
        tree
    }

    /// Read the value at `path`, or `Value::Null` if absent.
    pub fn get(&self, path: &str) -> Value {
        path::get(&self.root.borrow(), path)
    }

    /// The whole document.
    pub fn snapshot(&self) -> Value {
        self.root.borrow().clone()
    }

    /// Write `value` at `path` directly, bypassing failure injection and
    /// counters. Watchers are notified as for any other write.
    pub fn set_json(&self, path: &str, value: Value) {
        self.root.send_modify(|root| path::set(root, path, value));
    }

    /// Deliver `message` as an error to every open feed.
    pub fn emit_error(&self, message: &str) {
        let _ = self.errors.send(message.to_string());
    }

    /// Make every request fail until cleared.
    pub fn set_should_fail(&self, fail: bool, message: Option<&str>) {
        self.should_fail.store(fail, Ordering::Relaxed);
        if let Some(msg) = message {
            *self
                .fail_message
                .lock()
                .unwrap_or_else(|e| e.into_inner()) = msg.to_string();
        }
    }

    /// Fail the next `count` requests, then succeed.
    pub fn set_transient_failures(&self, count: u32) {
        self.remaining_failures.store(count, Ordering::Relaxed);
    }

    /// Get the number of remaining transient failures.
    pub fn remaining_failures(&self) -> u32 {
        self.remaining_failures.load(Ordering::Relaxed)
    }

    /// Delay every request by `latency`. `Duration::ZERO` disables it.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    /// Make the connect probe never complete.
    pub fn set_probe_hangs(&self, hangs: bool) {
        self.probe_hangs.store(hangs, Ordering::Relaxed);
    }

    /// Make [`MemoryConnector::open`] fail.
    pub fn set_open_fails(&self, fails: bool) {
        self.open_fails.store(fails, Ordering::Relaxed);
    }

    /// Requests served so far.
    pub fn counters(&self) -> CallCounters {
        CallCounters {
            open: self.open_count.load(Ordering::Relaxed),
            probe: self.probe_count.load(Ordering::Relaxed),
            watch: self.watch_count.load(Ordering::Relaxed),
            set: self.set_count.load(Ordering::Relaxed),
            update: self.update_count.load(Ordering::Relaxed),
            remove: self.remove_count.load(Ordering::Relaxed),
        }
    }

    /// Total mutating requests (`set`, `update`, `remove`).
    pub fn write_count(&self) -> u32 {
        let c = self.counters();
        c.set + c.update + c.remove
    }

    /// Reset all counters to zero.
    pub fn reset_counters(&self) {
        for counter in [
            &self.open_count,
            &self.probe_count,
            &self.watch_count,
            &self.set_count,
            &self.update_count,
            &self.remove_count,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }

    fn fail_message(&self) -> String {
        self.fail_message
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    async fn check_should_fail(&self) -> Result<()> {
        let latency = self.latency_ms.load(Ordering::Relaxed);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }

        // Transient failures first
        let remaining = self.remaining_failures.load(Ordering::Relaxed);
        if remaining > 0 {
            self.remaining_failures
                .store(remaining - 1, Ordering::Relaxed);
            return Err(Error::remote(self.fail_message()));
        }

        if self.should_fail.load(Ordering::Relaxed) {
            Err(Error::remote(self.fail_message()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl TreeClient for MemoryTree {
    async fn probe(&self, path: &str) -> Result<()> {
        self.probe_count.fetch_add(1, Ordering::Relaxed);
        if self.probe_hangs.load(Ordering::Relaxed) {
            std::future::pending::<()>().await;
        }
        self.check_should_fail().await?;
        debug!("Probe of '{}' answered", path);
        Ok(())
    }

    async fn watch(&self, path: &str) -> Result<SnapshotFeed> {
        self.watch_count.fetch_add(1, Ordering::Relaxed);
        self.check_should_fail().await?;

        let mut root_rx = self.root.subscribe();
        let mut errors = self.errors.subscribe();
        let (tx, feed) = feed_channel(FEED_BUFFER);
        let path = path.to_string();

        tokio::spawn(async move {
            let mut last = path::get(&root_rx.borrow_and_update(), &path);
            if tx.send(Ok(last.clone())).await.is_err() {
                return;
            }

            loop {
                tokio::select! {
                    _ = tx.closed() => break,
                    changed = root_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let current = path::get(&root_rx.borrow_and_update(), &path);
                        if current == last {
                            continue;
                        }
                        last = current.clone();
                        if tx.send(Ok(current)).await.is_err() {
                            break;
                        }
                    }
                    received = errors.recv() => match received {
                        Ok(message) => {
                            if tx.send(Err(Error::Stream(message))).await.is_err() {
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
            debug!("Memory feed on '{}' stopped", path);
        });

        Ok(feed)
    }

    async fn set(&self, path: &str, value: Value) -> Result<()> {
        self.set_count.fetch_add(1, Ordering::Relaxed);
        self.check_should_fail().await?;
        self.root.send_modify(|root| path::set(root, path, value));
        Ok(())
    }

    async fn update(&self, path: &str, fields: Map<String, Value>) -> Result<()> {
        self.update_count.fetch_add(1, Ordering::Relaxed);
        self.check_should_fail().await?;
        self.root
            .send_modify(|root| path::update(root, path, fields));
        Ok(())
    }

    async fn remove(&self, path: &str) -> Result<()> {
        self.remove_count.fetch_add(1, Ordering::Relaxed);
        self.check_should_fail().await?;
        self.root.send_modify(|root| path::remove(root, path));
        Ok(())
    }
}

/// Opens sessions on a shared [`MemoryTree`].
///
/// Every session opened by one connector sees the same tree, so a reconnect
/// finds the data written before it.
#[derive(Clone, Default)]
pub struct MemoryConnector {
    tree: Arc<MemoryTree>,
}

impl MemoryConnector {
    /// Create a connector over a fresh, empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a connector over an existing tree.
    pub fn with_tree(tree: Arc<MemoryTree>) -> Self {
        Self { tree }
    }

    /// The tree sessions are opened on.
    pub fn tree(&self) -> &Arc<MemoryTree> {
        &self.tree
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    type Client = MemoryTree;

    async fn open(&self, config: &ConnectionConfig) -> Result<Arc<MemoryTree>> {
        self.tree.open_count.fetch_add(1, Ordering::Relaxed);
        config
            .validate()
            .map_err(|e| Error::invalid_config(e.to_string()))?;
        if self.tree.open_fails.load(Ordering::Relaxed) {
            return Err(Error::remote(self.tree.fail_message()));
        }
        Ok(Arc::clone(&self.tree))
    }
}
