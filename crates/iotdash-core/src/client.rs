//! Trait abstractions over the remote tree store.
//!
//! [`TreeClient`] is the seam between the [`SyncAdapter`](crate::SyncAdapter)
//! and a concrete store. Two implementations ship with this crate:
//!
//! - [`RestClient`](crate::RestClient): Firebase Realtime Database REST and
//!   server-sent events.
//! - [`MemoryTree`](crate::MemoryTree): an in-process tree for tests and the
//!   demo dashboard.
//!
//! A [`Connector`] opens a client for a [`ConnectionConfig`]; the adapter
//! owns the resulting handle for the lifetime of one session.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use serde_json::{Map, Value};
use tokio::sync::mpsc;

use iotdash_types::ConnectionConfig;

use crate::error::Result;

/// Live feed of a subtree: each item is the entire current subtree at the
/// watched path (`Value::Null` when the path is absent) or a feed error.
pub type SnapshotFeed = BoxStream<'static, Result<Value>>;

/// Operations a remote tree store must support.
///
/// Paths are slash-separated and relative to the store root.
///
/// # Example
///
/// ```ignore
/// use iotdash_core::{TreeClient, Result};
///
/// async fn lamp_on<C: TreeClient>(client: &C) -> Result<()> {
///     client.set("iot/monitoring/lamp/value", serde_json::json!(1)).await
/// }
/// ```
#[async_trait]
pub trait TreeClient: Send + Sync {
    /// One-shot read used to confirm the store is reachable and the
    /// credentials are accepted. Succeeds even when `path` has no data.
    async fn probe(&self, path: &str) -> Result<()>;

    /// Open a persistent feed on `path`.
    ///
    /// The first item is the current subtree; every later item follows a
    /// remote change. Errors are delivered in-band and do not end the feed.
    async fn watch(&self, path: &str) -> Result<SnapshotFeed>;

    /// Replace the node at `path` with `value`.
    async fn set(&self, path: &str, value: Value) -> Result<()>;

    /// Write each `fields` entry (a path relative to `path`) in one request.
    async fn update(&self, path: &str, fields: Map<String, Value>) -> Result<()>;

    /// Delete the node at `path`.
    async fn remove(&self, path: &str) -> Result<()>;
}

/// Opens [`TreeClient`] handles.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// The client type produced by this connector.
    type Client: TreeClient + 'static;

    /// Initialize a client for `config`.
    ///
    /// This does not contact the store; the adapter probes the returned
    /// client separately so the probe can be bounded by a timeout.
    async fn open(&self, config: &ConnectionConfig) -> Result<Arc<Self::Client>>;
}

/// Create a bounded channel whose receiving half is a [`SnapshotFeed`].
///
/// Producers should stop once [`mpsc::Sender::is_closed`] reports that the
/// feed was dropped.
pub(crate) fn feed_channel(buffer: usize) -> (mpsc::Sender<Result<Value>>, SnapshotFeed) {
    let (tx, rx) = mpsc::channel(buffer);
    let feed = stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    });
    (tx, Box::pin(feed))
}
