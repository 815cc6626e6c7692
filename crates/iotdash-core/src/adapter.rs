//! Remote sync adapter.
//!
//! [`SyncAdapter`] wraps a [`Connector`] and owns at most one open session:
//! the client handle plus the cancellation token of the single live
//! subscription. Every call is a single request against the remote store;
//! nothing is retried or queued here. Callers decide how failures reach the
//! user.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::sync::RwLock;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use iotdash_types::{ConnectionConfig, Device, validate_key};

use crate::client::{Connector, TreeClient};
use crate::error::{Error, Result};
use crate::path::join;
use crate::subscription::{DEFAULT_BUFFER_SIZE, Subscription};

/// How long the connect probe may take before the attempt fails.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

struct Session<T> {
    client: Arc<T>,
    subscription: Option<CancellationToken>,
}

/// Connection handle and request/response calls against the remote tree.
///
/// # Example
///
/// ```
/// use iotdash_core::{MemoryConnector, SyncAdapter};
/// use iotdash_types::{ConnectionConfig, Device};
///
/// # async fn example() -> iotdash_core::Result<()> {
/// let adapter = SyncAdapter::new(MemoryConnector::new());
/// let config = ConnectionConfig::new("https://demo.firebaseio.com", "");
///
/// adapter.connect(&config).await?;
/// adapter
///     .create_device("iot/monitoring", "fan", &Device::dimmer(1024.0, "RPM"))
///     .await?;
/// adapter.set_value("iot/monitoring", "fan", 512.0).await?;
/// adapter.disconnect().await;
/// # Ok(())
/// # }
/// ```
pub struct SyncAdapter<C: Connector> {
    connector: C,
    session: RwLock<Option<Session<C::Client>>>,
    probe_timeout: Duration,
    buffer_size: usize,
}

impl<C: Connector> SyncAdapter<C> {
    /// Create an adapter with no open session.
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            session: RwLock::new(None),
            probe_timeout: PROBE_TIMEOUT,
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }

    /// Override the connect probe timeout.
    #[must_use]
    pub fn with_probe_timeout(mut self, probe_timeout: Duration) -> Self {
        self.probe_timeout = probe_timeout;
        self
    }

    /// Override the subscription buffer size.
    #[must_use]
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size.max(1);
        self
    }

    /// The connector used to open sessions.
    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// The configured probe timeout.
    pub fn probe_timeout(&self) -> Duration {
        self.probe_timeout
    }

    /// Returns `true` while a session is open.
    pub async fn is_connected(&self) -> bool {
        self.session.read().await.is_some()
    }

    /// Open a new session for `config`.
    ///
    /// Any existing session is torn down first. The new client must answer a
    /// one-shot probe of `config.tree_path` within the probe timeout; on
    /// timeout, probe error or open error no session remains.
    pub async fn connect(&self, config: &ConnectionConfig) -> Result<()> {
        self.disconnect().await;

        let client = self.connector.open(config).await?;
        let path = config.normalized_path();

        debug!("Probing '{}' at {}", path, config.base_url());
        match timeout(self.probe_timeout, client.probe(&path)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!("Connection probe failed: {}", e);
                return Err(e);
            }
            Err(_) => {
                warn!("Connection probe timed out after {:?}", self.probe_timeout);
                return Err(Error::timeout("connect probe", self.probe_timeout));
            }
        }

        *self.session.write().await = Some(Session {
            client,
            subscription: None,
        });
        info!("Connected to {}", config.base_url());
        Ok(())
    }

    /// Attach the live subscription on `path`.
    ///
    /// Only one subscription is kept: opening a new one cancels the previous
    /// one. Errors reported by the listener arrive as
    /// [`SubscriptionEvent::Error`](crate::SubscriptionEvent::Error) items.
    pub async fn subscribe(&self, path: &str) -> Result<Subscription> {
        let client = self.client().await?;
        let feed = client.watch(path).await?;

        let token = CancellationToken::new();
        let subscription = Subscription::with_token(feed, self.buffer_size, token.clone());

        let mut session = self.session.write().await;
        let Some(session) = session.as_mut() else {
            token.cancel();
            return Err(Error::NotConnected);
        };
        if let Some(previous) = session.subscription.replace(token) {
            debug!("Replacing existing subscription");
            previous.cancel();
        }
        Ok(subscription)
    }

    /// Overwrite the `value` field of `path/key`.
    pub async fn set_value(&self, path: &str, key: &str, value: f64) -> Result<()> {
        validate_key(key)?;
        let client = self.client().await?;
        client
            .set(&join(&[path, key, "value"]), json_number(value)?)
            .await
    }

    /// Replace the whole node at `path/key` with `device`.
    pub async fn create_device(&self, path: &str, key: &str, device: &Device) -> Result<()> {
        validate_key(key)?;
        let client = self.client().await?;
        let value = serde_json::to_value(device)?;
        client.set(&join(&[path, key]), value).await
    }

    /// Remove the node at `path/key`.
    pub async fn delete_device(&self, path: &str, key: &str) -> Result<()> {
        validate_key(key)?;
        let client = self.client().await?;
        client.remove(&join(&[path, key])).await
    }

    /// Write the `value` field of every listed device in one request.
    ///
    /// An empty batch makes no request.
    pub async fn batch_set_values(&self, path: &str, updates: &BTreeMap<String, f64>) -> Result<()> {
        let client = self.client().await?;
        if updates.is_empty() {
            return Ok(());
        }

        let mut fields = Map::with_capacity(updates.len());
        for (key, value) in updates {
            validate_key(key)?;
            fields.insert(format!("{}/value", key), json_number(*value)?);
        }
        client.update(path, fields).await
    }

    /// Cancel the subscription and release the client. Safe to call without
    /// an open session.
    pub async fn disconnect(&self) {
        let Some(session) = self.session.write().await.take() else {
            return;
        };
        if let Some(token) = session.subscription {
            token.cancel();
        }
        debug!("Session closed");
    }

    async fn client(&self) -> Result<Arc<C::Client>> {
        self.session
            .read()
            .await
            .as_ref()
            .map(|s| Arc::clone(&s.client))
            .ok_or(Error::NotConnected)
    }
}

/// Encode a device value, writing whole numbers as JSON integers so switch
/// values read back as `0`/`1`.
fn json_number(value: f64) -> Result<Value> {
    if !value.is_finite() {
        return Err(Error::InvalidData(format!(
            "value {} is not a finite number",
            value
        )));
    }
    if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        Ok(Value::from(value as i64))
    } else {
        Ok(Value::from(value))
    }
}
