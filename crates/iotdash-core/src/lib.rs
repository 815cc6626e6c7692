//! Realtime sync client for iotdash device trees.
//!
//! This crate mirrors a device tree held in a remote JSON database
//! (Firebase Realtime Database compatible) and lets a dashboard read and
//! change it.
//!
//! # Features
//!
//! - **Remote sync adapter**: connect with a bounded probe, subscribe to
//!   full-subtree snapshots, write values, create and delete devices
//! - **Batch writes**: update the value of many devices in one request
//! - **State store**: connection lifecycle, snapshot, bounded activity log
//! - **Simulation engine**: periodic synthetic values within each device's limit
//! - **Pluggable backends**: REST + server-sent events, or an in-memory tree
//!   with failure injection for tests and demos
//!
//! # Architecture
//!
//! | Layer | Type |
//! |-------|------|
//! | Presentation contract | [`SyncStore`], [`Simulator`] |
//! | Request/response calls | [`SyncAdapter`] |
//! | Backend seam | [`TreeClient`], [`Connector`] |
//! | Backends | [`RestClient`], [`MemoryTree`] |
//!
//! # Quick Start
//!
//! ```no_run
//! use iotdash_core::{RestConnector, SyncStore};
//! use iotdash_types::ConnectionConfig;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = SyncStore::new(RestConnector::new()?);
//!     let config = ConnectionConfig::new("https://my-project.firebaseio.com", "secret");
//!
//!     store.connect(config).await;
//!     for entry in store.logs() {
//!         println!("[{}] {}", entry.severity, entry.message);
//!     }
//!
//!     store.update_device_value("lamp", 1.0).await;
//!     store.disconnect().await;
//!     Ok(())
//! }
//! ```

pub mod adapter;
pub mod client;
pub mod error;
pub mod events;
pub mod history;
pub mod log;
pub mod memory;
pub mod path;
pub mod rest;
pub mod simulation;
pub mod store;
pub mod subscription;

pub use adapter::{PROBE_TIMEOUT, SyncAdapter};
pub use client::{Connector, SnapshotFeed, TreeClient};
pub use error::{Error, Result};
pub use events::{ConnectionState, EventDispatcher, EventReceiver, EventSender, StoreEvent};
pub use history::HistoryTracker;
pub use log::{LogRing, MAX_LOG_ENTRIES};
pub use memory::{CallCounters, MemoryConnector, MemoryTree};
pub use rest::{RestClient, RestConnector};
pub use simulation::{
    SimulationParams, SimulationRange, SimulationState, Simulator, TICK_INTERVAL, compute_batch,
};
pub use store::SyncStore;
pub use subscription::{Subscription, SubscriptionEvent};

// Re-export the model crate
pub use iotdash_types::{
    ConnectionConfig, Device, DeviceKind, DeviceTree, LogEntry, SensorHistory, Severity,
    SwitchState,
};
