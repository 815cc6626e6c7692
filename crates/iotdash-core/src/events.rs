//! Store event system.
//!
//! The [`SyncStore`](crate::SyncStore) publishes a [`StoreEvent`] for every
//! state change, snapshot delivery and log entry so that a presentation
//! layer can redraw without polling.

use core::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use iotdash_types::LogEntry;

/// Connection lifecycle of a sync session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// No session.
    #[default]
    Disconnected,
    /// A connect attempt is in flight.
    Connecting,
    /// Connected and subscribed.
    Connected,
}

impl ConnectionState {
    /// Returns `true` only for [`ConnectionState::Connected`].
    pub fn is_connected(self) -> bool {
        self == ConnectionState::Connected
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
        }
    }
}

/// Events emitted by the sync store.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new event types
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum StoreEvent {
    /// The connection state changed.
    StateChanged {
        /// The new state.
        state: ConnectionState,
    },
    /// A snapshot replaced the device collection.
    DevicesUpdated {
        /// Number of devices in the new snapshot.
        count: usize,
    },
    /// A log entry was recorded.
    Log {
        /// The entry.
        entry: LogEntry,
    },
    /// The simulator started or stopped.
    SimulationChanged {
        /// Whether a simulation is now running.
        running: bool,
    },
}

/// Sender for store events.
pub type EventSender = broadcast::Sender<StoreEvent>;

/// Receiver for store events.
pub type EventReceiver = broadcast::Receiver<StoreEvent>;

/// Event dispatcher for sending events to multiple receivers.
#[derive(Debug, Clone)]
pub struct EventDispatcher {
    sender: EventSender,
}

impl EventDispatcher {
    /// Create a new event dispatcher.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to events.
    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    /// Send an event.
    pub fn send(&self, event: StoreEvent) {
        // Ignore error if no receivers
        let _ = self.sender.send(event);
    }

    /// Get the number of active receivers.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new(100)
    }
}
