//! Push subscription on the device tree.
//!
//! A [`Subscription`] turns a raw [`SnapshotFeed`] into typed
//! [`SubscriptionEvent`]s and exposes them as an async stream. It supports
//! explicit shutdown via [`Subscription::close`], which cancels the
//! background task through a cancellation token; dropping the subscription
//! has the same effect.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::stream::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use iotdash_types::{DeviceTree, SkippedEntry};

use crate::client::SnapshotFeed;

/// Default number of undelivered events buffered per subscription.
pub const DEFAULT_BUFFER_SIZE: usize = 16;

/// An item delivered by a [`Subscription`].
#[derive(Debug, Clone, PartialEq)]
pub enum SubscriptionEvent {
    /// The full current device tree at the subscribed path.
    Snapshot {
        /// Devices that decoded successfully.
        tree: DeviceTree,
        /// Entries that were not valid devices.
        skipped: Vec<SkippedEntry>,
    },
    /// The live listener reported an error. The subscription stays open.
    Error(String),
}

/// A cancellable stream of device tree snapshots.
pub struct Subscription {
    receiver: mpsc::Receiver<SubscriptionEvent>,
    handle: tokio::task::JoinHandle<()>,
    cancel_token: CancellationToken,
}

impl Subscription {
    /// Spawn a task that decodes `feed` into events.
    pub fn new(feed: SnapshotFeed, buffer_size: usize) -> Self {
        Self::with_token(feed, buffer_size, CancellationToken::new())
    }

    /// Like [`new`](Self::new), cancelled when `cancel_token` is.
    pub fn with_token(
        mut feed: SnapshotFeed,
        buffer_size: usize,
        cancel_token: CancellationToken,
    ) -> Self {
        let (tx, rx) = mpsc::channel(buffer_size.max(1));
        let task_token = cancel_token.clone();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = task_token.cancelled() => {
                        debug!("Subscription cancelled, stopping");
                        break;
                    }
                    item = feed.next() => {
                        let event = match item {
                            Some(Ok(value)) => {
                                let (tree, skipped) = DeviceTree::from_json(value);
                                SubscriptionEvent::Snapshot { tree, skipped }
                            }
                            Some(Err(e)) => {
                                warn!("Subscription feed error: {}", e);
                                SubscriptionEvent::Error(e.to_string())
                            }
                            None => {
                                debug!("Subscription feed ended");
                                break;
                            }
                        };
                        if tx.send(event).await.is_err() {
                            debug!("Subscription receiver dropped, stopping");
                            break;
                        }
                    }
                }
            }
        });

        Self {
            receiver: rx,
            handle,
            cancel_token,
        }
    }

    /// Close the subscription and stop the background task.
    pub fn close(self) {
        self.cancel_token.cancel();
    }

    /// A token that cancels this subscription when triggered.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Check if the background task is still running.
    pub fn is_active(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Check if the subscription has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

impl Stream for Subscription {
    type Item = SubscriptionEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.receiver).poll_recv(cx)
    }
}
