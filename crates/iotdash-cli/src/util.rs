//! Session helpers shared by the commands.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, bail};
use tokio::sync::broadcast::error::RecvError;

use iotdash_core::{Connector, EventReceiver, StoreEvent, SyncStore};
use iotdash_types::{ConnectionConfig, LogEntry, Severity};

use crate::format::{FormatOptions, format_device_table, format_log_entry};

/// How long to wait for the first snapshot after connecting.
const FIRST_SNAPSHOT_TIMEOUT: Duration = Duration::from_secs(10);

/// Prints activity log entries that have not been printed yet.
#[derive(Debug)]
pub struct LogPrinter {
    opts: FormatOptions,
    last: Option<LogEntry>,
}

impl LogPrinter {
    pub fn new(opts: FormatOptions) -> Self {
        Self { opts, last: None }
    }

    /// Return the entries of `logs` after the last one already taken.
    ///
    /// When that entry has been evicted from the ring, every entry is new.
    pub fn take_new<'a>(&mut self, logs: &'a [LogEntry]) -> &'a [LogEntry] {
        let start = self
            .last
            .as_ref()
            .and_then(|last| logs.iter().position(|e| e.id == last.id))
            .map_or(0, |i| i + 1);
        if let Some(entry) = logs.last() {
            self.last = Some(entry.clone());
        }
        &logs[start..]
    }

    /// Print new entries from the store. Returns `true` if any was an error.
    pub fn flush<C: Connector>(&mut self, store: &SyncStore<C>) -> bool {
        let logs = store.logs();
        let mut failed = false;
        for entry in self.take_new(&logs) {
            failed |= entry.severity == Severity::Error;
            if self.opts.shows(entry) {
                println!("{}", format_log_entry(entry, &self.opts));
            }
        }
        failed
    }
}

/// Connect `store` and wait for the first snapshot.
pub async fn open_session<C: Connector>(
    store: &Arc<SyncStore<C>>,
    config: ConnectionConfig,
    printer: &mut LogPrinter,
) -> Result<()> {
    let mut devices = store.watch_devices();
    store.connect(config).await;
    if !store.is_connected() {
        printer.flush(store);
        bail!("Could not connect to the database");
    }

    if tokio::time::timeout(FIRST_SNAPSHOT_TIMEOUT, devices.changed())
        .await
        .is_err()
    {
        tracing::warn!("No snapshot received within {:?}", FIRST_SNAPSHOT_TIMEOUT);
    }
    printer.flush(store);
    Ok(())
}

/// Disconnect and report whether the session logged an error.
pub async fn close_session<C: Connector>(
    store: &SyncStore<C>,
    printer: &mut LogPrinter,
    failed: bool,
) -> Result<()> {
    store.disconnect().await;
    let failed = printer.flush(store) || failed;
    if failed {
        bail!("Operation failed; see the log above");
    }
    Ok(())
}

/// Print log entries and the device table as store events arrive, until
/// Ctrl-C or `until` completes.
pub async fn run_dashboard<C: Connector>(
    store: &SyncStore<C>,
    mut events: EventReceiver,
    printer: &mut LogPrinter,
    no_color: bool,
    until: impl Future<Output = ()>,
) {
    tokio::pin!(until);
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                eprintln!("\nShutting down...");
                break;
            }
            _ = &mut until => break,
            event = events.recv() => match event {
                Ok(StoreEvent::Log { .. }) => {
                    printer.flush(store);
                }
                Ok(StoreEvent::DevicesUpdated { .. }) => {
                    print!("{}", format_device_table(&store.devices(), no_color));
                }
                Ok(StoreEvent::StateChanged { state }) => {
                    tracing::debug!("Connection state: {}", state);
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Dashboard fell behind by {} events", skipped);
                    printer.flush(store);
                }
                Err(RecvError::Closed) => break,
            }
        }
    }
    printer.flush(store);
}
