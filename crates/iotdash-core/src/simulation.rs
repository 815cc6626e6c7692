//! Simulation engine.
//!
//! Produces synthetic values for every dimmer and sensor in the current
//! snapshot and writes them as one batch per tick. A [`Simulator`] owns the
//! run: one background task drives both the periodic tick and the deadline,
//! so a run is either [`SimulationState::Idle`] or
//! [`SimulationState::Running`] and stopping it cancels everything at once.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use rand::Rng;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use iotdash_types::{DeviceTree, Severity};

use crate::client::Connector;
use crate::error::{Error, Result};
use crate::events::StoreEvent;
use crate::store::SyncStore;

/// Time between two simulation ticks.
pub const TICK_INTERVAL: Duration = Duration::from_secs(5);

/// Bounds of the uniform draw for simulated values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationRange {
    min: f64,
    max: f64,
}

impl SimulationRange {
    /// Create a range. Both bounds must be finite and `min <= max`.
    pub fn new(min: f64, max: f64) -> Result<Self> {
        if !min.is_finite() || !max.is_finite() {
            return Err(Error::invalid_config(format!(
                "simulation range {}-{} must use finite numbers",
                min, max
            )));
        }
        if min > max {
            return Err(Error::invalid_config(format!(
                "simulation minimum {} is greater than maximum {}",
                min, max
            )));
        }
        Ok(Self { min, max })
    }

    /// Lower bound.
    pub fn min(&self) -> f64 {
        self.min
    }

    /// Upper bound.
    pub fn max(&self) -> f64 {
        self.max
    }

    /// Draw a value, rounded to one decimal place and clamped to
    /// `[0, upper_limit]`.
    pub fn sample<R: Rng>(&self, upper_limit: f64, rng: &mut R) -> f64 {
        let raw = if self.min == self.max {
            self.min
        } else {
            rng.random_range(self.min..=self.max)
        };
        let rounded = (raw * 10.0).round() / 10.0;
        rounded.min(upper_limit).max(0.0)
    }
}

/// Compute one tick's batch: a value for every dimmer and sensor in `tree`,
/// keyed by device key. Switches are left out.
pub fn compute_batch<R: Rng>(
    tree: &DeviceTree,
    range: &SimulationRange,
    rng: &mut R,
) -> BTreeMap<String, f64> {
    tree.iter()
        .filter(|(_, device)| device.kind().is_bounded())
        .map(|(key, device)| (key.to_string(), range.sample(device.upper_limit(), rng)))
        .collect()
}

/// Parameters of one simulation run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationParams {
    /// Bounds of the drawn values.
    pub range: SimulationRange,
    /// Total run time before the simulation completes on its own.
    pub duration: Duration,
}

impl SimulationParams {
    /// Create parameters from user input. `duration_secs` must be non-zero.
    pub fn new(min: f64, max: f64, duration_secs: u64) -> Result<Self> {
        let range = SimulationRange::new(min, max)?;
        if duration_secs == 0 {
            return Err(Error::invalid_config(
                "simulation duration must be at least one second",
            ));
        }
        Ok(Self {
            range,
            duration: Duration::from_secs(duration_secs),
        })
    }
}

/// Lifecycle of the simulator.
#[derive(Debug, Default)]
pub enum SimulationState {
    /// No run in progress.
    #[default]
    Idle,
    /// A run is in progress.
    Running {
        /// Identifies the run so a finished task only clears its own state.
        run_id: u64,
        /// Parameters of the run.
        params: SimulationParams,
        /// Cancels the tick and deadline task.
        cancel: CancellationToken,
        /// The tick and deadline task.
        handle: JoinHandle<()>,
    },
}

/// Drives periodic simulation ticks through a [`SyncStore`].
///
/// # Example
///
/// ```
/// use iotdash_core::{MemoryConnector, SimulationParams, Simulator, SyncStore};
/// use iotdash_types::ConnectionConfig;
///
/// # async fn example() -> iotdash_core::Result<()> {
/// let store = SyncStore::new(MemoryConnector::new());
/// store
///     .connect(ConnectionConfig::new("https://demo.firebaseio.com", ""))
///     .await;
///
/// let simulator = Simulator::new(store);
/// simulator.start(SimulationParams::new(10.0, 20.0, 30)?).await;
/// simulator.wait().await;
/// # Ok(())
/// # }
/// ```
pub struct Simulator<C: Connector> {
    store: Arc<SyncStore<C>>,
    state: Arc<Mutex<SimulationState>>,
    running: Arc<watch::Sender<bool>>,
    next_run_id: AtomicU64,
    tick_interval: Duration,
}

impl<C: Connector> Simulator<C> {
    /// Create an idle simulator for `store`.
    pub fn new(store: Arc<SyncStore<C>>) -> Self {
        Self {
            store,
            state: Arc::new(Mutex::new(SimulationState::Idle)),
            running: Arc::new(watch::Sender::new(false)),
            next_run_id: AtomicU64::new(0),
            tick_interval: TICK_INTERVAL,
        }
    }

    /// Override the tick interval.
    #[must_use]
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval.max(Duration::from_millis(1));
        self
    }

    /// Returns `true` while a run is in progress.
    pub fn is_running(&self) -> bool {
        *self.running.borrow()
    }

    /// Receiver notified when a run starts or ends.
    pub fn watch_running(&self) -> watch::Receiver<bool> {
        self.running.subscribe()
    }

    /// Parameters of the current run.
    pub async fn params(&self) -> Option<SimulationParams> {
        match &*self.state.lock().await {
            SimulationState::Running { params, .. } => Some(*params),
            SimulationState::Idle => None,
        }
    }

    /// Start a run. Returns `false` without starting when the store is not
    /// connected or a run is already in progress.
    ///
    /// The first tick fires one interval after the start; the run completes
    /// on its own once `params.duration` has elapsed.
    pub async fn start(&self, params: SimulationParams) -> bool {
        if !self.store.is_connected() {
            self.store
                .log("Cannot simulate: Not connected", Severity::Error);
            return false;
        }

        let mut state = self.state.lock().await;
        if matches!(*state, SimulationState::Running { .. }) {
            self.store
                .log("Simulation already running", Severity::Warning);
            return false;
        }

        let run_id = self.next_run_id.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        self.store.log(
            format!(
                "Starting simulation: range {}-{} for {}s",
                params.range.min(),
                params.range.max(),
                params.duration.as_secs()
            ),
            Severity::Info,
        );

        let handle = tokio::spawn(run(
            Arc::clone(&self.store),
            Arc::clone(&self.state),
            Arc::clone(&self.running),
            run_id,
            params,
            self.tick_interval,
            cancel.clone(),
        ));

        *state = SimulationState::Running {
            run_id,
            params,
            cancel,
            handle,
        };
        self.running.send_replace(true);
        self.store
            .emit(StoreEvent::SimulationChanged { running: true });
        true
    }

    /// Stop the current run without waiting for its deadline. Returns
    /// `false` if nothing was running.
    pub async fn stop(&self) -> bool {
        let previous = std::mem::take(&mut *self.state.lock().await);
        let SimulationState::Running { cancel, handle, .. } = previous else {
            return false;
        };

        cancel.cancel();
        if let Err(e) = handle.await {
            debug!("Simulation task ended abnormally: {}", e);
        }
        self.running.send_replace(false);
        self.store.log("Simulation stopped", Severity::Info);
        self.store
            .emit(StoreEvent::SimulationChanged { running: false });
        true
    }

    /// Stop the run if one is in progress, otherwise start one with
    /// `params`. Returns whether a run is in progress afterwards.
    pub async fn toggle(&self, params: SimulationParams) -> bool {
        if self.stop().await {
            false
        } else {
            self.start(params).await
        }
    }

    /// Wait until no run is in progress.
    pub async fn wait(&self) {
        let mut running = self.running.subscribe();
        // The sender lives in self, so the channel cannot close here.
        let _ = running.wait_for(|running| !*running).await;
    }
}

impl<C: Connector> Drop for Simulator<C> {
    fn drop(&mut self) {
        if let Ok(state) = self.state.try_lock() {
            if let SimulationState::Running { cancel, .. } = &*state {
                cancel.cancel();
            }
        }
    }
}

async fn run<C: Connector>(
    store: Arc<SyncStore<C>>,
    state: Arc<Mutex<SimulationState>>,
    running: Arc<watch::Sender<bool>>,
    run_id: u64,
    params: SimulationParams,
    tick_interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + tick_interval, tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let deadline = tokio::time::sleep(params.duration);
    tokio::pin!(deadline);

    loop {
        // A tick due at the deadline still runs before completion.
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => store.simulate_range(&params.range).await,
            _ = &mut deadline => break,
        }
    }

    {
        let mut state = state.lock().await;
        match &*state {
            SimulationState::Running { run_id: current, .. } if *current == run_id => {
                *state = SimulationState::Idle;
            }
            _ => return,
        }
    }
    running.send_replace(false);
    store.log("Simulation completed", Severity::Success);
    store.emit(StoreEvent::SimulationChanged { running: false });
}
