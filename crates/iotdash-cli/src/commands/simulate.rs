//! Simulate command implementation.

use std::sync::Arc;

use anyhow::{Result, bail};

use iotdash_core::{Connector, SimulationParams, Simulator, SyncStore};
use iotdash_types::ConnectionConfig;

use crate::cli::SimulationArgs;
use crate::config::SimulationSection;
use crate::format::FormatOptions;
use crate::util::{LogPrinter, close_session, open_session, run_dashboard};

/// Merge command-line simulation arguments over the configured defaults.
pub fn simulation_params(
    args: &SimulationArgs,
    defaults: &SimulationSection,
) -> Result<SimulationParams> {
    let params = SimulationParams::new(
        args.min.unwrap_or(defaults.min),
        args.max.unwrap_or(defaults.max),
        args.duration.unwrap_or(defaults.duration_secs),
    )?;
    Ok(params)
}

/// Run the simulator while streaming the dashboard. Ctrl-C stops the run.
pub async fn cmd_simulate<C: Connector>(
    store: &Arc<SyncStore<C>>,
    config: ConnectionConfig,
    params: SimulationParams,
    opts: FormatOptions,
) -> Result<()> {
    let events = store.subscribe_events();
    let mut printer = LogPrinter::new(opts);
    open_session(store, config, &mut printer).await?;

    let simulator = Simulator::new(Arc::clone(store));
    if !simulator.start(params).await {
        close_session(store, &mut printer, true).await?;
        bail!("Simulation did not start");
    }

    run_dashboard(
        store,
        events,
        &mut printer,
        opts.no_color,
        simulator.wait(),
    )
    .await;

    simulator.stop().await;
    close_session(store, &mut printer, false).await
}
