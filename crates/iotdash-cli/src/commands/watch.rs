//! Watch command implementation.

use std::sync::Arc;

use anyhow::Result;

use iotdash_core::{Connector, SyncStore};
use iotdash_types::ConnectionConfig;

use crate::format::FormatOptions;
use crate::util::{LogPrinter, close_session, open_session, run_dashboard};

/// Stream the activity log and device table until Ctrl-C.
pub async fn cmd_watch<C: Connector>(
    store: &Arc<SyncStore<C>>,
    config: ConnectionConfig,
    opts: FormatOptions,
) -> Result<()> {
    let events = store.subscribe_events();
    let mut printer = LogPrinter::new(opts);
    open_session(store, config, &mut printer).await?;

    run_dashboard(
        store,
        events,
        &mut printer,
        opts.no_color,
        std::future::pending::<()>(),
    )
    .await;

    close_session(store, &mut printer, false).await
}
