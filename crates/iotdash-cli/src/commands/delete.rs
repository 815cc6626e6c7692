//! Delete command implementation.

use std::sync::Arc;

use anyhow::Result;

use iotdash_core::{Connector, SyncStore};
use iotdash_types::ConnectionConfig;

use crate::format::FormatOptions;
use crate::util::{LogPrinter, close_session, open_session};

pub async fn cmd_delete<C: Connector>(
    store: &Arc<SyncStore<C>>,
    config: ConnectionConfig,
    key: &str,
    opts: FormatOptions,
) -> Result<()> {
    let mut printer = LogPrinter::new(opts);
    open_session(store, config, &mut printer).await?;

    if store.device(key).is_none() {
        tracing::warn!("'{}' is not in the current snapshot", key);
    }
    store.delete_device(key).await;

    let failed = printer.flush(store);
    close_session(store, &mut printer, failed).await
}
