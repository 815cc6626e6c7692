//! Create command implementation.

use std::sync::Arc;

use anyhow::Result;

use iotdash_core::{Connector, SyncStore};
use iotdash_types::{ConnectionConfig, Device, DeviceKind};

use crate::format::FormatOptions;
use crate::util::{LogPrinter, close_session, open_session};

/// Arguments for the create command.
pub struct CreateArgs<'a> {
    pub name: &'a str,
    pub kind: DeviceKind,
    pub unit: Option<&'a str>,
    pub upper_limit: Option<f64>,
}

pub async fn cmd_create<C: Connector>(
    store: &Arc<SyncStore<C>>,
    config: ConnectionConfig,
    args: CreateArgs<'_>,
    opts: FormatOptions,
) -> Result<()> {
    let CreateArgs {
        name,
        kind,
        unit,
        upper_limit,
    } = args;

    let mut printer = LogPrinter::new(opts);
    open_session(store, config, &mut printer).await?;

    let device = Device::new_with_defaults(kind, upper_limit, unit);
    store.create_device(name, device).await;

    let failed = printer.flush(store);
    close_session(store, &mut printer, failed).await
}
