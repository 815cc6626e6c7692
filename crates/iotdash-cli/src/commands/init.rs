//! Init command implementation.

use std::path::Path;

use anyhow::{Result, bail};

use crate::cli::ConnectionArgs;
use crate::config::Config;

/// Apply connection flags on top of `config`.
pub fn apply_connection_args(mut config: Config, args: &ConnectionArgs) -> Config {
    if let Some(url) = &args.url {
        config.connection.endpoint_url = Some(url.clone());
    }
    if let Some(key) = &args.key {
        config.connection.endpoint_key = Some(key.clone());
    }
    if let Some(path) = &args.path {
        config.connection.tree_path = path.clone();
    }
    config
}

/// Write `config` with the connection flags applied to `path`.
pub fn cmd_init(path: &Path, config: Config, args: &ConnectionArgs, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!(
            "{} already exists. Pass --force to overwrite it.",
            path.display()
        );
    }

    let config = apply_connection_args(config, args);
    config.validate()?;
    config.save(path)?;
    println!("Wrote {}", path.display());
    Ok(())
}
