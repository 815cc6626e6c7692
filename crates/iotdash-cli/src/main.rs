use anyhow::{Context, Result, anyhow};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use iotdash_core::{RestConnector, SyncStore};
use iotdash_types::ConnectionConfig;

mod cli;
mod commands;
mod config;
mod format;
mod util;

use cli::{Cli, Commands, ConnectionArgs};
use commands::{
    CreateArgs, SetValue, cmd_create, cmd_delete, cmd_demo, cmd_guide, cmd_init, cmd_set,
    cmd_simulate, cmd_watch, simulation_params,
};
use config::{Config, default_config_path, resolve_connection};
use format::FormatOptions;

/// Activity log entries are printed by the dashboard itself, so their
/// tracing mirror stays off unless asked for with `-v` or `RUST_LOG`.
const DEFAULT_FILTER: &str = "info,iotdash::activity=off";
const QUIET_FILTER: &str = "warn,iotdash::activity=off";

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.quiet {
        EnvFilter::new(QUIET_FILTER)
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = match &cli.config {
        Some(path) if path.exists() || !matches!(cli.command, Commands::Init { .. }) => {
            Config::load(path)?
        }
        Some(_) => Config::default(),
        None => Config::load_default()?,
    };
    config.validate()?;

    let no_color = cli.no_color || std::env::var_os("NO_COLOR").is_some();
    let opts = FormatOptions::new(no_color, cli.quiet);

    match cli.command {
        Commands::Watch => {
            let store = SyncStore::new(RestConnector::new()?);
            cmd_watch(&store, connection(&cli.connection, &config)?, opts).await
        }
        Commands::Set { key, value } => {
            let value: SetValue = value.parse()?;
            let store = SyncStore::new(RestConnector::new()?);
            cmd_set(&store, connection(&cli.connection, &config)?, &key, value, opts).await
        }
        Commands::Create {
            name,
            kind,
            unit,
            upper_limit,
        } => {
            let store = SyncStore::new(RestConnector::new()?);
            let args = CreateArgs {
                name: &name,
                kind,
                unit: unit.as_deref(),
                upper_limit,
            };
            cmd_create(&store, connection(&cli.connection, &config)?, args, opts).await
        }
        Commands::Delete { key } => {
            let store = SyncStore::new(RestConnector::new()?);
            cmd_delete(&store, connection(&cli.connection, &config)?, &key, opts).await
        }
        Commands::Simulate { args } => {
            let params = simulation_params(&args, &config.simulation)?;
            let store = SyncStore::new(RestConnector::new()?);
            cmd_simulate(&store, connection(&cli.connection, &config)?, params, opts).await
        }
        Commands::Demo { idle, args } => {
            let params = if idle {
                None
            } else {
                Some(simulation_params(&args, &config.simulation)?)
            };
            cmd_demo(params, opts).await
        }
        Commands::Guide => {
            let path = cli
                .connection
                .path
                .unwrap_or_else(|| config.connection.tree_path.clone());
            cmd_guide(&path)
        }
        Commands::Init { force } => {
            let path = cli.config.clone().unwrap_or_else(default_config_path);
            cmd_init(&path, config, &cli.connection, force)
        }
    }
}

/// Resolve the session configuration from flags and the config file.
fn connection(args: &ConnectionArgs, config: &Config) -> Result<ConnectionConfig> {
    let resolved = resolve_connection(
        args.url.clone(),
        args.key.clone(),
        args.path.clone(),
        config,
    )
    .ok_or_else(|| {
        anyhow!(
            "No database URL. Pass --url, set IOTDASH_URL, or set connection.endpoint_url in {}",
            default_config_path().display()
        )
    })?;
    resolved
        .validate()
        .with_context(|| format!("Invalid database URL '{}'", resolved.endpoint_url))?;
    Ok(resolved)
}
