//! CLI argument definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use iotdash_types::DeviceKind;

#[derive(Debug, Parser)]
#[command(name = "iotdash")]
#[command(author, version, about = "Realtime dashboard for IoT device trees", long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Path to the configuration file
    #[arg(short, long, global = true, env = "IOTDASH_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub connection: ConnectionArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Remote store arguments; each overrides the config file.
#[derive(Debug, Clone, Default, Args)]
pub struct ConnectionArgs {
    /// Database URL (e.g. https://my-project.firebaseio.com)
    #[arg(long = "url", id = "endpoint_url", global = true, env = "IOTDASH_URL")]
    pub url: Option<String>,

    /// Database secret or ID token
    #[arg(
        long = "key",
        id = "endpoint_key",
        global = true,
        env = "IOTDASH_KEY",
        hide_env_values = true
    )]
    pub key: Option<String>,

    /// Path of the device tree inside the database
    #[arg(long = "path", id = "tree_path", global = true)]
    pub path: Option<String>,
}

/// Simulation arguments; unset values fall back to the config file.
#[derive(Debug, Clone, Default, Args)]
pub struct SimulationArgs {
    /// Lower bound of generated values
    #[arg(long)]
    pub min: Option<f64>,

    /// Upper bound of generated values
    #[arg(long)]
    pub max: Option<f64>,

    /// Run length in seconds
    #[arg(short, long)]
    pub duration: Option<u64>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Connect and stream the activity log and device table until Ctrl-C
    Watch,

    /// Write a device value (a number, `on`, `off`, or `toggle`)
    Set {
        /// Device key
        key: String,

        /// New value
        #[arg(allow_hyphen_values = true)]
        value: String,
    },

    /// Create or replace a device
    Create {
        /// Display name; normalized into the device key
        name: String,

        /// Device kind
        #[arg(short, long)]
        kind: DeviceKind,

        /// Unit label (dimmers default to RPM, sensors to %)
        #[arg(short, long)]
        unit: Option<String>,

        /// Maximum value (dimmers default to 1024, sensors to 100)
        #[arg(long)]
        upper_limit: Option<f64>,
    },

    /// Delete a device
    Delete {
        /// Device key
        key: String,
    },

    /// Write random values to every dimmer and sensor for a while
    Simulate {
        #[command(flatten)]
        args: SimulationArgs,
    },

    /// Run the dashboard against a built-in in-memory device tree
    Demo {
        /// Do not start the simulator
        #[arg(long)]
        idle: bool,

        #[command(flatten)]
        args: SimulationArgs,
    },

    /// Print the JSON tree shape the dashboard expects
    Guide,

    /// Write the connection flags to the config file
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },
}
