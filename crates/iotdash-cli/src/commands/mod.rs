//! Command implementations for the CLI.

mod create;
mod delete;
mod demo;
mod guide;
mod init;
mod set;
mod simulate;
mod watch;

pub use create::{CreateArgs, cmd_create};
pub use delete::cmd_delete;
pub use demo::cmd_demo;
pub use guide::cmd_guide;
pub use init::cmd_init;
pub use set::{SetValue, cmd_set};
pub use simulate::{cmd_simulate, simulation_params};
pub use watch::cmd_watch;
