//! Command-line interface: argument parsing and dispatch.

pub mod args;
pub mod dispatch;

pub use args::{Cli, Commands, DeployArgs, StatusArgs};
pub use dispatch::CommandDispatcher;
