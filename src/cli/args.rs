//! CLI argument definitions.
//!
//! All arguments are defined with clap's derive macros; [`Cli`] is the entry
//! point.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Palisade - Identity server stack provisioning.
#[derive(Debug, Parser)]
#[command(name = "palisade")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the persisted environment file
    #[arg(
        long,
        global = true,
        env = "PALISADE_ENV_FILE",
        default_value = "/etc/palisade/palisade.env"
    )]
    pub env_file: PathBuf,

    /// Never prompt; fail when a mandatory value has no source
    #[arg(long, global = true)]
    pub non_interactive: bool,

    /// Minimal output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Provision the stack (default if no command specified)
    Deploy(DeployArgs),

    /// Show which steps are already completed
    Status(StatusArgs),

    /// Regenerate the installation summary from current host state
    Summary(DeployArgs),
}

/// Arguments shared by `deploy` and `summary`.
#[derive(Debug, Clone, clap::Args)]
pub struct DeployArgs {
    /// Run only the given steps, in pipeline order (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub steps: Vec<String>,

    /// Directory holding pre-change snapshots
    #[arg(long, default_value = "/var/lib/palisade/backups")]
    pub vault_dir: PathBuf,

    /// Directory holding container config templates
    #[arg(long, default_value = "/etc/palisade/templates")]
    pub template_dir: PathBuf,
}

/// Arguments for the `status` command.
#[derive(Debug, Clone, clap::Args)]
pub struct StatusArgs {
    #[command(flatten)]
    pub deploy: DeployArgs,

    /// Emit machine-readable JSON instead of styled lines
    #[arg(long)]
    pub json: bool,
}
