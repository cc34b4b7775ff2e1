//! CLI configuration and argument parsing.

use std::path::PathBuf;

use clap::Parser;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const COMMIT: &str = env!("BUILD_COMMIT");
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Charmed cloud upgrade planning and orchestration CLI tool.
///
/// Analyzes the applications of a model, plans the upgrade to the next
/// release, and applies it step by step, waiting for the model to settle
/// after every change.
#[derive(Parser, Debug, Clone)]
#[command(name = "cup")]
#[command(about = "Charmed cloud upgrade planning and orchestration CLI tool")]
#[command(version = const_format::formatcp!(
    "{} (commit: {}, build date: {})",
    VERSION, COMMIT, BUILD_DATE
))]
pub struct Args {
    /// Model to upgrade (defaults to MODEL_NAME, then the current model)
    #[arg(short, long, env = "JUJU_MODEL")]
    pub model: Option<String>,

    /// Skip confirmation prompts (non-interactive mode)
    #[arg(short, long, default_value = "false")]
    pub yes: bool,

    /// Show upgrade plan without executing
    #[arg(long, default_value = "false")]
    pub dry_run: bool,

    /// Seconds to wait for the model to settle after each change (0 = 3600)
    #[arg(long, default_value = "0")]
    pub timeout: u64,

    /// Directory the database backup is copied into
    #[arg(long, default_value = ".")]
    pub backup_dir: PathBuf,

    /// Juju client binary
    #[arg(long, default_value = "juju")]
    pub juju_binary: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn", env = "CUP_LOG_LEVEL")]
    pub log_level: String,
}

/// Application configuration derived from CLI args.
#[derive(Debug, Clone)]
pub struct Config {
    pub model: Option<String>,
    pub yes: bool,
    pub dry_run: bool,
    pub timeout_secs: u64,
    pub backup_dir: PathBuf,
    pub juju_binary: String,
    pub log_level: String,
}

impl Config {
    /// Create config from CLI arguments.
    pub fn from_args(args: Args) -> Self {
        Self {
            model: args.model.filter(|m| !m.is_empty()),
            yes: args.yes,
            dry_run: args.dry_run,
            timeout_secs: args.timeout,
            backup_dir: args.backup_dir,
            juju_binary: args.juju_binary,
            log_level: args.log_level,
        }
    }

    /// Check if the user must confirm before the plan runs.
    pub fn needs_confirmation(&self) -> bool {
        !self.yes && !self.dry_run
    }
}
