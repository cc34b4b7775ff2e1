//! cup - charmed cloud upgrade planning and orchestration CLI tool.
//!
//! Upgrades a Juju-managed cloud one release at a time:
//! - Analyzes the applications of a model and the release they run
//! - Plans a database backup followed by principal and subordinate upgrades
//! - Applies each step, waiting for the model to settle after every change

mod apps;
mod config;
mod error;
mod juju;
mod output;
mod release;
mod steps;

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use dialoguer::Confirm;
use tracing::{debug, error};

use config::{Args, Config};
use error::CupError;
use juju::ConnectionManager;
use juju::cli::JujuCli;
use juju::connection::resolve_model_name;
use steps::{Analysis, Executor, generate_plan};

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let config = Config::from_args(args);

    // Initialize logging
    if let Err(e) = init_tracing(&config.log_level) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    debug!("Starting cup - charmed cloud upgrade tool");

    if let Err(e) = run(&config).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

/// Main application logic.
async fn run(config: &Config) -> Result<()> {
    let control_plane = Arc::new(JujuCli::new(config.juju_binary.clone()));
    let model_name = resolve_model_name(control_plane.as_ref(), config.model.as_deref()).await?;
    debug!("Using model {}", model_name);

    let manager = ConnectionManager::new(control_plane, Some(model_name.clone()));
    let result = plan_and_execute(config, &manager, &model_name).await;
    manager.reset().await;
    result
}

async fn plan_and_execute(
    config: &Config,
    manager: &ConnectionManager,
    model_name: &str,
) -> Result<()> {
    let analysis = Analysis::create(manager).await?;
    output::print_analysis(model_name, &analysis);

    let plan = generate_plan(&analysis).await?;
    output::print_plan(&plan);

    if config.dry_run {
        println!();
        println!("{}", "Dry run: no changes were made.".yellow());
        return Ok(());
    }

    if config.needs_confirmation()
        && !Confirm::new()
            .with_prompt("Execute the upgrade plan?")
            .default(false)
            .interact()?
    {
        return Err(CupError::UserCancelled.into());
    }

    Executor::new(manager, model_name, config.timeout_secs, config.backup_dir.clone())
        .with_progress(true)
        .execute(&plan)
        .await?;

    println!();
    println!(
        "{} Upgrade to {} complete",
        "✓".green(),
        analysis
            .target()
            .map_or_else(|| "target".to_string(), |r| r.to_string())
            .bold()
    );
    Ok(())
}

/// Initialize tracing subscriber.
fn init_tracing(log_level: &str) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .map_err(|e| anyhow::anyhow!("Failed to initialize log filter: {}", e))?;

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    Ok(())
}
