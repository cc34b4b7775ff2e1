//! Walk a plan and apply it to the model.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use colored::Colorize;
use futures::future::{BoxFuture, FutureExt, join_all};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;
use tracing::info;

use super::backup;
use super::step::{StepAction, UpgradeStep};
use crate::error::CupError;
use crate::juju::{ConnectionManager, Waiter, actions};

/// Upgrades packages non-interactively, keeping the maintainer's config files.
pub const UPGRADE_PACKAGES_COMMAND: &str = "apt-get update && apt-get dist-upgrade \
    -o Dpkg::Options::=--force-confnew -o Dpkg::Options::=--force-confdef -y \
    && apt-get autoremove -y";

const PACKAGE_UPGRADE_TIMEOUT: Duration = Duration::from_secs(600);

/// Runs plan steps against a model, waiting for it to settle after every
/// step that reconfigures applications.
pub struct Executor<'a> {
    manager: &'a ConnectionManager,
    waiter: Waiter<'a>,
    timeout_secs: u64,
    backup_dir: PathBuf,
    show_progress: bool,
}

impl<'a> Executor<'a> {
    pub fn new(
        manager: &'a ConnectionManager,
        model_name: &str,
        timeout_secs: u64,
        backup_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            manager,
            waiter: Waiter::new(manager, model_name),
            timeout_secs,
            backup_dir: backup_dir.into(),
            show_progress: false,
        }
    }

    /// Show a spinner for every step while it runs.
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Run a step, then its children: concurrently when the step is parallel,
    /// otherwise in order, stopping at the first failure.
    pub fn execute<'b>(&'b self, step: &'b UpgradeStep) -> BoxFuture<'b, Result<()>> {
        async move {
            if let Some(action) = &step.action {
                self.run_step(&step.description, action).await?;
            }

            if step.parallel {
                join_all(step.children().iter().map(|child| self.execute(child)))
                    .await
                    .into_iter()
                    .collect::<Result<Vec<_>>>()?;
            } else {
                for child in step.children() {
                    self.execute(child).await?;
                }
            }
            Ok(())
        }
        .boxed()
    }

    async fn run_step(&self, description: &str, action: &StepAction) -> Result<()> {
        info!("{}", description);
        let pb = self.progress_bar(description)?;

        let result = self.apply(action).await;
        match &result {
            Ok(()) => pb.finish_with_message(format!("{} {}", "✓".green(), description)),
            Err(_) => pb.finish_with_message(format!("{} {}", "✗".red(), description)),
        }
        result
    }

    async fn apply(&self, action: &StepAction) -> Result<()> {
        match action {
            StepAction::Backup => {
                let path = backup::backup(self.manager, &self.backup_dir).await?;
                info!("Database backup saved to {}", path.display());
            }
            StepAction::UpgradePackages { units } => {
                upgrade_packages(self.manager, units).await?;
            }
            StepAction::UpgradeCharm {
                application,
                options,
            } => {
                actions::upgrade_charm(self.manager, application, options).await?;
            }
            StepAction::SetConfig {
                application,
                config,
            } => {
                let config: HashMap<String, String> = config
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                actions::set_application_config(self.manager, application, &config).await?;
            }
            StepAction::CheckWorkload {
                application,
                origin_setting,
                expected_origin,
            } => {
                check_workload(self.manager, application, origin_setting, expected_origin).await?;
            }
        }

        if action.changes_model() {
            self.waiter.wait(self.timeout_secs).await?;
        }
        Ok(())
    }

    fn progress_bar(&self, description: &str) -> Result<ProgressBar> {
        if !self.show_progress {
            return Ok(ProgressBar::hidden());
        }
        let pb = ProgressBar::new_spinner();
        pb.set_style(ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}")?);
        pb.enable_steady_tick(Duration::from_millis(100));
        pb.set_message(description.to_string());
        Ok(pb)
    }
}

/// Upgrade packages on every unit concurrently.
async fn upgrade_packages(manager: &ConnectionManager, units: &[String]) -> Result<()> {
    let results = join_all(units.iter().map(|unit| {
        actions::run_on_unit(
            manager,
            unit,
            UPGRADE_PACKAGES_COMMAND,
            Some(PACKAGE_UPGRADE_TIMEOUT),
        )
    }))
    .await;

    for (unit, result) in units.iter().zip(results) {
        let result = result?;
        if !result.succeeded() {
            return Err(CupError::Command {
                command: format!("package upgrade on {unit}"),
                details: result.stderr,
            }
            .into());
        }
    }
    Ok(())
}

async fn check_workload(
    manager: &ConnectionManager,
    application: &str,
    origin_setting: &str,
    expected: &str,
) -> Result<()> {
    let config = actions::get_application_config(manager, application).await?;
    let actual = config
        .get(origin_setting)
        .and_then(Value::as_str)
        .unwrap_or_default();
    if actual != expected {
        return Err(CupError::Application(format!(
            "Cannot upgrade '{application}': {origin_setting} is '{actual}', expected '{expected}'"
        ))
        .into());
    }
    Ok(())
}
