//! Build the upgrade plan for the whole cloud.

use anyhow::Result;
use tracing::{debug, error, info};

use super::analyze::Analysis;
use super::step::{StepAction, UpgradeStep};
use crate::apps::{ApplicationKind, PlanContribution, UpgradeCandidate};
use crate::error::CupError;

/// Generate the plan that upgrades the cloud to the release after the one it runs.
///
/// The plan always backs up the databases first, then upgrades principals,
/// then subordinates.
pub async fn generate_plan(analysis: &Analysis) -> Result<UpgradeStep> {
    let target = analysis.target().ok_or_else(|| {
        CupError::NoTarget(match analysis.current_release {
            Some(release) => format!("{release} is the latest known release"),
            None => "current release is unknown".to_string(),
        })
    })?;
    info!("Generating upgrade plan to {}", target);

    let mut plan = UpgradeStep::group("Top level plan");
    plan.add_step(UpgradeStep::leaf("backup mysql databases", StepAction::Backup));

    plan.add_step(
        create_upgrade_group(
            analysis,
            target.codename(),
            "Principal(s) upgrade plan",
            |app| app.kind() == ApplicationKind::Principal,
        )
        .await?,
    );
    plan.add_step(
        create_upgrade_group(
            analysis,
            target.codename(),
            "Subordinate(s) upgrade plan",
            |app| app.kind() == ApplicationKind::Subordinate,
        )
        .await?,
    );

    Ok(plan)
}

/// Collect the plans of every application accepted by `filter`, in order.
///
/// Applications that skip are left out. The first failure aborts the group and
/// no later application is asked for a plan.
pub async fn create_upgrade_group(
    analysis: &Analysis,
    target: &str,
    description: &str,
    filter: impl Fn(&dyn UpgradeCandidate) -> bool,
) -> Result<UpgradeStep> {
    let mut group = UpgradeStep::group(description);

    for app in analysis.apps.iter().filter(|app| filter(app.as_ref())) {
        match app.generate_upgrade_plan(target).await {
            PlanContribution::Steps(steps) if !steps.is_empty() => group.add_step(steps),
            PlanContribution::Steps(_) | PlanContribution::Nothing => {}
            PlanContribution::Skipped(reason) => {
                debug!(
                    "'{}' halted the upgrade planning generation: {}",
                    app.name(),
                    reason
                );
            }
            PlanContribution::Failed(e) => {
                error!("Cannot generate upgrade plan for '{}': {}", app.name(), e);
                return Err(e);
            }
        }
    }

    Ok(group)
}
