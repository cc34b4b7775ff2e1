//! Managed applications and their upgrade contributions.

pub mod application;
pub mod subordinate;

pub use application::Application;

use async_trait::async_trait;

use crate::steps::UpgradeStep;

/// Whether an application runs on its own machines or alongside a principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplicationKind {
    Principal,
    Subordinate,
}

/// What an application contributes to the plan for a target release.
#[derive(Debug)]
pub enum PlanContribution {
    Steps(UpgradeStep),
    /// Nothing to do; contributes no child.
    Nothing,
    /// The application declined for a known reason, e.g. it already runs the target.
    Skipped(String),
    /// Plan generation failed; aborts the whole plan.
    Failed(anyhow::Error),
}

/// Anything that can be placed into an upgrade group.
#[async_trait]
pub trait UpgradeCandidate: Send + Sync {
    fn name(&self) -> &str;

    fn kind(&self) -> ApplicationKind;

    async fn generate_upgrade_plan(&self, target: &str) -> PlanContribution;
}
