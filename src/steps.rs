//! Upgrade planning and execution.

pub mod analyze;
pub mod backup;
pub mod execute;
pub mod plan;
pub mod step;

pub use analyze::Analysis;
pub use execute::Executor;
pub use plan::generate_plan;
pub use step::{StepAction, UpgradeStep};
