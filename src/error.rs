//! Custom error types for cup.

use thiserror::Error;

use crate::juju::ActionHandle;

/// Errors raised while planning or executing a cloud upgrade.
#[derive(Error, Debug)]
pub enum CupError {
    #[error("Cannot find target to upgrade: {0}")]
    NoTarget(String),

    #[error("Unit not found: {0}")]
    UnitNotFound(String),

    #[error("Action '{}' on {} finished with status '{}'", .action.name, .action.unit, .action.status)]
    ActionFailed {
        action: ActionHandle,
        output: Option<serde_json::Value>,
    },

    #[error("Model {model} has not stabilized after {timeout_secs} seconds")]
    Timeout { model: String, timeout_secs: u64 },

    #[error("Application error: {0}")]
    Application(String),

    #[error("Invalid release codename: {0}")]
    InvalidRelease(String),

    #[error("Operation cancelled by user")]
    UserCancelled,

    #[error("Command `{command}` failed: {details}")]
    Command { command: String, details: String },
}

/// Errors reported by the control plane itself.
///
/// The first four variants mean the fleet is broken rather than slow and must
/// never be retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ControlPlaneError {
    #[error("Machine {0} is in error state: {1}")]
    Machine(String, String),

    #[error("Agent of {0} is in error state: {1}")]
    Agent(String, String),

    #[error("Unit {0} is in error state: {1}")]
    Unit(String, String),

    #[error("Application {0} is in error state: {1}")]
    Application(String, String),

    #[error("Connection to model {0} is closed")]
    Disconnected(String),

    #[error("Model {0} did not become idle within {1} seconds")]
    IdleTimeout(String, u64),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Command(String),
}

impl ControlPlaneError {
    /// Returns true if this error means the fleet itself is broken.
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Machine(_, _) | Self::Agent(_, _) | Self::Unit(_, _) | Self::Application(_, _)
        )
    }

    /// Classify an `anyhow` error raised by a control plane call.
    pub fn fatal_in(err: &anyhow::Error) -> Option<&Self> {
        err.downcast_ref::<Self>().filter(|e| e.is_fatal())
    }
}
