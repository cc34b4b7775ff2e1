//! Control plane abstraction.
//!
//! [`ControlPlane`] opens model connections; [`Model`] is one live connection.
//! The shipped implementation lives in [`super::cli`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use super::status::FleetStatus;

/// Frame size requested on every new connection to avoid reconnect churn on
/// large status payloads.
pub const MAX_FRAME_SIZE: usize = 1 << 30;

/// Opens connections to models.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Connect to `model_name`, or to the model currently in scope when `None`.
    async fn connect(&self, model_name: Option<&str>, max_frame_size: usize)
    -> Result<Arc<dyn Model>>;

    /// Name of the model currently in scope on the controller.
    async fn current_model_name(&self) -> Result<String>;
}

/// A live connection to a single model.
#[async_trait]
pub trait Model: Send + Sync {
    fn name(&self) -> &str;

    fn is_connected(&self) -> bool;

    async fn disconnect(&self) -> Result<()>;

    async fn get_status(&self) -> Result<FleetStatus>;

    /// Unit names of an application, or `None` if the application is absent.
    async fn application_units(&self, application: &str) -> Result<Option<Vec<String>>>;

    /// Enqueue an action on a unit.
    async fn run_action(
        &self,
        unit: &str,
        action: &str,
        params: &HashMap<String, Value>,
    ) -> Result<ActionHandle>;

    /// Block until the action reaches a terminal state and return its final form.
    async fn wait_action(&self, action: &ActionHandle) -> Result<ActionHandle>;

    /// Recorded output of an action. Fails with `ControlPlaneError::NotFound`
    /// when the controller has no output for it.
    async fn get_action_output(&self, action_id: &str) -> Result<Value>;

    /// Run a shell command on a unit and return the raw result record.
    async fn run_command(
        &self,
        unit: &str,
        command: &str,
        timeout: Option<Duration>,
    ) -> Result<HashMap<String, String>>;

    async fn get_config(&self, application: &str) -> Result<HashMap<String, Value>>;

    async fn set_config(&self, application: &str, config: &HashMap<String, String>) -> Result<()>;

    async fn upgrade_application(&self, application: &str, options: &UpgradeOptions) -> Result<()>;

    async fn scp_from_unit(
        &self,
        unit: &str,
        source: &str,
        destination: &str,
        options: &ScpOptions,
    ) -> Result<()>;

    /// Return once every agent has been idle for `idle_period`, failing after
    /// `timeout`. Broken machines, agents, units and applications fail with the
    /// matching fatal `ControlPlaneError`.
    async fn wait_for_idle(&self, idle_period: Duration, timeout: Duration) -> Result<()>;
}

/// An action enqueued on a unit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionHandle {
    pub id: String,
    pub name: String,
    pub unit: String,
    pub status: String,
    pub results: HashMap<String, Value>,
}

impl ActionHandle {
    pub fn is_completed(&self) -> bool {
        self.status == "completed"
    }

    /// String value of a result key, if present.
    pub fn result_str(&self, key: &str) -> Option<&str> {
        self.results.get(key).and_then(Value::as_str)
    }
}

/// Options for refreshing an application's charm.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpgradeOptions {
    pub channel: Option<String>,
    pub force_series: bool,
    pub force_units: bool,
    pub path: Option<String>,
    pub resources: HashMap<String, String>,
    pub revision: Option<u32>,
    pub switch: Option<String>,
}

/// Options for copying files from a unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScpOptions {
    pub user: String,
    pub proxy: bool,
    pub scp_opts: String,
}

impl Default for ScpOptions {
    fn default() -> Self {
        Self {
            user: "ubuntu".to_string(),
            proxy: false,
            scp_opts: String::new(),
        }
    }
}
