//! Per-operation calls against the model.
//!
//! Every function goes through the [`ConnectionManager`] so that the whole run
//! shares one connection.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::Result;
use serde_json::Value;
use tracing::debug;

use super::client::{ActionHandle, Model, ScpOptions, UpgradeOptions};
use super::connection::ConnectionManager;
use super::status::FleetStatus;
use crate::error::{ControlPlaneError, CupError};

/// Result of a command or action, with both key casings always present.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionResults {
    pub code: String,
    pub stdout: String,
    pub stderr: String,
    /// Capitalised `Stdout` reported by older controllers.
    pub stdout_legacy: String,
    /// Capitalised `Stderr` reported by older controllers.
    pub stderr_legacy: String,
    pub extra: HashMap<String, String>,
}

impl ActionResults {
    /// Build the record from a raw result map, cross-populating the lowercase
    /// and capitalised output keys. An empty map yields an all-empty record.
    pub fn normalize(mut raw: HashMap<String, String>) -> Self {
        if raw.is_empty() {
            return Self::default();
        }

        let mut take = |key: &str| raw.remove(key).unwrap_or_default();
        let code = ["Code", "return-code", "code"]
            .iter()
            .map(|key| take(*key))
            .find(|value| !value.is_empty())
            .unwrap_or_default();
        let (stdout, stdout_legacy) = cross_populate(take("stdout"), take("Stdout"));
        let (stderr, stderr_legacy) = cross_populate(take("stderr"), take("Stderr"));

        Self {
            code,
            stdout,
            stderr,
            stdout_legacy,
            stderr_legacy,
            extra: raw,
        }
    }

    /// True when the command reported a zero exit code.
    pub fn succeeded(&self) -> bool {
        self.code == "0"
    }
}

fn cross_populate(lower: String, upper: String) -> (String, String) {
    match (lower.is_empty(), upper.is_empty()) {
        (false, true) => (lower.clone(), lower),
        (true, false) => (upper.clone(), upper),
        _ => (lower, upper),
    }
}

/// Resolve a unit by name; the application is the part before `/`.
pub async fn get_unit_from_name(model: &dyn Model, unit_name: &str) -> Result<String> {
    let application = unit_name.split('/').next().unwrap_or_default();
    let units = model.application_units(application).await?.ok_or_else(|| {
        CupError::UnitNotFound(format!(
            "Application {} not found in model {}.",
            application,
            model.name()
        ))
    })?;

    if units.iter().any(|unit| unit == unit_name) {
        Ok(unit_name.to_string())
    } else {
        Err(CupError::UnitNotFound(format!("Unit {unit_name} not found in model.")).into())
    }
}

pub async fn get_status(manager: &ConnectionManager) -> Result<FleetStatus> {
    manager.get_model(None).await?.get_status().await
}

/// Charm name of a deployed application.
pub async fn extract_charm_name(manager: &ConnectionManager, application: &str) -> Result<String> {
    let status = get_status(manager).await?;
    let app = status.applications.get(application).ok_or_else(|| {
        CupError::Application(format!("Application {application} not found in model"))
    })?;
    Ok(app.charm_name().to_string())
}

/// Run a shell command on a unit.
pub async fn run_on_unit(
    manager: &ConnectionManager,
    unit_name: &str,
    command: &str,
    timeout: Option<Duration>,
) -> Result<ActionResults> {
    let model = manager.get_model(None).await?;
    let unit = get_unit_from_name(model.as_ref(), unit_name).await?;
    let raw = model.run_command(&unit, command, timeout).await?;
    Ok(ActionResults::normalize(raw))
}

/// Run an action on a unit and wait for it to finish.
///
/// With `raise_on_failure`, any terminal status other than `completed` fails
/// with [`CupError::ActionFailed`] carrying whatever output the controller has.
pub async fn run_action(
    manager: &ConnectionManager,
    unit_name: &str,
    action_name: &str,
    params: &HashMap<String, Value>,
    raise_on_failure: bool,
) -> Result<ActionHandle> {
    let model = manager.get_model(None).await?;
    let unit = get_unit_from_name(model.as_ref(), unit_name).await?;
    let action = model.run_action(&unit, action_name, params).await?;
    check_action_error(model.as_ref(), action, raise_on_failure).await
}

async fn check_action_error(
    model: &dyn Model,
    action: ActionHandle,
    raise_on_failure: bool,
) -> Result<ActionHandle> {
    let action = model.wait_action(&action).await?;
    if !raise_on_failure || action.is_completed() {
        return Ok(action);
    }

    let output = match model.get_action_output(&action.id).await {
        Ok(output) => Some(output),
        Err(e) if is_not_found(&e) => {
            debug!("No output recorded for action {}", action.id);
            None
        }
        Err(e) => return Err(e),
    };
    Err(CupError::ActionFailed { action, output }.into())
}

fn is_not_found(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<ControlPlaneError>(),
        Some(ControlPlaneError::NotFound(_))
    )
}

pub async fn get_application_config(
    manager: &ConnectionManager,
    application: &str,
) -> Result<HashMap<String, Value>> {
    manager.get_model(None).await?.get_config(application).await
}

pub async fn set_application_config(
    manager: &ConnectionManager,
    application: &str,
    config: &HashMap<String, String>,
) -> Result<()> {
    manager
        .get_model(None)
        .await?
        .set_config(application, config)
        .await
}

pub async fn upgrade_charm(
    manager: &ConnectionManager,
    application: &str,
    options: &UpgradeOptions,
) -> Result<()> {
    manager
        .get_model(None)
        .await?
        .upgrade_application(application, options)
        .await
}

/// Copy files from a unit to the local machine.
pub async fn scp_from_unit(
    manager: &ConnectionManager,
    unit_name: &str,
    source: &str,
    destination: &str,
    options: &ScpOptions,
) -> Result<()> {
    let model = manager.get_model(None).await?;
    let unit = get_unit_from_name(model.as_ref(), unit_name).await?;
    model
        .scp_from_unit(&unit, source, destination, options)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::juju::fake::FakeControlPlane;

    fn raw(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn fleet_with_keystone() -> FleetStatus {
        serde_json::from_str(
            r#"{
                "applications": {
                    "keystone": {
                        "charm": "keystone",
                        "charm-name": "keystone",
                        "units": {"keystone/0": {}, "keystone/1": {}}
                    }
                }
            }"#,
        )
        .unwrap()
    }

    fn manager_with_keystone() -> (std::sync::Arc<FakeControlPlane>, ConnectionManager) {
        let cp = FakeControlPlane::new("openstack");
        cp.model().set_status(fleet_with_keystone());
        let manager = ConnectionManager::new(cp.clone(), None);
        (cp, manager)
    }

    #[test]
    fn test_normalize_lowercase_stdout_only() {
        let results = ActionResults::normalize(raw(&[("stdout", "ok")]));
        assert_eq!(results.stdout, "ok");
        assert_eq!(results.stdout_legacy, "ok");
        assert_eq!(results.stderr, "");
        assert_eq!(results.stderr_legacy, "");
    }

    #[test]
    fn test_normalize_capitalised_keys() {
        let results = ActionResults::normalize(raw(&[
            ("Code", "1"),
            ("Stderr", "boom"),
            ("Stdout", "partial"),
        ]));
        assert_eq!(results.code, "1");
        assert_eq!(results.stderr, "boom");
        assert_eq!(results.stdout, "partial");
        assert!(!results.succeeded());
    }

    #[test]
    fn test_normalize_keeps_extra_keys_and_return_code() {
        let results = ActionResults::normalize(raw(&[("return-code", "0"), ("unit", "a/0")]));
        assert!(results.succeeded());
        assert_eq!(results.extra.get("unit").map(String::as_str), Some("a/0"));
        assert!(!results.extra.contains_key("return-code"));
    }

    #[test]
    fn test_normalize_empty() {
        assert_eq!(ActionResults::normalize(HashMap::new()), ActionResults::default());
    }

    #[tokio::test]
    async fn test_get_unit_from_name() {
        let (cp, manager) = manager_with_keystone();
        let model = manager.get_model(None).await.unwrap();
        assert_eq!(
            get_unit_from_name(model.as_ref(), "keystone/1").await.unwrap(),
            "keystone/1"
        );

        let err = get_unit_from_name(model.as_ref(), "keystone/5")
            .await
            .unwrap_err();
        assert!(matches!(err.downcast_ref::<CupError>(), Some(CupError::UnitNotFound(_))));

        let err = get_unit_from_name(model.as_ref(), "nova/0").await.unwrap_err();
        assert!(err.to_string().contains("Application nova not found"));
        assert_eq!(cp.connect_count(), 1);
    }

    #[tokio::test]
    async fn test_run_action_completed() {
        let (cp, manager) = manager_with_keystone();
        let mut results = HashMap::new();
        results.insert("mysqldump-file".to_string(), Value::from("/tmp/x.gz"));
        cp.model().set_action_results(results);

        let action = run_action(&manager, "keystone/0", "pause", &HashMap::new(), true)
            .await
            .unwrap();
        assert!(action.is_completed());
        assert_eq!(action.result_str("mysqldump-file"), Some("/tmp/x.gz"));
    }

    #[tokio::test]
    async fn test_run_action_failure_without_output() {
        let (cp, manager) = manager_with_keystone();
        cp.model().set_action_status("failed");

        let err = run_action(&manager, "keystone/0", "pause", &HashMap::new(), true)
            .await
            .unwrap_err();
        match err.downcast_ref::<CupError>() {
            Some(CupError::ActionFailed { action, output }) => {
                assert_eq!(action.status, "failed");
                assert!(output.is_none());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_run_action_failure_with_output() {
        let (cp, manager) = manager_with_keystone();
        cp.model().set_action_status("failed");
        cp.model()
            .set_action_output(Some(serde_json::json!({"message": "disk full"})));

        let err = run_action(&manager, "keystone/0", "pause", &HashMap::new(), true)
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CupError>(),
            Some(CupError::ActionFailed { output: Some(_), .. })
        ));
    }

    #[tokio::test]
    async fn test_run_action_failure_ignored() {
        let (cp, manager) = manager_with_keystone();
        cp.model().set_action_status("failed");

        let action = run_action(&manager, "keystone/0", "pause", &HashMap::new(), false)
            .await
            .unwrap();
        assert_eq!(action.status, "failed");
    }

    #[tokio::test]
    async fn test_run_on_unit_normalizes() {
        let (cp, manager) = manager_with_keystone();
        cp.model()
            .set_command_results(raw(&[("return-code", "0"), ("stdout", "done")]));

        let results = run_on_unit(&manager, "keystone/0", "uptime", None)
            .await
            .unwrap();
        assert_eq!(results.stdout_legacy, "done");
        assert_eq!(cp.model().calls(), vec!["run_command keystone/0 uptime"]);
    }

    #[tokio::test]
    async fn test_extract_charm_name() {
        let (_cp, manager) = manager_with_keystone();
        assert_eq!(
            extract_charm_name(&manager, "keystone").await.unwrap(),
            "keystone"
        );
        assert!(extract_charm_name(&manager, "glance").await.is_err());
    }

    #[tokio::test]
    async fn test_config_round_trip_through_gateway() {
        let (cp, manager) = manager_with_keystone();
        let mut config = HashMap::new();
        config.insert("openstack-origin".to_string(), "cloud:focal-victoria".to_string());

        set_application_config(&manager, "keystone", &config)
            .await
            .unwrap();
        let stored = get_application_config(&manager, "keystone").await.unwrap();
        assert_eq!(
            stored.get("openstack-origin"),
            Some(&Value::from("cloud:focal-victoria"))
        );
        assert_eq!(
            cp.model().calls(),
            vec!["set_config keystone openstack-origin"]
        );
    }

    #[tokio::test]
    async fn test_scp_from_unit_default_user() {
        let (cp, manager) = manager_with_keystone();
        scp_from_unit(
            &manager,
            "keystone/0",
            "/tmp/a",
            "/backup/a",
            &ScpOptions::default(),
        )
        .await
        .unwrap();
        assert_eq!(
            cp.model().calls(),
            vec!["scp_from_unit ubuntu@keystone/0:/tmp/a /backup/a"]
        );
    }
}
