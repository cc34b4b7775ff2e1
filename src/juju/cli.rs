//! Control plane backed by the `juju` command line client.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use tokio::time::{Instant, sleep};
use tracing::debug;

use super::client::{ActionHandle, ControlPlane, Model, ScpOptions, UpgradeOptions};
use super::status::FleetStatus;
use crate::error::ControlPlaneError;

/// Interval between status polls while waiting for idleness or actions.
const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Action states after which nothing more will happen.
const TERMINAL_ACTION_STATES: &[&str] = &["completed", "failed", "cancelled", "aborted", "error"];

/// Fragments of `juju` stderr that mean the controller is unreachable.
const CONNECTION_ERRORS: &[&str] = &[
    "connection refused",
    "cannot connect",
    "connection is shut down",
    "i/o timeout",
    "no such host",
];

/// Drives the `juju` binary found on `PATH`.
pub struct JujuCli {
    binary: String,
}

impl JujuCli {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    async fn show_model(&self, model_name: Option<&str>) -> Result<String> {
        let mut args = vec!["show-model".to_string()];
        args.extend(model_name.map(str::to_string));
        args.push("--format=json".to_string());

        let output = run_juju(&self.binary, &args).await?;
        let json: Value =
            serde_json::from_str(&output).context("Failed to parse show-model JSON output")?;
        parse_model_name(&json).ok_or_else(|| {
            ControlPlaneError::Command("Missing model name in show-model output".to_string())
                .into()
        })
    }
}

impl Default for JujuCli {
    fn default() -> Self {
        Self::new("juju")
    }
}

#[async_trait]
impl ControlPlane for JujuCli {
    async fn connect(
        &self,
        model_name: Option<&str>,
        max_frame_size: usize,
    ) -> Result<Arc<dyn Model>> {
        // The client negotiates its own frame size; the value is informational here.
        debug!("Requested max frame size {} bytes", max_frame_size);
        let name = self.show_model(model_name).await?;
        Ok(Arc::new(JujuModel {
            binary: self.binary.clone(),
            name,
            connected: AtomicBool::new(true),
        }))
    }

    async fn current_model_name(&self) -> Result<String> {
        self.show_model(None).await
    }
}

/// One model reached through the CLI. Marked disconnected as soon as a call
/// fails to reach the controller.
pub struct JujuModel {
    binary: String,
    name: String,
    connected: AtomicBool,
}

impl JujuModel {
    async fn juju(&self, subcommand: &str, args: Vec<String>) -> Result<String> {
        let mut full = vec![subcommand.to_string(), "-m".to_string(), self.name.clone()];
        full.extend(args);

        let result = run_juju(&self.binary, &full).await;
        if let Err(e) = &result
            && matches!(
                e.downcast_ref::<ControlPlaneError>(),
                Some(ControlPlaneError::Disconnected(_))
            )
        {
            self.connected.store(false, Ordering::SeqCst);
        }
        result
    }

    async fn juju_json(&self, subcommand: &str, args: Vec<String>) -> Result<Value> {
        let output = self.juju(subcommand, args).await?;
        serde_json::from_str(&output)
            .with_context(|| format!("Failed to parse juju {subcommand} JSON output"))
    }

    async fn show_task(&self, action_id: &str) -> Result<Value> {
        let json = self
            .juju_json(
                "show-task",
                vec![action_id.to_string(), "--format=json".to_string()],
            )
            .await?;
        Ok(unwrap_single_entry(json))
    }
}

#[async_trait]
impl Model for JujuModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn disconnect(&self) -> Result<()> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn get_status(&self) -> Result<FleetStatus> {
        let output = self
            .juju("status", vec!["--format=json".to_string()])
            .await?;
        serde_json::from_str(&output).context("Failed to parse status JSON output")
    }

    async fn application_units(&self, application: &str) -> Result<Option<Vec<String>>> {
        Ok(self.get_status().await?.units_of(application))
    }

    async fn run_action(
        &self,
        unit: &str,
        action: &str,
        params: &HashMap<String, Value>,
    ) -> Result<ActionHandle> {
        let json = self
            .juju_json("run", run_action_args(unit, action, params))
            .await?;
        parse_action(&json, action, unit)
    }

    async fn wait_action(&self, action: &ActionHandle) -> Result<ActionHandle> {
        let mut current = action.clone();
        while !TERMINAL_ACTION_STATES.contains(&current.status.as_str()) {
            sleep(POLL_INTERVAL).await;
            let task = self.show_task(&action.id).await?;
            current = action_from_task(action, &task);
        }
        Ok(current)
    }

    async fn get_action_output(&self, action_id: &str) -> Result<Value> {
        let task = self.show_task(action_id).await?;
        task.get("results").cloned().ok_or_else(|| {
            ControlPlaneError::NotFound(format!("output of action {action_id}")).into()
        })
    }

    async fn run_command(
        &self,
        unit: &str,
        command: &str,
        timeout: Option<Duration>,
    ) -> Result<HashMap<String, String>> {
        let json = self
            .juju_json("exec", exec_args(unit, command, timeout))
            .await?;
        Ok(parse_exec_results(&json, unit))
    }

    async fn get_config(&self, application: &str) -> Result<HashMap<String, Value>> {
        let json = self
            .juju_json(
                "config",
                vec![application.to_string(), "--format=json".to_string()],
            )
            .await?;
        Ok(parse_config(&json))
    }

    async fn set_config(&self, application: &str, config: &HashMap<String, String>) -> Result<()> {
        let mut args = vec![application.to_string()];
        let mut pairs: Vec<_> = config.iter().map(|(k, v)| format!("{k}={v}")).collect();
        pairs.sort();
        args.extend(pairs);
        self.juju("config", args).await.map(|_| ())
    }

    async fn upgrade_application(&self, application: &str, options: &UpgradeOptions) -> Result<()> {
        self.juju("refresh", refresh_args(application, options))
            .await
            .map(|_| ())
    }

    async fn scp_from_unit(
        &self,
        unit: &str,
        source: &str,
        destination: &str,
        options: &ScpOptions,
    ) -> Result<()> {
        self.juju("scp", scp_args(unit, source, destination, options))
            .await
            .map(|_| ())
    }

    async fn wait_for_idle(&self, idle_period: Duration, timeout: Duration) -> Result<()> {
        let start = Instant::now();
        let mut idle_since: Option<Instant> = None;

        loop {
            let status = self.get_status().await?;
            if let Some(err) = status.fatal_error() {
                return Err(err.into());
            }

            if status.is_idle() {
                let since = *idle_since.get_or_insert_with(Instant::now);
                if since.elapsed() >= idle_period {
                    return Ok(());
                }
            } else {
                idle_since = None;
            }

            if start.elapsed() >= timeout {
                return Err(
                    ControlPlaneError::IdleTimeout(self.name.clone(), timeout.as_secs()).into(),
                );
            }
            sleep(POLL_INTERVAL).await;
        }
    }
}

/// Run `juju` with `args` and return its stdout.
async fn run_juju(binary: &str, args: &[String]) -> Result<String> {
    debug!("Running: {} {}", binary, args.join(" "));

    let output = tokio::process::Command::new(binary)
        .args(args)
        .output()
        .await
        .with_context(|| format!("Failed to execute '{binary}'. Is the juju client installed?"))?;

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    if output.status.success() {
        return Ok(stdout);
    }

    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    // `juju run` exits non-zero for failed actions but still reports them.
    if args.first().is_some_and(|a| a == "run") && !stdout.trim().is_empty() {
        return Ok(stdout);
    }
    Err(classify_failure(args, &stderr).into())
}

fn classify_failure(args: &[String], stderr: &str) -> ControlPlaneError {
    let lower = stderr.to_lowercase();
    if CONNECTION_ERRORS.iter().any(|fragment| lower.contains(fragment)) {
        let model = args
            .iter()
            .position(|a| a == "-m")
            .and_then(|i| args.get(i + 1))
            .cloned()
            .unwrap_or_default();
        return ControlPlaneError::Disconnected(model);
    }
    if lower.contains("not found") {
        return ControlPlaneError::NotFound(stderr.to_string());
    }
    ControlPlaneError::Command(format!("juju {} failed: {}", args.join(" "), stderr))
}

fn parse_model_name(json: &Value) -> Option<String> {
    let (key, info) = json.as_object()?.iter().next()?;
    let name = info
        .get("short-name")
        .and_then(Value::as_str)
        .unwrap_or(key);
    Some(name.to_string())
}

/// `juju` keys single-entity output by the entity name; strip that level.
fn unwrap_single_entry(json: Value) -> Value {
    match json {
        Value::Object(map) if map.len() == 1 && !map.contains_key("status") => {
            map.into_iter().next().map(|(_, v)| v).unwrap_or(Value::Null)
        }
        other => other,
    }
}

fn param_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn run_action_args(unit: &str, action: &str, params: &HashMap<String, Value>) -> Vec<String> {
    let mut args = vec![unit.to_string(), action.to_string()];
    let mut pairs: Vec<_> = params
        .iter()
        .map(|(k, v)| format!("{k}={}", param_value(v)))
        .collect();
    pairs.sort();
    args.extend(pairs);
    args.push("--format=json".to_string());
    args
}

fn parse_action(json: &Value, action: &str, unit: &str) -> Result<ActionHandle> {
    let entry = json
        .get(unit)
        .cloned()
        .unwrap_or_else(|| unwrap_single_entry(json.clone()));
    let id = entry
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| ControlPlaneError::Command(format!("Missing id for action {action}")))?;

    let template = ActionHandle {
        id: id.to_string(),
        name: action.to_string(),
        unit: unit.to_string(),
        ..Default::default()
    };
    Ok(action_from_task(&template, &entry))
}

fn action_from_task(action: &ActionHandle, task: &Value) -> ActionHandle {
    let results = task
        .get("results")
        .and_then(Value::as_object)
        .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
        .unwrap_or_default();
    ActionHandle {
        status: task
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        results,
        ..action.clone()
    }
}

fn exec_args(unit: &str, command: &str, timeout: Option<Duration>) -> Vec<String> {
    let mut args = vec![
        "--unit".to_string(),
        unit.to_string(),
        "--format=json".to_string(),
    ];
    if let Some(timeout) = timeout {
        args.push(format!("--wait={}s", timeout.as_secs()));
    }
    args.push("--".to_string());
    args.push(command.to_string());
    args
}

fn parse_exec_results(json: &Value, unit: &str) -> HashMap<String, String> {
    let entry = json
        .get(unit)
        .cloned()
        .unwrap_or_else(|| unwrap_single_entry(json.clone()));
    entry
        .get("results")
        .and_then(Value::as_object)
        .map(|m| {
            m.iter()
                .map(|(k, v)| (k.clone(), param_value(v)))
                .collect()
        })
        .unwrap_or_default()
}

fn parse_config(json: &Value) -> HashMap<String, Value> {
    json.get("settings")
        .and_then(Value::as_object)
        .map(|settings| {
            settings
                .iter()
                .map(|(k, v)| (k.clone(), v.get("value").cloned().unwrap_or(Value::Null)))
                .collect()
        })
        .unwrap_or_default()
}

fn refresh_args(application: &str, options: &UpgradeOptions) -> Vec<String> {
    let mut args = vec![application.to_string()];
    if let Some(channel) = &options.channel {
        args.push(format!("--channel={channel}"));
    }
    if let Some(switch) = &options.switch {
        args.push(format!("--switch={switch}"));
    }
    if let Some(revision) = options.revision {
        args.push(format!("--revision={revision}"));
    }
    if let Some(path) = &options.path {
        args.push(format!("--path={path}"));
    }
    if options.force_series {
        args.push("--force-series".to_string());
    }
    if options.force_units {
        args.push("--force-units".to_string());
    }
    let mut resources: Vec<_> = options.resources.iter().collect();
    resources.sort();
    for (name, file) in resources {
        args.push(format!("--resource={name}={file}"));
    }
    args
}

fn scp_args(unit: &str, source: &str, destination: &str, options: &ScpOptions) -> Vec<String> {
    let mut args = Vec::new();
    if options.proxy {
        args.push("--proxy".to_string());
    }
    args.push(format!("{}@{}:{}", options.user, unit, source));
    args.push(destination.to_string());
    if !options.scp_opts.is_empty() {
        args.push("--".to_string());
        args.extend(options.scp_opts.split_whitespace().map(str::to_string));
    }
    args
}
