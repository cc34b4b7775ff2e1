//! In-memory control plane for tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Result, bail};
use async_trait::async_trait;
use serde_json::Value;

use super::client::{ActionHandle, ControlPlane, Model, ScpOptions, UpgradeOptions};
use super::status::FleetStatus;
use crate::error::ControlPlaneError;

/// Scripted outcome of one `wait_for_idle` poll.
#[derive(Debug, Clone)]
pub enum IdleOutcome {
    Idle,
    /// Sleep for the poll delay, then report the idle timeout.
    Busy,
    Fatal(ControlPlaneError),
    /// Mark the connection dropped and fail.
    Drop,
    Error(String),
}

pub struct FakeControlPlane {
    model: Arc<FakeModel>,
    connects: Mutex<Vec<(Option<String>, usize)>>,
    failing_connects: AtomicUsize,
    connect_delay: Mutex<Duration>,
}

impl FakeControlPlane {
    pub fn new(model_name: &str) -> Arc<Self> {
        Arc::new(Self {
            model: Arc::new(FakeModel::new(model_name)),
            connects: Mutex::new(Vec::new()),
            failing_connects: AtomicUsize::new(0),
            connect_delay: Mutex::new(Duration::ZERO),
        })
    }

    pub fn model(&self) -> &Arc<FakeModel> {
        &self.model
    }

    /// Make the next `count` connection attempts fail.
    pub fn fail_connects(&self, count: usize) {
        self.failing_connects.store(count, Ordering::SeqCst);
    }

    /// Make every connection attempt take `delay` before it resolves.
    pub fn set_connect_delay(&self, delay: Duration) {
        *self.connect_delay.lock().unwrap() = delay;
    }

    pub fn connect_count(&self) -> usize {
        self.connects.lock().unwrap().len()
    }

    pub fn last_frame_size(&self) -> Option<usize> {
        self.connects.lock().unwrap().last().map(|(_, size)| *size)
    }

    pub fn connected_names(&self) -> Vec<Option<String>> {
        self.connects
            .lock()
            .unwrap()
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }
}

#[async_trait]
impl ControlPlane for FakeControlPlane {
    async fn connect(
        &self,
        model_name: Option<&str>,
        max_frame_size: usize,
    ) -> Result<Arc<dyn Model>> {
        self.connects
            .lock()
            .unwrap()
            .push((model_name.map(str::to_string), max_frame_size));

        let delay = *self.connect_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let failing = self.failing_connects.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_connects.store(failing - 1, Ordering::SeqCst);
            bail!("connection refused");
        }

        self.model.set_connected(true);
        Ok(self.model.clone())
    }

    async fn current_model_name(&self) -> Result<String> {
        Ok(self.model.name.clone())
    }
}

/// Every call is recorded as `"<operation> <args>"` in [`FakeModel::calls`].
pub struct FakeModel {
    name: String,
    connected: AtomicBool,
    disconnects: AtomicUsize,
    fail_disconnect: AtomicBool,
    status: Mutex<FleetStatus>,
    configs: Mutex<HashMap<String, HashMap<String, Value>>>,
    action_status: Mutex<String>,
    action_results: Mutex<HashMap<String, Value>>,
    action_output: Mutex<Option<Value>>,
    command_results: Mutex<HashMap<String, String>>,
    idle_script: Mutex<VecDeque<IdleOutcome>>,
    idle_fallback: Mutex<IdleOutcome>,
    idle_polls: AtomicUsize,
    poll_delay: Duration,
    calls: Mutex<Vec<String>>,
}

impl FakeModel {
    fn new(name: &str) -> Self {
        let mut command_results = HashMap::new();
        command_results.insert("return-code".to_string(), "0".to_string());
        Self {
            name: name.to_string(),
            connected: AtomicBool::new(false),
            disconnects: AtomicUsize::new(0),
            fail_disconnect: AtomicBool::new(false),
            status: Mutex::new(FleetStatus::default()),
            configs: Mutex::new(HashMap::new()),
            action_status: Mutex::new("completed".to_string()),
            action_results: Mutex::new(HashMap::new()),
            action_output: Mutex::new(None),
            command_results: Mutex::new(command_results),
            idle_script: Mutex::new(VecDeque::new()),
            idle_fallback: Mutex::new(IdleOutcome::Idle),
            idle_polls: AtomicUsize::new(0),
            poll_delay: Duration::from_secs(1),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn fail_disconnect(&self, fail: bool) {
        self.fail_disconnect.store(fail, Ordering::SeqCst);
    }

    pub fn disconnect_count(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    pub fn set_status(&self, status: FleetStatus) {
        *self.status.lock().unwrap() = status;
    }

    pub fn set_config(&self, application: &str, config: HashMap<String, Value>) {
        self.configs
            .lock()
            .unwrap()
            .insert(application.to_string(), config);
    }

    pub fn config_of(&self, application: &str) -> HashMap<String, Value> {
        self.configs
            .lock()
            .unwrap()
            .get(application)
            .cloned()
            .unwrap_or_default()
    }

    pub fn set_action_status(&self, status: &str) {
        *self.action_status.lock().unwrap() = status.to_string();
    }

    pub fn set_action_results(&self, results: HashMap<String, Value>) {
        *self.action_results.lock().unwrap() = results;
    }

    pub fn set_action_output(&self, output: Option<Value>) {
        *self.action_output.lock().unwrap() = output;
    }

    pub fn set_command_results(&self, results: HashMap<String, String>) {
        *self.command_results.lock().unwrap() = results;
    }

    /// Queue idle poll outcomes; `fallback` is used once the queue is empty.
    pub fn script_idle(&self, outcomes: Vec<IdleOutcome>, fallback: IdleOutcome) {
        *self.idle_script.lock().unwrap() = outcomes.into();
        *self.idle_fallback.lock().unwrap() = fallback;
    }

    pub fn idle_polls(&self) -> usize {
        self.idle_polls.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl Model for FakeModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn disconnect(&self) -> Result<()> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        self.set_connected(false);
        if self.fail_disconnect.load(Ordering::SeqCst) {
            bail!("socket already closed");
        }
        Ok(())
    }

    async fn get_status(&self) -> Result<FleetStatus> {
        Ok(self.status.lock().unwrap().clone())
    }

    async fn application_units(&self, application: &str) -> Result<Option<Vec<String>>> {
        Ok(self.status.lock().unwrap().units_of(application))
    }

    async fn run_action(
        &self,
        unit: &str,
        action: &str,
        params: &HashMap<String, Value>,
    ) -> Result<ActionHandle> {
        let mut keys: Vec<_> = params.keys().cloned().collect();
        keys.sort();
        self.record(format!("run_action {unit} {action} {}", keys.join(",")));
        Ok(ActionHandle {
            id: "1".to_string(),
            name: action.to_string(),
            unit: unit.to_string(),
            status: "pending".to_string(),
            results: HashMap::new(),
        })
    }

    async fn wait_action(&self, action: &ActionHandle) -> Result<ActionHandle> {
        Ok(ActionHandle {
            status: self.action_status.lock().unwrap().clone(),
            results: self.action_results.lock().unwrap().clone(),
            ..action.clone()
        })
    }

    async fn get_action_output(&self, action_id: &str) -> Result<Value> {
        self.action_output
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| ControlPlaneError::NotFound(format!("action {action_id}")).into())
    }

    async fn run_command(
        &self,
        unit: &str,
        command: &str,
        _timeout: Option<Duration>,
    ) -> Result<HashMap<String, String>> {
        self.record(format!("run_command {unit} {command}"));
        Ok(self.command_results.lock().unwrap().clone())
    }

    async fn get_config(&self, application: &str) -> Result<HashMap<String, Value>> {
        Ok(self.config_of(application))
    }

    async fn set_config(&self, application: &str, config: &HashMap<String, String>) -> Result<()> {
        let mut keys: Vec<_> = config.keys().cloned().collect();
        keys.sort();
        self.record(format!("set_config {application} {}", keys.join(",")));

        let mut configs = self.configs.lock().unwrap();
        let current = configs.entry(application.to_string()).or_default();
        for (key, value) in config {
            current.insert(key.clone(), Value::from(value.as_str()));
        }
        Ok(())
    }

    async fn upgrade_application(&self, application: &str, options: &UpgradeOptions) -> Result<()> {
        self.record(format!(
            "upgrade_application {application} channel={} switch={}",
            options.channel.as_deref().unwrap_or("-"),
            options.switch.as_deref().unwrap_or("-"),
        ));
        Ok(())
    }

    async fn scp_from_unit(
        &self,
        unit: &str,
        source: &str,
        destination: &str,
        options: &ScpOptions,
    ) -> Result<()> {
        self.record(format!(
            "scp_from_unit {}@{unit}:{source} {destination}",
            options.user
        ));
        Ok(())
    }

    async fn wait_for_idle(&self, _idle_period: Duration, timeout: Duration) -> Result<()> {
        self.idle_polls.fetch_add(1, Ordering::SeqCst);
        let outcome = self
            .idle_script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.idle_fallback.lock().unwrap().clone());

        match outcome {
            IdleOutcome::Idle => Ok(()),
            IdleOutcome::Busy => {
                tokio::time::sleep(self.poll_delay).await;
                Err(ControlPlaneError::IdleTimeout(self.name.clone(), timeout.as_secs()).into())
            }
            IdleOutcome::Fatal(err) => Err(err.into()),
            IdleOutcome::Drop => {
                self.set_connected(false);
                Err(ControlPlaneError::Disconnected(self.name.clone()).into())
            }
            IdleOutcome::Error(message) => bail!(message),
        }
    }
}
