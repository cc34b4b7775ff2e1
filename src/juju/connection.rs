//! Shared, reusable connection to a single model.

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::Mutex;
use tracing::debug;

use super::client::{ControlPlane, MAX_FRAME_SIZE, Model};

/// Environment variables consulted, in order, when no model name is given.
pub const MODEL_ENV_VARS: &[&str] = &["JUJU_MODEL", "MODEL_NAME"];

/// Owns the cached model handle shared by every control plane call of a run.
///
/// The cache is checked and replaced under a lock, but the check itself is a
/// snapshot of `is_connected`; callers should drive one orchestration flow at a
/// time.
pub struct ConnectionManager {
    control_plane: Arc<dyn ControlPlane>,
    model_name: Option<String>,
    model: Mutex<Option<Arc<dyn Model>>>,
}

impl ConnectionManager {
    /// Create a manager; `model_name` is used whenever a call names no model.
    pub fn new(control_plane: Arc<dyn ControlPlane>, model_name: Option<String>) -> Self {
        Self {
            control_plane,
            model_name,
            model: Mutex::new(None),
        }
    }

    /// Return the cached model handle, reconnecting if it went stale.
    ///
    /// An empty name (after falling back to the configured one) connects to
    /// the model in scope.
    pub async fn get_model(&self, model_name: Option<&str>) -> Result<Arc<dyn Model>> {
        let mut cached = self.model.lock().await;

        if let Some(model) = cached.as_ref()
            && !model.is_connected()
        {
            debug!("Model {} is disconnected, dropping cached connection", model.name());
            disconnect(model.as_ref()).await;
            *cached = None;
        }

        if let Some(model) = cached.as_ref() {
            return Ok(Arc::clone(model));
        }

        let name = model_name
            .or(self.model_name.as_deref())
            .filter(|n| !n.is_empty());
        debug!("Connecting to model {}", name.unwrap_or("<current>"));
        let model = self.control_plane.connect(name, MAX_FRAME_SIZE).await?;
        *cached = Some(Arc::clone(&model));
        Ok(model)
    }

    /// The cached handle, only if it is still connected. Never connects.
    pub async fn connected_model(&self) -> Option<Arc<dyn Model>> {
        self.model
            .lock()
            .await
            .as_ref()
            .filter(|m| m.is_connected())
            .map(Arc::clone)
    }

    /// Disconnect and forget the cached handle, if any.
    pub async fn reset(&self) {
        let model = self.model.lock().await.take();
        if let Some(model) = model {
            disconnect(model.as_ref()).await;
        }
    }
}

/// Best-effort disconnect; errors are ignored.
pub async fn disconnect(model: &dyn Model) {
    if let Err(e) = model.disconnect().await {
        debug!("Ignoring error while disconnecting from {}: {}", model.name(), e);
    }
}

/// Resolve the model to operate on: explicit name, then environment, then the
/// controller's current model.
pub async fn resolve_model_name(
    control_plane: &dyn ControlPlane,
    explicit: Option<&str>,
) -> Result<String> {
    if let Some(name) = select_model_name(explicit, |key| std::env::var(key).ok()) {
        return Ok(name);
    }
    debug!("No model name configured, asking the controller for the current model");
    control_plane.current_model_name().await
}

/// Pick a model name from an explicit value or the environment.
pub fn select_model_name(
    explicit: Option<&str>,
    env: impl Fn(&str) -> Option<String>,
) -> Option<String> {
    explicit
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .or_else(|| {
            MODEL_ENV_VARS
                .iter()
                .find_map(|key| env(key).filter(|v| !v.is_empty()))
        })
}
