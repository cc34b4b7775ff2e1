//! Wait for a model to settle after a change.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::time::Instant;
use tracing::debug;

use super::client::Model;
use super::connection::ConnectionManager;
use crate::error::{ControlPlaneError, CupError};

/// Total wait budget when the caller passes zero.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3600);

/// The model must stay idle this long to count as settled.
pub const MODEL_IDLE_PERIOD: Duration = Duration::from_secs(30);

/// Timeout handed to each individual idle poll.
pub const IDLE_POLL_TIMEOUT: Duration = Duration::from_secs(40);

/// Polls a model until every agent has been idle for [`MODEL_IDLE_PERIOD`].
///
/// Dropped connections are re-established transparently. Machine, agent, unit
/// and application errors end the wait immediately; anything else is retried
/// until the deadline.
pub struct Waiter<'a> {
    manager: &'a ConnectionManager,
    model_name: String,
}

impl<'a> Waiter<'a> {
    pub fn new(manager: &'a ConnectionManager, model_name: impl Into<String>) -> Self {
        Self {
            manager,
            model_name: model_name.into(),
        }
    }

    /// Wait for the model to stabilize within `timeout_secs` (0 means the
    /// default of one hour).
    pub async fn wait(&self, timeout_secs: u64) -> Result<()> {
        let start = Instant::now();
        let timeout = if timeout_secs == 0 {
            DEFAULT_TIMEOUT
        } else {
            Duration::from_secs(timeout_secs)
        };
        debug!("Waiting to stabilize in {} seconds", timeout.as_secs());

        loop {
            let model = self.ensure_connected(start, timeout).await?;
            match model
                .wait_for_idle(MODEL_IDLE_PERIOD, IDLE_POLL_TIMEOUT)
                .await
            {
                Ok(()) => {
                    debug!(
                        "Model {} is idle for {} seconds",
                        self.model_name,
                        MODEL_IDLE_PERIOD.as_secs()
                    );
                    return Ok(());
                }
                Err(e) if ControlPlaneError::fatal_in(&e).is_some() => return Err(e),
                Err(e) => debug!("Unknown error while waiting to stabilize: {:#}", e),
            }

            // Retried without a pause; the deadline is the only bound.
            self.check_time(start, timeout)?;
        }
    }

    async fn ensure_connected(&self, start: Instant, timeout: Duration) -> Result<Arc<dyn Model>> {
        loop {
            if let Some(model) = self.manager.connected_model().await {
                return Ok(model);
            }

            // Failed connects retry immediately until the deadline.
            self.manager.reset().await;
            self.check_time(start, timeout)?;
            match self.manager.get_model(Some(&self.model_name)).await {
                Ok(model) if model.is_connected() => return Ok(model),
                Ok(_) => debug!("Model {} still disconnected, retrying", self.model_name),
                Err(e) => debug!(
                    "Model has unexpected exception while connecting, retrying: {:#}",
                    e
                ),
            }
        }
    }

    fn check_time(&self, start: Instant, timeout: Duration) -> Result<()> {
        if start.elapsed() > timeout {
            debug!(
                "Model {} is not idle after {} seconds",
                self.model_name,
                timeout.as_secs()
            );
            return Err(CupError::Timeout {
                model: self.model_name.clone(),
                timeout_secs: timeout.as_secs(),
            }
            .into());
        }
        Ok(())
    }
}
