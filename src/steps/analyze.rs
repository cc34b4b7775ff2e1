//! Snapshot of the cloud used to build a plan.

use anyhow::Result;
use tracing::{debug, info};

use crate::apps::{Application, UpgradeCandidate};
use crate::juju::{ConnectionManager, actions};
use crate::release::Release;

/// Applications under management and the release the cloud as a whole runs.
pub struct Analysis {
    pub apps: Vec<Box<dyn UpgradeCandidate>>,
    /// Oldest release among the applications, if any were found.
    pub current_release: Option<Release>,
}

impl Analysis {
    pub fn new(apps: Vec<Box<dyn UpgradeCandidate>>, current_release: Option<Release>) -> Self {
        Self {
            apps,
            current_release,
        }
    }

    /// Inspect the model and collect every application with a known release.
    pub async fn create(manager: &ConnectionManager) -> Result<Self> {
        info!("Analyzing the cloud");
        let status = actions::get_status(manager).await?;

        let mut apps = Vec::new();
        for (name, app_status) in &status.applications {
            let config = actions::get_application_config(manager, name).await?;
            let units = status.units_of(name).unwrap_or_default();
            match Application::from_status(name, app_status, &config, units) {
                Some(app) => apps.push(app),
                None => debug!("Skipping '{}' from analysis", name),
            }
        }

        let current_release = apps.iter().map(|app| app.current_release).min();
        info!(
            "Found {} applications, current release: {}",
            apps.len(),
            current_release.map_or("unknown".to_string(), |r| r.to_string())
        );

        let apps = apps
            .into_iter()
            .map(|app| Box::new(app) as Box<dyn UpgradeCandidate>)
            .collect();
        Ok(Self::new(apps, current_release))
    }

    /// Release the next plan should upgrade to.
    pub fn target(&self) -> Option<Release> {
        self.current_release.and_then(|release| release.next_release())
    }
}
