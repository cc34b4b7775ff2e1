//! A deployed charmed application and the steps needed to upgrade it.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::{ApplicationKind, PlanContribution, UpgradeCandidate, subordinate};
use crate::juju::UpgradeOptions;
use crate::juju::status::ApplicationStatus;
use crate::release::Release;
use crate::steps::{StepAction, UpgradeStep};

/// Config options that select the package origin, in lookup order.
const ORIGIN_SETTINGS: &[&str] = &["openstack-origin", "source"];

const ACTION_MANAGED_UPGRADE: &str = "action-managed-upgrade";

#[derive(Debug, Clone, PartialEq)]
pub struct Application {
    pub name: String,
    pub charm: String,
    pub kind: ApplicationKind,
    /// Channel the charm tracks, e.g. `ussuri/stable`.
    pub channel: String,
    pub from_charmstore: bool,
    pub series: String,
    /// `openstack-origin` or `source`; empty for subordinates.
    pub origin_setting: String,
    pub os_origin: String,
    pub action_managed_upgrade: bool,
    pub units: Vec<String>,
    pub current_release: Release,
}

impl Application {
    /// Build an application from its status and config.
    ///
    /// Returns `None` when the running release cannot be determined; such
    /// applications are not managed by the upgrade.
    pub fn from_status(
        name: &str,
        status: &ApplicationStatus,
        config: &HashMap<String, Value>,
        units: Vec<String>,
    ) -> Option<Self> {
        let kind = if status.is_subordinate() {
            ApplicationKind::Subordinate
        } else {
            ApplicationKind::Principal
        };
        let series = status.series().unwrap_or_default();
        let channel = status.charm_channel.clone();

        let (origin_setting, os_origin) = match kind {
            ApplicationKind::Principal => match origin_of(config) {
                Some(origin) => origin,
                None => {
                    debug!("'{}' has no origin config and will be ignored", name);
                    return None;
                }
            },
            ApplicationKind::Subordinate => (String::new(), String::new()),
        };

        let current_release = match kind {
            ApplicationKind::Principal => Release::from_origin(&os_origin, &series),
            ApplicationKind::Subordinate => Release::from_channel(&channel),
        };
        let Some(current_release) = current_release else {
            debug!(
                "'{}' is not running a known release and will be ignored",
                name
            );
            return None;
        };

        Some(Self {
            name: name.to_string(),
            charm: status.charm_name().to_string(),
            kind,
            channel,
            from_charmstore: status.charm_origin == "charmstore" || status.charm.starts_with("cs:"),
            series,
            origin_setting,
            os_origin,
            action_managed_upgrade: config
                .get(ACTION_MANAGED_UPGRADE)
                .and_then(Value::as_bool)
                .unwrap_or(false),
            units,
            current_release,
        })
    }

    /// Channel matching the release currently running, e.g. `ussuri/stable`.
    pub fn expected_current_channel(&self) -> String {
        format!("{}/stable", self.current_release)
    }

    pub fn target_channel(&self, target: Release) -> String {
        format!("{target}/stable")
    }

    pub fn new_origin(&self, target: Release) -> String {
        format!("cloud:{}-{}", self.series, target)
    }

    /// Refresh the charm on its current channel, migrating away from the
    /// charm store when needed. `None` if the channel is already at or past
    /// the target.
    pub(crate) fn refresh_charm_step(&self, target: Release) -> Option<UpgradeStep> {
        let expected = self.expected_current_channel();
        let track_release = Release::from_channel(&self.channel).unwrap_or_else(|| {
            debug!("The current channel does not exist or is unexpectedly formatted");
            self.current_release
        });

        let mut switch = None;
        let description = if self.from_charmstore {
            switch = Some(format!("ch:{}", self.charm));
            format!("Migration of '{}' from charmstore to charmhub", self.name)
        } else if self.channel == expected {
            format!(
                "Refresh '{}' to the latest revision of '{}'",
                self.name, expected
            )
        } else if track_release >= target {
            info!(
                "Skipping charm refresh for {}, its channel is already set to {}",
                self.name, self.channel
            );
            return None;
        } else {
            format!(
                "Changing '{}' channel from: '{}' to: '{}'",
                self.name, self.channel, expected
            )
        };

        Some(UpgradeStep::leaf(
            description,
            StepAction::UpgradeCharm {
                application: self.name.clone(),
                options: UpgradeOptions {
                    channel: Some(expected),
                    switch,
                    ..Default::default()
                },
            },
        ))
    }

    /// Move the charm to the target channel, if it is not there already.
    pub(crate) fn upgrade_charm_step(&self, target: Release) -> Option<UpgradeStep> {
        let channel = self.target_channel(target);
        if self.channel == channel {
            return None;
        }
        Some(UpgradeStep::leaf(
            format!("Upgrade '{}' to the new channel: '{}'", self.name, channel),
            StepAction::UpgradeCharm {
                application: self.name.clone(),
                options: UpgradeOptions {
                    channel: Some(channel),
                    ..Default::default()
                },
            },
        ))
    }

    fn upgrade_packages_step(&self) -> UpgradeStep {
        UpgradeStep::leaf(
            format!(
                "Upgrade software packages of '{}' to the latest '{}' release",
                self.name, self.current_release
            ),
            StepAction::UpgradePackages {
                units: self.units.clone(),
            },
        )
    }

    fn disable_action_managed_step(&self) -> Option<UpgradeStep> {
        if !self.action_managed_upgrade {
            return None;
        }
        Some(UpgradeStep::leaf(
            format!(
                "Change charm config of '{}' '{}' to False.",
                self.name, ACTION_MANAGED_UPGRADE
            ),
            StepAction::SetConfig {
                application: self.name.clone(),
                config: BTreeMap::from([(ACTION_MANAGED_UPGRADE.to_string(), "false".to_string())]),
            },
        ))
    }

    fn workload_upgrade_step(&self, target: Release) -> Option<UpgradeStep> {
        let new_origin = self.new_origin(target);
        if self.os_origin == new_origin {
            warn!(
                "Not triggering the workload upgrade of app {}: {} already set to {}",
                self.name, self.origin_setting, new_origin
            );
            return None;
        }
        Some(UpgradeStep::leaf(
            format!(
                "Change charm config of '{}' '{}' to '{}'",
                self.name, self.origin_setting, new_origin
            ),
            StepAction::SetConfig {
                application: self.name.clone(),
                config: BTreeMap::from([(self.origin_setting.clone(), new_origin)]),
            },
        ))
    }

    fn check_workload_step(&self, target: Release) -> UpgradeStep {
        UpgradeStep::leaf(
            format!("Check if the workload of '{}' has been upgraded", self.name),
            StepAction::CheckWorkload {
                application: self.name.clone(),
                origin_setting: self.origin_setting.clone(),
                expected_origin: self.new_origin(target),
            },
        )
    }

    fn principal_steps(&self, target: Release) -> Vec<Option<UpgradeStep>> {
        vec![
            Some(self.upgrade_packages_step()),
            self.refresh_charm_step(target),
            self.disable_action_managed_step(),
            self.upgrade_charm_step(target),
            self.workload_upgrade_step(target),
            Some(self.check_workload_step(target)),
        ]
    }
}

/// The origin option set on an application and its value.
fn origin_of(config: &HashMap<String, Value>) -> Option<(String, String)> {
    ORIGIN_SETTINGS.iter().find_map(|setting| {
        let value = config.get(*setting).filter(|v| !v.is_null())?;
        Some((
            setting.to_string(),
            value.as_str().unwrap_or_default().to_string(),
        ))
    })
}

#[async_trait]
impl UpgradeCandidate for Application {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ApplicationKind {
        self.kind
    }

    async fn generate_upgrade_plan(&self, target: &str) -> PlanContribution {
        let target = match target.parse::<Release>() {
            Ok(target) => target,
            Err(e) => return PlanContribution::Failed(e.into()),
        };

        if self.current_release >= target {
            info!(
                "Application: '{}' already running {} which is equal or greater than {}. Ignoring.",
                self.name, self.current_release, target
            );
            return PlanContribution::Skipped(format!(
                "Application '{}' already running {} which is equal or greater than {}",
                self.name, self.current_release, target
            ));
        }

        let steps = match self.kind {
            ApplicationKind::Principal => self.principal_steps(target),
            ApplicationKind::Subordinate => subordinate::upgrade_steps(self, target),
        };

        let mut plan = UpgradeStep::group(format!("Upgrade plan for '{}' to {}", self.name, target));
        for step in steps.into_iter().flatten() {
            plan.add_step(step);
        }

        if plan.is_empty() {
            PlanContribution::Nothing
        } else {
            PlanContribution::Steps(plan)
        }
    }
}
