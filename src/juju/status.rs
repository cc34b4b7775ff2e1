//! Model status as reported by `juju status --format=json`.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::error::ControlPlaneError;

/// Full status of a model.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FleetStatus {
    #[serde(default)]
    pub machines: BTreeMap<String, MachineStatus>,
    #[serde(default)]
    pub applications: BTreeMap<String, ApplicationStatus>,
}

/// A `{current, message}` status pair.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatusInfo {
    #[serde(default)]
    pub current: String,
    #[serde(default)]
    pub message: String,
}

impl StatusInfo {
    fn is(&self, state: &str) -> bool {
        self.current == state
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct MachineStatus {
    #[serde(default)]
    pub juju_status: StatusInfo,
    #[serde(default)]
    pub machine_status: StatusInfo,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Base {
    #[serde(default)]
    pub channel: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ApplicationStatus {
    #[serde(default)]
    pub charm: String,
    #[serde(default)]
    pub charm_name: String,
    #[serde(default)]
    pub charm_origin: String,
    #[serde(default)]
    pub charm_channel: String,
    #[serde(default)]
    pub series: Option<String>,
    #[serde(default)]
    pub base: Option<Base>,
    #[serde(default)]
    pub subordinate_to: Vec<String>,
    #[serde(default)]
    pub application_status: StatusInfo,
    #[serde(default)]
    pub units: BTreeMap<String, UnitStatus>,
}

impl ApplicationStatus {
    pub fn is_subordinate(&self) -> bool {
        !self.subordinate_to.is_empty()
    }

    /// Charm name, falling back to the charm URL for older controllers.
    pub fn charm_name(&self) -> &str {
        if self.charm_name.is_empty() {
            &self.charm
        } else {
            &self.charm_name
        }
    }

    /// Ubuntu series, derived from the base channel on newer controllers.
    pub fn series(&self) -> Option<String> {
        if let Some(series) = self.series.as_ref().filter(|s| !s.is_empty()) {
            return Some(series.clone());
        }
        let base = self.base.as_ref()?;
        let series = match base.channel.split('/').next().unwrap_or_default() {
            "20.04" => "focal",
            "22.04" => "jammy",
            "24.04" => "noble",
            _ => return None,
        };
        Some(series.to_string())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct UnitStatus {
    #[serde(default)]
    pub workload_status: StatusInfo,
    #[serde(default)]
    pub juju_status: StatusInfo,
    #[serde(default)]
    pub subordinates: BTreeMap<String, UnitStatus>,
}

impl FleetStatus {
    /// Every unit in the model, subordinate units included.
    pub fn all_units(&self) -> Vec<(&str, &UnitStatus)> {
        let mut units = Vec::new();
        for app in self.applications.values() {
            for (name, unit) in &app.units {
                units.push((name.as_str(), unit));
                for (sub_name, sub) in &unit.subordinates {
                    units.push((sub_name.as_str(), sub));
                }
            }
        }
        units
    }

    /// Unit names of an application, or `None` if it is not deployed.
    ///
    /// Subordinate units are only reported under their principal unit.
    pub fn units_of(&self, application: &str) -> Option<Vec<String>> {
        let app = self.applications.get(application)?;
        if !app.is_subordinate() {
            return Some(app.units.keys().cloned().collect());
        }
        let prefix = format!("{application}/");
        Some(
            self.all_units()
                .into_iter()
                .filter(|(name, _)| name.starts_with(&prefix))
                .map(|(name, _)| name.to_string())
                .collect(),
        )
    }

    /// First error state found in the model, if any.
    pub fn fatal_error(&self) -> Option<ControlPlaneError> {
        for (id, machine) in &self.machines {
            if machine.juju_status.is("error") || machine.machine_status.is("error") {
                let message = if machine.machine_status.message.is_empty() {
                    machine.juju_status.message.clone()
                } else {
                    machine.machine_status.message.clone()
                };
                return Some(ControlPlaneError::Machine(id.clone(), message));
            }
        }

        for (name, app) in &self.applications {
            if app.application_status.is("error") {
                return Some(ControlPlaneError::Application(
                    name.clone(),
                    app.application_status.message.clone(),
                ));
            }
        }

        for (name, unit) in self.all_units() {
            if unit.juju_status.is("error") {
                return Some(ControlPlaneError::Agent(
                    name.to_string(),
                    unit.juju_status.message.clone(),
                ));
            }
            if unit.workload_status.is("error") {
                return Some(ControlPlaneError::Unit(
                    name.to_string(),
                    unit.workload_status.message.clone(),
                ));
            }
        }

        None
    }

    /// True when every unit agent reports idle.
    pub fn is_idle(&self) -> bool {
        self.all_units()
            .iter()
            .all(|(_, unit)| unit.juju_status.is("idle"))
    }
}
