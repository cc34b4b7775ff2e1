//! Plan tree nodes.

use std::collections::BTreeMap;
use std::fmt;

use crate::juju::UpgradeOptions;

/// What a single step does when executed.
#[derive(Debug, Clone, PartialEq)]
pub enum StepAction {
    /// Dump the cloud databases and copy the dump locally.
    Backup,
    /// Upgrade the OS packages of the given units.
    UpgradePackages { units: Vec<String> },
    /// Refresh an application's charm.
    UpgradeCharm {
        application: String,
        options: UpgradeOptions,
    },
    /// Change application configuration.
    SetConfig {
        application: String,
        config: BTreeMap<String, String>,
    },
    /// Verify that an application's origin now points at the target.
    CheckWorkload {
        application: String,
        origin_setting: String,
        expected_origin: String,
    },
}

impl StepAction {
    /// True if the action makes the model reconfigure itself, so the fleet
    /// must be given time to settle afterwards.
    pub fn changes_model(&self) -> bool {
        matches!(self, Self::UpgradeCharm { .. } | Self::SetConfig { .. })
    }
}

/// A node of the upgrade plan.
///
/// Children run in order unless `parallel` is set.
#[derive(Debug, Clone, PartialEq)]
pub struct UpgradeStep {
    pub description: String,
    pub parallel: bool,
    pub action: Option<StepAction>,
    children: Vec<UpgradeStep>,
}

impl UpgradeStep {
    pub fn new(description: impl Into<String>, parallel: bool, action: Option<StepAction>) -> Self {
        Self {
            description: description.into(),
            parallel,
            action,
            children: Vec::new(),
        }
    }

    /// A sequential node without an action of its own.
    pub fn group(description: impl Into<String>) -> Self {
        Self::new(description, false, None)
    }

    /// A sequential leaf.
    pub fn leaf(description: impl Into<String>, action: StepAction) -> Self {
        Self::new(description, false, Some(action))
    }

    pub fn add_step(&mut self, step: UpgradeStep) {
        self.children.push(step);
    }

    pub fn children(&self) -> &[UpgradeStep] {
        &self.children
    }

    /// True when executing the step would do nothing.
    pub fn is_empty(&self) -> bool {
        self.action.is_none() && self.children.is_empty()
    }

    fn fmt_indented(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        writeln!(f, "{}{}", "    ".repeat(depth), self.description)?;
        for child in &self.children {
            child.fmt_indented(f, depth + 1)?;
        }
        Ok(())
    }
}

impl fmt::Display for UpgradeStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_indented(f, 0)
    }
}
