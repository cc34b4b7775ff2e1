//! Upgrade steps for subordinate charms.
//!
//! Subordinates have no machines or origin of their own: their release is the
//! charm channel track, and upgrading them only moves the charm.

use super::Application;
use crate::release::Release;
use crate::steps::UpgradeStep;

pub(super) fn upgrade_steps(app: &Application, target: Release) -> Vec<Option<UpgradeStep>> {
    vec![app.refresh_charm_step(target), app.upgrade_charm_step(target)]
}
