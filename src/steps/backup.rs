//! Database backup taken before any upgrade step runs.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;

use crate::error::CupError;
use crate::juju::{ConnectionManager, FleetStatus, ScpOptions, actions};

/// Charm whose units can dump the cloud databases.
pub const DATABASE_CHARM: &str = "mysql-innodb-cluster";

const DUMP_ACTION: &str = "mysqldump";
const DUMP_FILE_KEY: &str = "mysqldump-file";

/// Dump every database on the first database unit and copy the dump into
/// `destination`. Returns the local path of the dump.
pub async fn backup(manager: &ConnectionManager, destination: &Path) -> Result<PathBuf> {
    info!("Backing up mysql databases");
    let status = actions::get_status(manager).await?;
    let unit = database_unit(manager, &status).await?.ok_or_else(|| {
        CupError::UnitNotFound(format!("No unit of {DATABASE_CHARM} found in model"))
    })?;

    info!("Running {} action on {}", DUMP_ACTION, unit);
    let action = actions::run_action(manager, &unit, DUMP_ACTION, &HashMap::new(), true).await?;
    let remote_file = action.result_str(DUMP_FILE_KEY).ok_or_else(|| {
        CupError::Application(format!("{DUMP_ACTION} on {unit} did not report {DUMP_FILE_KEY}"))
    })?;

    let remote_path = Path::new(remote_file);
    let file_name = remote_path
        .file_name()
        .context("Dump file path has no file name")?;
    if let Some(basedir) = remote_path.parent() {
        info!("Set permissions to read mysql dump on {}", basedir.display());
        let command = format!("chmod o+rx {}", basedir.display());
        let result = actions::run_on_unit(manager, &unit, &command, None).await?;
        if !result.code.is_empty() && !result.succeeded() {
            return Err(CupError::Command {
                command,
                details: result.stderr,
            }
            .into());
        }
    }

    let local = destination.join(file_name);
    info!("Copying mysql dump to {}", local.display());
    actions::scp_from_unit(
        manager,
        &unit,
        remote_file,
        &local.to_string_lossy(),
        &ScpOptions::default(),
    )
    .await?;

    Ok(local)
}

/// First unit, in name order, of an application running the database charm.
async fn database_unit(manager: &ConnectionManager, status: &FleetStatus) -> Result<Option<String>> {
    for name in status.applications.keys() {
        if actions::extract_charm_name(manager, name).await? != DATABASE_CHARM {
            continue;
        }
        if let Some(unit) = status.units_of(name).and_then(|units| units.into_iter().next()) {
            return Ok(Some(unit));
        }
    }
    Ok(None)
}
