use super::START_QUEUE_NAME;
use crate::cluster::Cluster;
use crate::context::Context;
use crate::error::{AppError, Result};
use crate::repository::MigrationRunRepository;
use crate::stage::{Stage, StageError, StatusHandle};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Start request: the migration id plus every file of the configuration
/// directory, keyed by file name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigBundle {
    pub migration_id: String,
    pub config_path: String,
    pub config: BTreeMap<String, String>,
}

pub fn read_config_bundle(migration_id: &str, dir: &Path) -> Result<ConfigBundle> {
    if !dir.is_dir() {
        return Err(AppError::InvalidInput(format!(
            "migration configuration directory not found: {}",
            dir.display()
        )));
    }

    let mut config = BTreeMap::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        let contents = fs::read_to_string(entry.path()).map_err(|e| {
            AppError::InvalidInput(format!(
                "Failed to read configuration file {}: {}",
                entry.path().display(),
                e
            ))
        })?;
        config.insert(name, contents);
    }

    if config.is_empty() {
        return Err(AppError::InvalidInput(format!(
            "migration configuration directory is empty: {}",
            dir.display()
        )));
    }

    Ok(ConfigBundle {
        migration_id: migration_id.to_string(),
        config_path: dir.to_string_lossy().to_string(),
        config,
    })
}

fn connect_stage<T: Send + 'static>(cluster: Arc<dyn Cluster>) -> Stage<T> {
    Stage::new(
        "Connecting to the migration cluster",
        "Connected to the migration cluster",
        "Could not connect to the migration cluster",
        move |ctx: Context, _status: StatusHandle, input: T| {
            let cluster = cluster.clone();
            async move {
                let members = ctx.run(cluster.members()).await??;
                if members.is_empty() {
                    return Err(StageError::Fatal(AppError::Remote(
                        "cluster reported no members".to_string(),
                    )));
                }
                tracing::debug!(members = members.len(), "connected to migration cluster");
                Ok::<_, StageError>(input)
            }
        },
    )
}

/// Stages that hand a new migration to the cluster. The carry-over value is
/// the start request, built by the second stage and sent by the third.
pub fn start_stages(
    cluster: Arc<dyn Cluster>,
    migration_id: String,
    config_dir: PathBuf,
) -> Vec<Stage<Option<ConfigBundle>>> {
    let setup = Stage::new(
        "Setting up the migration",
        "Set up the migration",
        "Could not set up the migration",
        move |_ctx: Context, _status: StatusHandle, _input: Option<ConfigBundle>| {
            let bundle = read_config_bundle(&migration_id, &config_dir);
            async move { Ok::<_, StageError>(Some(bundle?)) }
        },
    );

    let start_cluster = cluster.clone();
    let start = Stage::new(
        "Starting the migration",
        "Started the migration",
        "Could not start the migration",
        move |ctx: Context, _status: StatusHandle, input: Option<ConfigBundle>| {
            let cluster = start_cluster.clone();
            async move {
                let bundle = input.ok_or_else(|| {
                    AppError::InvalidInput("migration configuration was not prepared".to_string())
                })?;
                let item = serde_json::to_value(&bundle).map_err(AppError::from)?;
                ctx.run(cluster.offer(START_QUEUE_NAME, item)).await??;
                tracing::info!(migration_id = %bundle.migration_id, "migration start requested");
                Ok::<_, StageError>(Some(bundle))
            }
        },
    );

    vec![connect_stage(cluster), setup, start]
}

/// Stages that locate the migration to watch. The carry-over value is the
/// migration id: given up front, or the latest unfinished local run.
pub fn status_stages(
    cluster: Arc<dyn Cluster>,
    runs: MigrationRunRepository,
) -> Vec<Stage<Option<String>>> {
    let find = Stage::new(
        "Finding the migration in progress",
        "Found the migration in progress",
        "Could not find a migration in progress",
        move |_ctx: Context, _status: StatusHandle, input: Option<String>| {
            let runs = runs.clone();
            async move {
                if let Some(id) = input {
                    return Ok(Some(id));
                }
                let run = runs
                    .latest_unfinished()
                    .await?
                    .ok_or(AppError::NoMigrationInProgress)?;
                tracing::info!(migration_id = %run.id, "watching migration");
                Ok::<_, StageError>(Some(run.id))
            }
        },
    );

    vec![connect_stage(cluster), find]
}
