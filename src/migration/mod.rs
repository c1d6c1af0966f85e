//! Observing a data migration that runs on the cluster.
//!
//! The cluster keeps one status record per migration in [`STATUS_MAP_NAME`],
//! keyed by migration id. Everything here only reads that record; the one
//! write is the start request offered onto [`START_QUEUE_NAME`].

mod finalize;
mod gate;
mod poller;
mod queries;
mod stages;

pub use finalize::{FinalizeSummary, finalize, report_path, warning_lines};
pub use gate::wait_until_in_progress;
pub use poller::{ItemStep, MigrationItemPoller, OverallStep, context_failure, item_step, overall_step};
pub use queries::{StatusReader, join_errors};
pub use stages::{ConfigBundle, read_config_bundle, start_stages, status_stages};

use crate::context::Context;
use crate::error::{AppError, Result};
use crate::models::DataStructureInfo;
use crate::stage::{BuildFuture, LazyProvider, Renderer, execute};
use std::path::Path;
use std::time::Duration;
use uuid::Uuid;

pub const STATUS_MAP_NAME: &str = "__datamigration_migrations";
pub const START_QUEUE_NAME: &str = "__datamigration_start_queue";
pub const DEBUG_LOGS_LIST_PREFIX: &str = "__datamigration_debug_logs_";

const POLL_INTERVAL: Duration = Duration::from_secs(1);
const START_TIMEOUT: Duration = Duration::from_secs(30);
const FINALIZE_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct MigrationSettings {
    pub poll_interval: Duration,
    /// How long the cluster gets to make a new migration visible.
    pub start_timeout: Duration,
    pub finalize_timeout: Duration,
}

impl Default for MigrationSettings {
    fn default() -> Self {
        Self {
            poll_interval: POLL_INTERVAL,
            start_timeout: START_TIMEOUT,
            finalize_timeout: FINALIZE_TIMEOUT,
        }
    }
}

pub fn make_migration_id() -> String {
    Uuid::new_v4().to_string()
}

/// Items listed in the record, in the order the cluster reported them.
pub async fn data_structures_to_migrate(
    ctx: &Context,
    reader: &StatusReader,
) -> Result<Vec<DataStructureInfo>> {
    let record = reader
        .fetch_record(ctx)
        .await?
        .ok_or(AppError::NoDataStructures)?;
    if record.migrations.is_empty() {
        return Err(AppError::NoDataStructures);
    }
    Ok(record.migrations.iter().map(DataStructureInfo::from).collect())
}

/// One polling stage per migrated item. The list is only known once the
/// migration is visible, so it is built on the first pull.
pub fn migration_stage_provider(
    reader: StatusReader,
    settings: MigrationSettings,
) -> LazyProvider<()> {
    LazyProvider::new(move |ctx: Context| -> BuildFuture<()> {
        Box::pin(async move {
            wait_until_in_progress(&ctx, &reader, settings.start_timeout).await?;
            let items = data_structures_to_migrate(&ctx, &reader).await?;
            tracing::info!(
                migration_id = %reader.migration_id(),
                items = items.len(),
                "migration in progress"
            );
            let stages: Vec<_> = items
                .into_iter()
                .enumerate()
                .map(|(index, info)| {
                    MigrationItemPoller::new(reader.clone(), index, info, &settings).into_stage()
                })
                .collect();
            Ok::<_, AppError>(stages)
        })
    })
}

#[derive(Debug)]
pub struct MigrationOutcome {
    pub migration_id: String,
    pub result: Result<()>,
    pub finalize: Result<FinalizeSummary>,
}

impl MigrationOutcome {
    /// The pipeline's error decides the result; a finalize error is kept
    /// alongside it rather than replacing it. A finalize step that was only
    /// cut short by the same cancellation adds nothing and is dropped.
    pub fn into_result(self) -> Result<FinalizeSummary> {
        match (self.result, self.finalize) {
            (Ok(()), Ok(summary)) => Ok(summary),
            (Ok(()), Err(finalize)) => Err(finalize),
            (Err(pipeline), Ok(_)) => Err(pipeline),
            (Err(pipeline), Err(finalize))
                if pipeline.is_user_cancelled() && finalize.is_user_cancelled() =>
            {
                Err(pipeline)
            }
            (Err(pipeline), Err(finalize)) => Err(AppError::WithFinalize {
                pipeline: Box::new(pipeline),
                finalize: Box::new(finalize),
            }),
        }
    }
}

/// Polls every item to a terminal state, then finalizes.
pub async fn run_migration(
    ctx: &Context,
    reader: StatusReader,
    output_dir: &Path,
    settings: &MigrationSettings,
    renderer: &dyn Renderer,
) -> MigrationOutcome {
    let mut provider = migration_stage_provider(reader.clone(), settings.clone());
    let result = execute(ctx, (), &mut provider, renderer).await;

    // Survives the caller's deadline but not its cancellation.
    let finalize_ctx = ctx
        .without_deadline()
        .with_timeout(settings.finalize_timeout);
    let finalize = finalize(&finalize_ctx, &reader, output_dir)
        .await
        .map_err(|err| AppError::Finalize(Box::new(err)));
    if let Err(err) = &finalize {
        tracing::error!(migration_id = %reader.migration_id(), error = %err, "finalize failed");
    }

    MigrationOutcome {
        migration_id: reader.migration_id().to_string(),
        result,
        finalize,
    }
}
