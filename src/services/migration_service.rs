use crate::cluster::Cluster;
use crate::context::Context;
use crate::error::{AppError, Result};
use crate::migration::{
    self, MigrationOutcome, MigrationSettings, StatusReader, start_stages, status_stages,
};
use crate::models::RunOutcome;
use crate::repository::MigrationRunRepository;
use crate::stage::{FixedProvider, Renderer, execute};
use std::path::Path;
use std::sync::Arc;

#[derive(Clone)]
pub struct MigrationService {
    cluster: Arc<dyn Cluster>,
    runs: MigrationRunRepository,
    settings: MigrationSettings,
}

impl MigrationService {
    pub fn new(cluster: Arc<dyn Cluster>, runs: MigrationRunRepository) -> Self {
        Self::with_settings(cluster, runs, MigrationSettings::default())
    }

    pub fn with_settings(
        cluster: Arc<dyn Cluster>,
        runs: MigrationRunRepository,
        settings: MigrationSettings,
    ) -> Self {
        Self {
            cluster,
            runs,
            settings,
        }
    }

    /// Sends a new migration to the cluster and watches it to the end.
    ///
    /// Errors before the start request was accepted are returned directly;
    /// afterwards the outcome always includes the finalize step.
    pub async fn start(
        &self,
        ctx: &Context,
        config_dir: &Path,
        output_dir: &Path,
        renderer: &dyn Renderer,
    ) -> Result<MigrationOutcome> {
        let migration_id = migration::make_migration_id();
        self.runs
            .create(&migration_id, Some(&config_dir.to_string_lossy()))
            .await?;
        tracing::info!(migration_id = %migration_id, config_dir = %config_dir.display(), "starting migration");

        let mut provider = FixedProvider::new(start_stages(
            self.cluster.clone(),
            migration_id.clone(),
            config_dir.to_path_buf(),
        ));
        if let Err(err) = execute(ctx, None, &mut provider, renderer).await {
            self.record(&migration_id, Err(&err)).await;
            return Err(err);
        }

        self.watch(ctx, migration_id, output_dir, renderer).await
    }

    /// Watches a running migration: `migration_id` if given, otherwise the
    /// latest one started from this machine that has not finished.
    pub async fn status(
        &self,
        ctx: &Context,
        migration_id: Option<String>,
        output_dir: &Path,
        renderer: &dyn Renderer,
    ) -> Result<MigrationOutcome> {
        let mut provider = FixedProvider::new(status_stages(self.cluster.clone(), self.runs.clone()));
        let migration_id = execute(ctx, migration_id, &mut provider, renderer)
            .await?
            .ok_or(AppError::NoMigrationInProgress)?;

        self.watch(ctx, migration_id, output_dir, renderer).await
    }

    async fn watch(
        &self,
        ctx: &Context,
        migration_id: String,
        output_dir: &Path,
        renderer: &dyn Renderer,
    ) -> Result<MigrationOutcome> {
        let reader = StatusReader::new(self.cluster.clone(), migration_id.clone());
        let outcome =
            migration::run_migration(ctx, reader, output_dir, &self.settings, renderer).await;
        // Interrupted locally: the cluster may still be migrating.
        if ctx.err().is_none() {
            self.record(&migration_id, outcome.result.as_ref().map(|_| ()))
                .await;
        }
        Ok(outcome)
    }

    async fn record(&self, migration_id: &str, result: std::result::Result<(), &AppError>) {
        let outcome = match result {
            Ok(()) => RunOutcome::Completed,
            Err(err) if err.is_user_cancelled() => RunOutcome::Cancelled,
            Err(_) => RunOutcome::Failed,
        };
        if let Err(err) = self.runs.finish(migration_id, outcome).await {
            tracing::warn!(migration_id, error = %err, "Failed to record migration outcome");
        }
    }
}
