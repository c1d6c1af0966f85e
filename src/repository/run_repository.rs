use crate::error::{AppError, Result};
use crate::models::{MigrationRun, RunOutcome};
use crate::repository::DbPool;
use chrono::Utc;

#[derive(Clone)]
pub struct MigrationRunRepository {
    pool: DbPool,
}

impl MigrationRunRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, id: &str, config_path: Option<&str>) -> Result<MigrationRun> {
        let run = MigrationRun {
            id: id.to_string(),
            config_path: config_path.map(str::to_string),
            outcome: None,
            started_at: Utc::now().timestamp_millis(),
            finished_at: None,
        };

        sqlx::query(
            r#"
            INSERT INTO migration_runs (id, config_path, started_at, finished_at, outcome)
            VALUES (?, ?, ?, NULL, NULL)
            "#,
        )
        .bind(&run.id)
        .bind(&run.config_path)
        .bind(run.started_at)
        .execute(&self.pool)
        .await?;

        Ok(run)
    }

    pub async fn get(&self, id: &str) -> Result<MigrationRun> {
        let run = sqlx::query_as::<_, MigrationRun>(
            "SELECT id, config_path, outcome, started_at, finished_at FROM migration_runs WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::RunNotFound(id.to_string()))?;

        Ok(run)
    }

    /// Most recently started run that has no recorded outcome yet.
    pub async fn latest_unfinished(&self) -> Result<Option<MigrationRun>> {
        let run = sqlx::query_as::<_, MigrationRun>(
            r#"
            SELECT id, config_path, outcome, started_at, finished_at FROM migration_runs
            WHERE outcome IS NULL
            ORDER BY started_at DESC, rowid DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(run)
    }

    /// Records how a run ended. Runs first seen through `status` are inserted.
    pub async fn finish(&self, id: &str, outcome: RunOutcome) -> Result<()> {
        let now = Utc::now().timestamp_millis();
        sqlx::query(
            r#"
            INSERT INTO migration_runs (id, config_path, started_at, finished_at, outcome)
            VALUES (?, NULL, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET finished_at = excluded.finished_at, outcome = excluded.outcome
            "#,
        )
        .bind(id)
        .bind(now)
        .bind(now)
        .bind(outcome as i32)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
