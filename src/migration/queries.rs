use super::STATUS_MAP_NAME;
use crate::cluster::{Cluster, Row};
use crate::context::Context;
use crate::error::{AppError, Result};
use crate::models::{DataStructureMigrationStatus, OverallMigrationStatus, Status};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Read-only view of one migration's status record on the cluster.
#[derive(Clone)]
pub struct StatusReader {
    cluster: Arc<dyn Cluster>,
    migration_id: String,
}

impl StatusReader {
    pub fn new(cluster: Arc<dyn Cluster>, migration_id: impl Into<String>) -> Self {
        Self {
            cluster,
            migration_id: migration_id.into(),
        }
    }

    pub fn migration_id(&self) -> &str {
        &self.migration_id
    }

    pub fn cluster(&self) -> &Arc<dyn Cluster> {
        &self.cluster
    }

    fn select(&self, columns: &str) -> String {
        format!(
            "SELECT {} FROM {} WHERE __key='{}'",
            columns, STATUS_MAP_NAME, self.migration_id
        )
    }

    async fn query_single_row(&self, ctx: &Context, statement: &str) -> Result<Option<Row>> {
        let rows = ctx.run(self.cluster.query(statement)).await??;
        // One key, so at most one row.
        Ok(rows.into_iter().next())
    }

    /// Fails with [`AppError::StatusNotFound`] until the cluster has created
    /// the record.
    pub async fn fetch_status(&self, ctx: &Context) -> Result<Status> {
        let statement = self.select("JSON_QUERY(this, '$.status')");
        let row = match self.query_single_row(ctx, &statement).await {
            Ok(row) => row,
            Err(AppError::Context(err)) => return Err(err.into()),
            Err(err) => {
                tracing::debug!(error = %err, "status query failed");
                return Err(AppError::StatusNotFound);
            }
        };
        match first_column(row) {
            Some(value) => Ok(serde_json::from_value(value)?),
            None => Err(AppError::StatusNotFound),
        }
    }

    /// Remaining time and completion percentage (0-100) of the whole migration.
    pub async fn fetch_overall_progress(&self, ctx: &Context) -> Result<(Duration, f32)> {
        let statement = self.select(
            "JSON_QUERY(this, '$.remainingTime'), JSON_QUERY(this, '$.completionPercentage')",
        );
        let row = self
            .query_single_row(ctx, &statement)
            .await?
            .ok_or_else(|| AppError::Remote("overall progress not found".to_string()))?;
        let mut columns = row.into_iter();
        let remaining = columns.next().unwrap_or(Value::Null);
        let completion = columns.next().unwrap_or(Value::Null);

        let completion = completion.as_f64().ok_or_else(|| {
            AppError::Remote(format!(
                "completionPercentage is not available in {}",
                STATUS_MAP_NAME
            ))
        })?;
        let remaining = remaining.as_i64().ok_or_else(|| {
            AppError::Remote(format!(
                "remainingTime is not available in {}",
                STATUS_MAP_NAME
            ))
        })?;
        let remaining = Duration::from_millis(remaining.max(0) as u64);
        Ok((remaining, completion as f32))
    }

    /// The cluster's error list flattened into one bulleted message.
    pub async fn fetch_errors(&self, ctx: &Context) -> Result<String> {
        let errors = self
            .fetch_string_list(ctx, "$.errors")
            .await?
            .ok_or_else(|| AppError::Remote("could not fetch migration errors".to_string()))?;
        Ok(join_errors(&errors))
    }

    pub async fn fetch_warnings(&self, ctx: &Context) -> Result<Vec<String>> {
        Ok(self
            .fetch_string_list(ctx, "$.warnings")
            .await?
            .unwrap_or_default())
    }

    /// Empty when the cluster has not produced a report.
    pub async fn fetch_report(&self, ctx: &Context) -> Result<String> {
        let statement = self.select("JSON_QUERY(this, '$.report')");
        let row = self
            .query_single_row(ctx, &statement)
            .await
            .map_err(|err| err.context("migration report cannot be found"))?
            .ok_or_else(|| AppError::Remote("migration report not found".to_string()))?;
        match first_column(Some(row)) {
            Some(Value::String(report)) => Ok(report),
            Some(other) => Err(AppError::Remote(format!(
                "migration report has unexpected format: {}",
                other
            ))),
            None => Ok(String::new()),
        }
    }

    /// Status of the item at `index` in the record's `migrations` array, if
    /// the cluster has written it yet.
    pub async fn fetch_item_status(
        &self,
        ctx: &Context,
        index: usize,
    ) -> Result<Option<DataStructureMigrationStatus>> {
        let statement = self.select(&format!("JSON_QUERY(this, '$.migrations[{}]')", index));
        let row = self.query_single_row(ctx, &statement).await?;
        match first_column(row) {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    pub async fn fetch_record(&self, ctx: &Context) -> Result<Option<OverallMigrationStatus>> {
        let statement = self.select("this");
        let row = self.query_single_row(ctx, &statement).await?;
        match first_column(row) {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    async fn fetch_string_list(&self, ctx: &Context, path: &str) -> Result<Option<Vec<String>>> {
        let statement = self.select(&format!("JSON_QUERY(this, '{}')", path));
        let Some(row) = self.query_single_row(ctx, &statement).await? else {
            return Ok(None);
        };
        match first_column(Some(row)) {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(Some(Vec::new())),
        }
    }
}

fn first_column(row: Option<Row>) -> Option<Value> {
    row?.into_iter().next().filter(|value| !value.is_null())
}

pub fn join_errors(errors: &[String]) -> String {
    format!("* {}", errors.join("\n* "))
}
