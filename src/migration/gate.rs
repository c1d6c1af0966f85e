use super::queries::StatusReader;
use crate::context::{Context, ContextError};
use crate::error::{AppError, Result};
use crate::models::Status;
use std::time::Duration;

const WAITING: &str = "waiting for migration to be created";

/// Blocks until the cluster reports the migration as in progress.
///
/// The record appears some time after the start request, so "not found" is
/// retried without delay until `timeout` (bounded by `ctx`) runs out. Only
/// FAILED ends the wait early; every other status keeps it going.
pub async fn wait_until_in_progress(
    ctx: &Context,
    reader: &StatusReader,
    timeout: Duration,
) -> Result<()> {
    let ctx = ctx.with_timeout(timeout);
    loop {
        if let Some(err) = ctx.err() {
            return Err(gate_failure(err));
        }
        match reader.fetch_status(&ctx).await {
            Ok(Status::InProgress) => return Ok(()),
            Ok(Status::Failed) => {
                let errors = reader.fetch_errors(&ctx).await.map_err(|err| {
                    err.context("migration failed and its errors cannot be fetched")
                })?;
                return Err(AppError::Migration(errors));
            }
            Ok(status) => {
                tracing::debug!(migration_id = %reader.migration_id(), %status, "migration not in progress yet");
            }
            Err(AppError::StatusNotFound) => {}
            Err(AppError::Context(err)) => return Err(gate_failure(err)),
            Err(err) => return Err(err.context(WAITING)),
        }
        tokio::task::yield_now().await;
    }
}

fn gate_failure(err: ContextError) -> AppError {
    match err {
        ContextError::DeadlineExceeded => AppError::timeout(format!("{}: {}", WAITING, err)),
        ContextError::Canceled => AppError::UserCancelled,
    }
}
