//! Per-item status polling.
//!
//! Each migrated data structure gets its own [`MigrationItemPoller`] stage.
//! One iteration first reads the overall status, since a global terminal
//! state must end every item's loop, then reads the item's own entry.

use super::MigrationSettings;
use super::queries::StatusReader;
use crate::context::{Context, ContextError};
use crate::error::AppError;
use crate::models::{DataStructureInfo, DataStructureMigrationStatus, Status};
use crate::stage::{Stage, StageError, StageFn, StatusHandle, ignore_error};
use async_trait::async_trait;
use std::time::Duration;

const PROGRESS_UNAVAILABLE: &str = "Unable to calculate remaining duration and progress";

/// What to do after reading the overall status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverallStep {
    /// The item has not begun; go straight to its own entry.
    CheckItem,
    /// Forward overall progress, then check the item.
    ReportProgress,
    Complete,
    /// The whole migration failed; fetch the cluster's error list.
    FetchErrors,
    Cancelled,
}

pub fn overall_step(status: Status) -> OverallStep {
    match status {
        Status::Started => OverallStep::CheckItem,
        Status::InProgress => OverallStep::ReportProgress,
        Status::Complete => OverallStep::Complete,
        Status::Failed => OverallStep::FetchErrors,
        Status::Canceling | Status::Canceled => OverallStep::Cancelled,
    }
}

/// What to do after reading the item's own entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemStep {
    Complete,
    Failed(String),
    Cancelled,
    Wait,
}

pub fn item_step(item: Option<&DataStructureMigrationStatus>) -> ItemStep {
    let Some(item) = item else {
        return ItemStep::Wait;
    };
    match item.status {
        Status::Complete => ItemStep::Complete,
        Status::Failed if item.error.is_empty() => ItemStep::Failed("migration failed".to_string()),
        Status::Failed => ItemStep::Failed(item.error.clone()),
        Status::Canceled => ItemStep::Cancelled,
        Status::Started | Status::InProgress | Status::Canceling => ItemStep::Wait,
    }
}

#[derive(Debug)]
enum PollState {
    CheckingOverall,
    CheckingItem,
    Sleeping,
    Done(Result<(), StageError>),
}

/// Maps an expired or cancelled context to the error the user sees.
pub fn context_failure(err: ContextError) -> AppError {
    match err {
        ContextError::DeadlineExceeded => AppError::timeout(
            "migration could not be completed: reached timeout while reading status",
        ),
        ContextError::Canceled => AppError::UserCancelled,
    }
}

fn classify(err: AppError, context: &str) -> StageError {
    match err {
        AppError::Context(err) => StageError::Fatal(context_failure(err)),
        other => StageError::Fatal(other.context(context)),
    }
}

pub struct MigrationItemPoller {
    reader: StatusReader,
    index: usize,
    info: DataStructureInfo,
    poll_interval: Duration,
}

impl MigrationItemPoller {
    pub fn new(
        reader: StatusReader,
        index: usize,
        info: DataStructureInfo,
        settings: &MigrationSettings,
    ) -> Self {
        Self {
            reader,
            index,
            info,
            poll_interval: settings.poll_interval,
        }
    }

    pub fn progress_message(&self) -> String {
        format!("Migrating {}: {}", self.info.ds_type, self.info.name)
    }

    pub fn into_stage(self) -> Stage<()> {
        let progress = self.progress_message();
        let success = format!("Migrated {}: {}", self.info.ds_type, self.info.name);
        let failure = format!("Failed migrating {}: {}", self.info.ds_type, self.info.name);
        Stage::new(progress, success, failure, self)
    }

    async fn check_overall(&self, ctx: &Context, status: &StatusHandle) -> PollState {
        if let Some(err) = ctx.err() {
            return PollState::Done(Err(StageError::Fatal(context_failure(err))));
        }
        let overall = match self.reader.fetch_status(ctx).await {
            Ok(overall) => overall,
            Err(err) => return PollState::Done(Err(classify(err, "reading migration status"))),
        };
        match overall_step(overall) {
            OverallStep::CheckItem => PollState::CheckingItem,
            OverallStep::ReportProgress => {
                self.report_progress(ctx, status).await;
                PollState::CheckingItem
            }
            OverallStep::Complete => PollState::Done(Ok(())),
            OverallStep::FetchErrors => match self.reader.fetch_errors(ctx).await {
                Ok(errors) => PollState::Done(Err(StageError::Fatal(AppError::Migration(errors)))),
                Err(err) => PollState::Done(Err(classify(err, "fetching migration errors"))),
            },
            OverallStep::Cancelled => PollState::Done(Err(StageError::Fatal(AppError::UserCancelled))),
        }
    }

    async fn report_progress(&self, ctx: &Context, status: &StatusHandle) {
        match self.reader.fetch_overall_progress(ctx).await {
            Ok((remaining, percentage)) => {
                status.set_text(self.progress_message());
                status.set_progress(percentage / 100.0);
                status.set_remaining_duration(remaining);
            }
            Err(err) => {
                tracing::warn!(
                    migration_id = %self.reader.migration_id(),
                    error = %err,
                    "reading overall progress"
                );
                status.set_text(PROGRESS_UNAVAILABLE);
            }
        }
    }

    async fn check_item(&self, ctx: &Context) -> PollState {
        let item = match self.reader.fetch_item_status(ctx, self.index).await {
            Ok(item) => item,
            Err(err) => return PollState::Done(Err(classify(err, "reading data structure status"))),
        };
        match item_step(item.as_ref()) {
            ItemStep::Complete => PollState::Done(Ok(())),
            ItemStep::Failed(error) => PollState::Done(Err(ignore_error(AppError::Migration(error)))),
            ItemStep::Cancelled => PollState::Done(Err(StageError::Fatal(AppError::UserCancelled))),
            ItemStep::Wait => PollState::Sleeping,
        }
    }
}

#[async_trait]
impl StageFn<()> for MigrationItemPoller {
    async fn run(&self, ctx: &Context, status: &StatusHandle, _input: ()) -> Result<(), StageError> {
        let mut state = PollState::CheckingOverall;
        loop {
            state = match state {
                PollState::CheckingOverall => self.check_overall(ctx, status).await,
                PollState::CheckingItem => self.check_item(ctx).await,
                PollState::Sleeping => match ctx.sleep(self.poll_interval).await {
                    Ok(()) => PollState::CheckingOverall,
                    Err(err) => PollState::Done(Err(StageError::Fatal(context_failure(err)))),
                },
                PollState::Done(result) => return result,
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn item(status: Status, error: &str) -> DataStructureMigrationStatus {
        DataStructureMigrationStatus {
            name: "imap5".to_string(),
            ds_type: "IMAP".to_string(),
            status,
            completion_percentage: 0.0,
            error: error.to_string(),
        }
    }

    #[test]
    fn overall_transitions() {
        assert_eq!(overall_step(Status::Started), OverallStep::CheckItem);
        assert_eq!(overall_step(Status::InProgress), OverallStep::ReportProgress);
        assert_eq!(overall_step(Status::Complete), OverallStep::Complete);
        assert_eq!(overall_step(Status::Failed), OverallStep::FetchErrors);
        assert_eq!(overall_step(Status::Canceling), OverallStep::Cancelled);
        assert_eq!(overall_step(Status::Canceled), OverallStep::Cancelled);
    }

    #[test]
    fn item_transitions() {
        assert_eq!(item_step(None), ItemStep::Wait);
        assert_eq!(item_step(Some(&item(Status::InProgress, ""))), ItemStep::Wait);
        assert_eq!(item_step(Some(&item(Status::Canceling, ""))), ItemStep::Wait);
        assert_eq!(item_step(Some(&item(Status::Complete, ""))), ItemStep::Complete);
        assert_eq!(item_step(Some(&item(Status::Canceled, ""))), ItemStep::Cancelled);
        assert_eq!(
            item_step(Some(&item(Status::Failed, "some error"))),
            ItemStep::Failed("some error".to_string())
        );
        assert_eq!(
            item_step(Some(&item(Status::Failed, ""))),
            ItemStep::Failed("migration failed".to_string())
        );
    }

    #[test]
    fn deadline_is_a_timeout_and_cancel_is_user_cancelled() {
        assert!(context_failure(ContextError::DeadlineExceeded).is_timeout());
        assert!(context_failure(ContextError::Canceled).is_user_cancelled());
    }
}
