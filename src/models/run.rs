use serde::{Deserialize, Serialize};

/// A migration this machine started or watched, as kept in the local store.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct MigrationRun {
    pub id: String,
    pub config_path: Option<String>,
    pub outcome: Option<RunOutcome>,
    pub started_at: i64,
    pub finished_at: Option<i64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq)]
#[repr(i32)]
pub enum RunOutcome {
    Completed = 0,
    Failed = 1,
    Cancelled = 2,
}
