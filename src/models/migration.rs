use serde::{Deserialize, Serialize};
use std::fmt;

/// Phase reported by the cluster for the whole migration or for one item.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Started,
    InProgress,
    Complete,
    Failed,
    Canceling,
    Canceled,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Status::Started => "STARTED",
            Status::InProgress => "IN_PROGRESS",
            Status::Complete => "COMPLETE",
            Status::Failed => "FAILED",
            Status::Canceling => "CANCELING",
            Status::Canceled => "CANCELED",
        };
        f.write_str(name)
    }
}

/// The record the cluster keeps for one migration, keyed by migration id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OverallMigrationStatus {
    pub status: Status,
    #[serde(default)]
    pub migrations: Vec<DataStructureMigrationStatus>,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub report: String,
    #[serde(default)]
    pub completion_percentage: f32,
    /// Milliseconds.
    #[serde(default)]
    pub remaining_time: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DataStructureMigrationStatus {
    pub name: String,
    #[serde(rename = "type")]
    pub ds_type: String,
    pub status: Status,
    #[serde(default)]
    pub completion_percentage: f32,
    #[serde(default)]
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataStructureInfo {
    pub name: String,
    pub ds_type: String,
}

impl From<&DataStructureMigrationStatus> for DataStructureInfo {
    fn from(status: &DataStructureMigrationStatus) -> Self {
        Self {
            name: status.name.clone(),
            ds_type: status.ds_type.clone(),
        }
    }
}
