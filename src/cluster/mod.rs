mod http;

pub use http::HttpCluster;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One result row; each column is a decoded JSON value, `Null` for SQL NULL.
pub type Row = Vec<Value>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub uuid: String,
    #[serde(default)]
    pub address: String,
}

/// Requests the tool makes against the migration cluster. Every call is
/// independent; nothing here holds a transaction or a lock.
#[async_trait]
pub trait Cluster: Send + Sync {
    async fn query(&self, statement: &str) -> Result<Vec<Row>>;

    async fn members(&self) -> Result<Vec<Member>>;

    /// Full contents of the named list, in order.
    async fn list(&self, name: &str) -> Result<Vec<String>>;

    async fn offer(&self, queue: &str, item: Value) -> Result<()>;
}
