use super::{Cluster, Member, Row};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

#[derive(Debug, Serialize)]
struct SqlRequest<'a> {
    statement: &'a str,
}

#[derive(Debug, Deserialize)]
struct SqlResponse {
    #[serde(default)]
    rows: Vec<Row>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

/// Talks to the cluster's REST gateway.
#[derive(Clone)]
pub struct HttpCluster {
    client: Client,
    base_url: String,
}

impl HttpCluster {
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .user_agent(concat!("dmt/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn check(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&text)
            .ok()
            .and_then(|body| body.message)
            .unwrap_or(text);
        Err(AppError::Remote(format!(
            "cluster responded with {}: {}",
            status, message
        )))
    }
}

#[async_trait]
impl Cluster for HttpCluster {
    async fn query(&self, statement: &str) -> Result<Vec<Row>> {
        tracing::debug!(statement, "executing query");
        let response = self
            .client
            .post(self.url("sql"))
            .json(&SqlRequest { statement })
            .send()
            .await?;
        let body: SqlResponse = Self::check(response).await?.json().await?;
        Ok(body.rows)
    }

    async fn members(&self) -> Result<Vec<Member>> {
        let response = self.client.get(self.url("members")).send().await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn list(&self, name: &str) -> Result<Vec<String>> {
        let response = self
            .client
            .get(self.url(&format!("lists/{}", name)))
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn offer(&self, queue: &str, item: Value) -> Result<()> {
        let response = self
            .client
            .post(self.url(&format!("queues/{}", queue)))
            .json(&item)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }
}
