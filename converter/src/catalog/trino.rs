use async_trait::async_trait;
use common::config::TrinoConfig;
use common::{Error, Result};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use super::QueryEngine;

/// Trino answers 503 while it is busy; the same request is retried.
const UNAVAILABLE_RETRIES: u32 = 5;
const UNAVAILABLE_BACKOFF: Duration = Duration::from_millis(200);

/// Delay before re-sending a request that got `status`, or `None` when the
/// response is final.
fn retry_delay(status: u16, attempt: u32) -> Option<Duration> {
    (status == 503 && attempt < UNAVAILABLE_RETRIES).then(|| UNAVAILABLE_BACKOFF * (attempt + 1))
}

/// Trino client speaking the HTTP statement protocol: the statement is
/// posted once, then result pages are fetched from `nextUri` until the
/// query finishes.
pub struct TrinoClient {
    client: rquest::Client,
    statement_url: Url,
    config: TrinoConfig,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryPage {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    next_uri: Option<String>,
    #[serde(default)]
    data: Option<Vec<Vec<Value>>>,
    #[serde(default)]
    error: Option<QueryError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryError {
    message: String,
    #[serde(default)]
    error_name: Option<String>,
}

impl QueryPage {
    /// Moves this page's rows into `rows` and returns the next page to fetch.
    fn drain_into(self, rows: &mut Vec<Vec<Value>>) -> Result<Option<String>> {
        if let Some(error) = self.error {
            return Err(Error::QueryEngine(format!(
                "{} (query {}): {}",
                error.error_name.as_deref().unwrap_or("QUERY_FAILED"),
                self.id.as_deref().unwrap_or("unknown"),
                error.message
            )));
        }
        if let Some(data) = self.data {
            rows.extend(data);
        }
        Ok(self.next_uri)
    }
}

impl TrinoClient {
    pub fn new(config: &TrinoConfig) -> Result<Self> {
        let statement_url = Url::parse(&config.base_url())?.join("v1/statement")?;
        let client = rquest::Client::builder().build()?;

        Ok(Self {
            client,
            statement_url,
            config: config.clone(),
        })
    }

    /// Sends the request built by `request`, re-building and re-sending it
    /// while Trino reports itself unavailable.
    async fn fetch<F>(&self, request: F) -> Result<QueryPage>
    where
        F: Fn() -> rquest::RequestBuilder,
    {
        let mut attempt = 0;
        loop {
            let response = request()
                .header("X-Trino-User", &self.config.user)
                .send()
                .await?;

            let status = response.status();
            let body = response.text().await?;
            if status.is_success() {
                return Ok(serde_json::from_str(&body)?);
            }

            match retry_delay(status.as_u16(), attempt) {
                Some(delay) => {
                    warn!(status = %status, attempt = attempt + 1, "Trino unavailable, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                None => return Err(Error::QueryEngine(format!("HTTP {}: {}", status, body))),
            }
        }
    }
}

#[async_trait]
impl QueryEngine for TrinoClient {
    async fn execute(&self, statement: &str) -> Result<Vec<Vec<Value>>> {
        debug!(statement, "Executing statement");

        let submit = || {
            self.client
                .post(self.statement_url.as_str())
                .header("X-Trino-Catalog", &self.config.catalog)
                .header("X-Trino-Schema", &self.config.schema)
                .body(statement.to_string())
        };

        let mut rows = Vec::new();
        let mut next = self.fetch(submit).await?.drain_into(&mut rows)?;

        while let Some(uri) = next {
            next = self
                .fetch(|| self.client.get(uri.as_str()))
                .await?
                .drain_into(&mut rows)?;
        }

        Ok(rows)
    }
}
