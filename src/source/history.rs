//! HTTP client for the history endpoint.
//!
//! Two read-only resources are used:
//!
//! - `GET /history`: every stored row, newest first
//! - `GET /latest`: the newest row, or `null` when nothing is stored
//!
//! ## Example
//!
//! ```rust,no_run
//! use lathewatch::source::HistoryClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = HistoryClient::builder()
//!         .endpoint("http://127.0.0.1:8000")
//!         .build()?;
//!
//!     let latest = client.fetch_latest().await?;
//!     println!("mean at {}: {:?}", latest.timestamp_ms, latest.values);
//!     Ok(())
//! }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use super::HistorySource;
use crate::data::HistoryRow;
use crate::error::BootstrapError;

const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:8000";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Client for the sensor backend's history API.
#[derive(Debug, Clone)]
pub struct HistoryClient {
    client: Client,
    endpoint: String,
}

impl HistoryClient {
    /// Create a new builder for configuring the client.
    pub fn builder() -> HistoryClientBuilder {
        HistoryClientBuilder::default()
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Fetch the newest stored row.
    pub async fn fetch_latest(&self) -> Result<HistoryRow, BootstrapError> {
        let body = self.get_json("latest").await?;
        if body.is_null() {
            return Err(BootstrapError::Empty);
        }
        HistoryRow::from_value(&body).map_err(|e| BootstrapError::Parse(e.to_string()))
    }

    async fn get_json(&self, resource: &str) -> Result<Value, BootstrapError> {
        let url = format!("{}/{}", self.endpoint, resource);
        debug!("GET {}", url);

        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(BootstrapError::Http(format!(
                "{} returned status {}",
                url,
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| BootstrapError::Parse(e.to_string()))
    }
}

#[async_trait]
impl HistorySource for HistoryClient {
    async fn fetch_history(&self) -> Result<Vec<Value>, BootstrapError> {
        match self.get_json("history").await? {
            Value::Array(rows) => Ok(rows),
            Value::Null => Ok(Vec::new()),
            other => Err(BootstrapError::Parse(format!(
                "expected an array of rows, got {}",
                json_kind(&other)
            ))),
        }
    }

    fn description(&self) -> &str {
        &self.endpoint
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Builder for HistoryClient.
#[derive(Debug, Default)]
pub struct HistoryClientBuilder {
    endpoint: Option<String>,
    timeout: Option<Duration>,
}

impl HistoryClientBuilder {
    /// Set the API base URL (default: "http://127.0.0.1:8000").
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Set the request timeout (default: 10 seconds).
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Build the client.
    pub fn build(self) -> Result<HistoryClient, BootstrapError> {
        let client = Client::builder()
            .timeout(self.timeout.unwrap_or(DEFAULT_TIMEOUT))
            .build()
            .map_err(|e| BootstrapError::Http(format!("Failed to build HTTP client: {}", e)))?;

        let endpoint = self
            .endpoint
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(HistoryClient { client, endpoint })
    }
}
