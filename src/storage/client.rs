//! Fledge storage service HTTP client.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};
use url::Url;

use crate::config::Config;
use crate::error::StorageError;
use crate::metrics;

use super::types::{
    BaselineUpdate, Counter, HistorySnapshot, InsertPayload, QueryResult, StatisticsRow,
    StorageMessage, UpdatePayload,
};
use super::{StatisticsStorage, HISTORY_TABLE, STATISTICS_TABLE};

/// Client for the table API of the Fledge storage service.
#[derive(Debug, Clone)]
pub struct StorageClient {
    /// HTTP client for API requests.
    http: reqwest::Client,
    /// Storage service base URL.
    base_url: Url,
}

impl StorageClient {
    /// Create a storage client from config.
    pub fn new(config: &Config) -> Result<Self, StorageError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.storage_timeout_ms))
            .connect_timeout(Duration::from_millis(config.storage_connect_timeout_ms))
            .tcp_keepalive(Duration::from_secs(30))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()?;

        Ok(Self::with_http(http, config.storage_base_url()?))
    }

    /// Create a client around an existing HTTP client.
    pub fn with_http(http: reqwest::Client, base_url: Url) -> Self {
        Self { http, base_url }
    }

    /// Get the storage base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// URL of a table endpoint.
    pub fn table_url(&self, table: &str) -> Result<Url, StorageError> {
        Ok(self.base_url.join(&format!("storage/table/{}", table))?)
    }

    /// Query every row of a table.
    #[instrument(skip(self))]
    pub async fn query_table<T: DeserializeOwned>(
        &self,
        table: &str,
    ) -> Result<QueryResult<T>, StorageError> {
        let request = self.http.get(self.table_url(table)?);
        let start = Instant::now();
        let result = match request.send().await {
            Ok(response) => decode(response).await,
            Err(e) => Err(e.into()),
        };
        metrics::record_storage_latency(start, "query");
        result
    }

    /// Bulk insert into a table.
    #[instrument(skip(self, payload))]
    pub async fn insert_into_table(
        &self,
        table: &str,
        payload: &InsertPayload,
    ) -> Result<(), StorageError> {
        let request = self.http.post(self.table_url(table)?).json(payload);
        let start = Instant::now();
        let result = match request.send().await {
            Ok(response) => check(response).await,
            Err(e) => Err(e.into()),
        };
        metrics::record_storage_latency(start, "insert");
        result
    }

    /// Bulk conditional update of a table.
    #[instrument(skip(self, payload))]
    pub async fn update_table(
        &self,
        table: &str,
        payload: &UpdatePayload,
    ) -> Result<(), StorageError> {
        let request = self.http.put(self.table_url(table)?).json(payload);
        let start = Instant::now();
        let result = match request.send().await {
            Ok(response) => check(response).await,
            Err(e) => Err(e.into()),
        };
        metrics::record_storage_latency(start, "update");
        result
    }
}

/// Turn a non-success response into [`StorageError::Status`].
async fn check(response: reqwest::Response) -> Result<(), StorageError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }

    let body = response.text().await.unwrap_or_default();
    Err(status_error(status.as_u16(), &body))
}

/// Decode a success body, or fail with the service's error message.
async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, StorageError> {
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        return Err(status_error(status.as_u16(), &body));
    }

    serde_json::from_str(&body).map_err(|e| StorageError::Decode(e.to_string()))
}

fn status_error(status: u16, body: &str) -> StorageError {
    let message = serde_json::from_str::<StorageMessage>(body)
        .map(|m| m.message)
        .unwrap_or_else(|_| body.to_string());
    StorageError::Status { status, message }
}

#[async_trait]
impl StatisticsStorage for StorageClient {
    async fn fetch_counters(&self) -> Result<Vec<Counter>, StorageError> {
        let result: QueryResult<StatisticsRow> = self.query_table(STATISTICS_TABLE).await?;
        debug!(count = result.count, rows = result.rows.len(), "Fetched statistics");
        Ok(result.rows.into_iter().map(Counter::from).collect())
    }

    async fn insert_snapshots(&self, batch: &[HistorySnapshot]) -> Result<(), StorageError> {
        self.insert_into_table(HISTORY_TABLE, &InsertPayload::from_snapshots(batch))
            .await
    }

    async fn update_baselines(&self, batch: &[BaselineUpdate]) -> Result<(), StorageError> {
        self.update_table(STATISTICS_TABLE, &UpdatePayload::from_baselines(batch))
            .await
    }
}
