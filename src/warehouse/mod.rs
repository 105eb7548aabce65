//! Billing warehouse access: query construction, row transformation, and
//! the BigQuery REST client.

mod bigquery;
pub mod query;
pub mod transform;

use async_trait::async_trait;
pub use bigquery::BigQueryClient;
use thiserror::Error;

/// One result row keyed by output column name. Numeric values may arrive
/// as JSON strings (BigQuery's REST encoding); the transform layer owns
/// coercion.
pub type WarehouseRow = serde_json::Map<String, serde_json::Value>;

/// A page of dataset ids.
#[derive(Debug, Clone, serde::Serialize)]
pub struct DatasetPage {
    pub ids: Vec<String>,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Error)]
pub enum WarehouseError {
    /// Bad identifiers or credentials. Fatal to the call, never retried
    /// internally.
    #[error("Warehouse configuration error: {0}")]
    Configuration(String),

    #[error("Warehouse authentication error: {0}")]
    Auth(String),

    #[error("Warehouse query failed: {0}")]
    Query(String),

    #[error("Warehouse transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Malformed warehouse response: {0}")]
    MalformedResponse(String),
}

/// Opaque warehouse capability.
///
/// Constructed once at startup and injected into the services that need it,
/// so components stay testable with substitute clients.
#[async_trait]
pub trait WarehouseClient: Send + Sync {
    /// Execute a SQL query and return all result rows.
    async fn run_query(&self, sql: &str) -> Result<Vec<WarehouseRow>, WarehouseError>;

    /// List dataset ids, one page at a time.
    async fn list_datasets(
        &self,
        page_size: Option<i64>,
        page_token: Option<&str>,
    ) -> Result<DatasetPage, WarehouseError>;

    /// List every table id in a dataset.
    async fn list_tables(&self, dataset: &str) -> Result<Vec<String>, WarehouseError>;

    /// Probe whether a column (including partition pseudo-columns) exists
    /// on a table.
    async fn column_exists(
        &self,
        dataset: &str,
        table: &str,
        column: &str,
    ) -> Result<bool, WarehouseError>;
}
