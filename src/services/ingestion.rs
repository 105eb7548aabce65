//! Warehouse-to-store ingestion pipeline.
//!
//! One ingestion run is query, transform, upsert. The batch is
//! all-or-nothing: a single malformed row aborts the run with zero records
//! persisted, and re-running the same window is safe because the store
//! upserts on the natural key.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::{
    config::WarehouseConfig,
    db::{DbError, DbPool},
    warehouse::{
        query::{choose_filter_column, BillingQueryBuilder, PARTITION_DATE_COLUMN},
        transform::{self, TransformError},
        DatasetPage, WarehouseClient, WarehouseError,
    },
};

#[derive(Debug, Error)]
pub enum IngestionError {
    #[error(transparent)]
    Warehouse(#[from] WarehouseError),

    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error(transparent)]
    Store(#[from] DbError),
}

/// Parameters for one ingestion run. Omitted identifiers fall back to the
/// configured billing export location.
#[derive(Debug, Clone, Default)]
pub struct IngestRequest {
    pub dataset: Option<String>,
    pub table: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
pub struct IngestReport {
    pub dataset: String,
    pub table: String,
    pub rows_fetched: usize,
    pub records_persisted: usize,
}

#[derive(Clone)]
pub struct IngestionService {
    db: Arc<DbPool>,
    warehouse: Arc<dyn WarehouseClient>,
    project: String,
    default_dataset: String,
    default_table: String,
}

impl IngestionService {
    pub fn new(
        db: Arc<DbPool>,
        warehouse: Arc<dyn WarehouseClient>,
        config: &WarehouseConfig,
    ) -> Self {
        Self {
            db,
            warehouse,
            project: config.project.clone(),
            default_dataset: config.dataset.clone(),
            default_table: config.table.clone(),
        }
    }

    /// Run one ingestion pass over the billing export table.
    #[tracing::instrument(skip(self), fields(project = %self.project))]
    pub async fn ingest(&self, request: IngestRequest) -> Result<IngestReport, IngestionError> {
        let dataset = request
            .dataset
            .unwrap_or_else(|| self.default_dataset.clone());
        let table = request.table.unwrap_or_else(|| self.default_table.clone());

        let builder = BillingQueryBuilder::new(&self.project, &dataset, &table)?
            .with_date_range(request.start_date, request.end_date);

        // Partitioned tables get pruned on the pseudo-column, everything
        // else filters on event time.
        let has_partition = self
            .warehouse
            .column_exists(&dataset, &table, PARTITION_DATE_COLUMN)
            .await?;
        let filter_column = choose_filter_column(has_partition);
        tracing::debug!(?filter_column, %dataset, %table, "selected date filter column");

        let sql = builder.aggregation_sql(filter_column, Utc::now());
        let rows = self.warehouse.run_query(&sql).await?;
        let records = transform::transform_rows(&rows)?;
        let persisted = self.db.cost_records().upsert_batch(records).await?;

        tracing::info!(
            rows_fetched = rows.len(),
            records_persisted = persisted.len(),
            %dataset,
            %table,
            "ingestion run complete"
        );
        Ok(IngestReport {
            dataset,
            table,
            rows_fetched: rows.len(),
            records_persisted: persisted.len(),
        })
    }

    /// List dataset ids in the configured project, one page at a time.
    pub async fn list_datasets(
        &self,
        page_size: Option<i64>,
        page_token: Option<&str>,
    ) -> Result<DatasetPage, WarehouseError> {
        self.warehouse.list_datasets(page_size, page_token).await
    }

    /// List table ids in a dataset.
    pub async fn list_tables(&self, dataset: &str) -> Result<Vec<String>, WarehouseError> {
        self.warehouse.list_tables(dataset).await
    }
}
