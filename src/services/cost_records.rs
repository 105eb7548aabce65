//! Cost record reads and manual submission.

use std::sync::Arc;

use uuid::Uuid;
use validator::Validate;

use crate::{
    db::{DbError, DbPool, DbResult, ListResult, Page},
    models::{CostRecord, CostRecordFilter, NewCostRecord},
};

#[derive(Clone)]
pub struct CostRecordService {
    db: Arc<DbPool>,
}

/// Distinct dimension values present in the store, for filter dropdowns.
#[derive(Debug, serde::Serialize)]
pub struct Dimensions {
    pub services: Vec<String>,
    pub projects: Vec<String>,
    pub skus: Vec<String>,
}

impl CostRecordService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    /// Manually submit one record, upserting on the natural key.
    pub async fn submit(&self, record: NewCostRecord) -> DbResult<CostRecord> {
        record
            .validate()
            .map_err(|e| DbError::Validation(e.to_string()))?;
        self.db.cost_records().upsert(record).await
    }

    pub async fn get(&self, id: Uuid) -> DbResult<Option<CostRecord>> {
        self.db.cost_records().get_by_id(id).await
    }

    pub async fn list(
        &self,
        filter: &CostRecordFilter,
        page: Page,
    ) -> DbResult<ListResult<CostRecord>> {
        self.db.cost_records().list(filter, page).await
    }

    pub async fn total_cost(&self, filter: &CostRecordFilter) -> DbResult<f64> {
        self.db.cost_records().sum_cost(filter).await
    }

    pub async fn dimensions(&self) -> DbResult<Dimensions> {
        let repo = self.db.cost_records();
        Ok(Dimensions {
            services: repo.distinct_services().await?,
            projects: repo.distinct_projects().await?,
            skus: repo.distinct_skus().await?,
        })
    }
}
