//! Business logic services.
//!
//! Services sit between the HTTP routes and the database, warehouse, and
//! generative clients. Each request is independent; services hold no
//! per-request state beyond the shared pool and client handles.

mod cost_records;
mod ingestion;
mod insights;
mod metrics;

use std::sync::Arc;

pub use cost_records::CostRecordService;
pub use ingestion::{IngestReport, IngestRequest, IngestionError, IngestionService};
pub use insights::{InsightError, InsightRequest, InsightService};
pub use metrics::{MetricsService, SpendOverview};

use crate::{
    config::AppConfig, db::DbPool, insight::GenerativeClient, warehouse::WarehouseClient,
};

/// All services, constructed once at startup and shared across requests.
#[derive(Clone)]
pub struct Services {
    pub cost_records: CostRecordService,
    pub ingestion: IngestionService,
    pub metrics: MetricsService,
    pub insights: InsightService,
}

impl Services {
    pub fn new(
        config: &AppConfig,
        db: Arc<DbPool>,
        warehouse: Arc<dyn WarehouseClient>,
        generator: Arc<dyn GenerativeClient>,
    ) -> Self {
        Self {
            cost_records: CostRecordService::new(Arc::clone(&db)),
            ingestion: IngestionService::new(Arc::clone(&db), warehouse, &config.warehouse),
            metrics: MetricsService::new(Arc::clone(&db)),
            insights: InsightService::new(db, generator, config.insight.prompt_budget_chars),
        }
    }
}
