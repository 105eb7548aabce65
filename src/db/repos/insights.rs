use async_trait::async_trait;
use uuid::Uuid;

use super::{ListResult, Page};
use crate::{
    db::error::DbResult,
    models::{InsightFilter, InsightRecord, NewInsight},
};

/// Repository for generated insights.
///
/// Insights are created exactly once and never updated; there is
/// deliberately no update or delete surface here.
#[async_trait]
pub trait InsightRepo: Send + Sync {
    async fn create(&self, insight: NewInsight) -> DbResult<InsightRecord>;

    async fn get_by_id(&self, id: Uuid) -> DbResult<Option<InsightRecord>>;

    /// Filtered, paginated read ordered by `generated_at` descending.
    async fn list(&self, filter: &InsightFilter, page: Page)
        -> DbResult<ListResult<InsightRecord>>;
}
