use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{ListResult, Page};
use crate::{
    db::error::DbResult,
    models::{CostRecord, CostRecordFilter, NewCostRecord},
};

/// Repository for aggregated cost records.
///
/// All writes are idempotent upserts keyed by the natural key
/// (service, project, sku, time_period): a conflicting write overwrites
/// `cost`, `currency`, `usage_amount`, `usage_unit` and `updated_at`,
/// and preserves `id` and `created_at` from the first insert.
#[async_trait]
pub trait CostRecordRepo: Send + Sync {
    /// Upsert a single record, returning the post-upsert row.
    async fn upsert(&self, record: NewCostRecord) -> DbResult<CostRecord>;

    /// Upsert a batch atomically: either every record commits or none do.
    ///
    /// An empty batch is a no-op returning an empty vec. When the batch
    /// contains several records for the same natural key, the last one wins.
    async fn upsert_batch(&self, records: Vec<NewCostRecord>) -> DbResult<Vec<CostRecord>>;

    async fn get_by_id(&self, id: Uuid) -> DbResult<Option<CostRecord>>;

    /// Filtered, paginated read. The result carries the total count
    /// computed before pagination.
    async fn list(
        &self,
        filter: &CostRecordFilter,
        page: Page,
    ) -> DbResult<ListResult<CostRecord>>;

    /// Sum of `cost` over the filtered set. Empty sets sum to `0.0`.
    async fn sum_cost(&self, filter: &CostRecordFilter) -> DbResult<f64>;

    async fn distinct_services(&self) -> DbResult<Vec<String>>;
    async fn distinct_projects(&self) -> DbResult<Vec<String>>;
    async fn distinct_skus(&self) -> DbResult<Vec<String>>;
}

/// Collapse intra-batch natural-key collisions, keeping the last occurrence.
///
/// Multi-row `INSERT .. ON CONFLICT DO UPDATE` statements reject two rows
/// hitting the same key within one statement, so the collapse happens here
/// and the "last value in the conflict set wins" semantics are preserved.
pub(crate) fn collapse_batch(records: Vec<NewCostRecord>) -> Vec<NewCostRecord> {
    let mut index: HashMap<(String, String, String, DateTime<Utc>), usize> = HashMap::new();
    let mut out: Vec<NewCostRecord> = Vec::with_capacity(records.len());

    for record in records {
        let key = (
            record.service.clone(),
            record.project.clone(),
            record.sku.clone(),
            record.time_period,
        );
        match index.get(&key) {
            Some(&slot) => out[slot] = record,
            None => {
                index.insert(key, out.len());
                out.push(record);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn record(sku: &str, day: u32, cost: f64) -> NewCostRecord {
        NewCostRecord {
            service: "Compute Engine".to_string(),
            project: "proj-a".to_string(),
            sku: sku.to_string(),
            time_period: Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap(),
            cost,
            currency: "USD".to_string(),
            usage_amount: None,
            usage_unit: None,
        }
    }

    #[test]
    fn collapse_keeps_last_value_for_duplicate_keys() {
        let collapsed = collapse_batch(vec![
            record("sku-1", 1, 10.0),
            record("sku-2", 1, 5.0),
            record("sku-1", 1, 15.0),
        ]);

        assert_eq!(collapsed.len(), 2);
        let sku1 = collapsed.iter().find(|r| r.sku == "sku-1").unwrap();
        assert_eq!(sku1.cost, 15.0);
    }

    #[test]
    fn collapse_leaves_distinct_keys_untouched() {
        let collapsed = collapse_batch(vec![record("sku-1", 1, 10.0), record("sku-1", 2, 20.0)]);
        assert_eq!(collapsed.len(), 2);
    }

    #[test]
    fn collapse_of_empty_batch_is_empty() {
        assert!(collapse_batch(vec![]).is_empty());
    }
}
