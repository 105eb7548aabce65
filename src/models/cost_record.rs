use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// One aggregated spend row for a (service, project, sku, calendar day) tuple.
///
/// The tuple is the natural key: re-ingesting the same key overwrites the
/// value columns but never duplicates the row, and `created_at` always
/// reflects the first insert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostRecord {
    pub id: Uuid,
    pub service: String,
    pub project: String,
    pub sku: String,
    /// Day-truncated usage time (midnight UTC).
    pub time_period: DateTime<Utc>,
    pub cost: f64,
    pub currency: String,
    pub usage_amount: Option<f64>,
    pub usage_unit: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input shape for creating or upserting a cost record.
///
/// Produced by the warehouse transform during ingestion and accepted
/// directly on the manual submission endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewCostRecord {
    #[validate(length(min = 1, max = 255))]
    pub service: String,
    #[validate(length(min = 1, max = 255))]
    pub project: String,
    #[validate(length(min = 1, max = 512))]
    pub sku: String,
    pub time_period: DateTime<Utc>,
    pub cost: f64,
    #[serde(default = "default_currency")]
    #[validate(length(min = 1, max = 8))]
    pub currency: String,
    #[serde(default)]
    pub usage_amount: Option<f64>,
    #[serde(default)]
    pub usage_unit: Option<String>,
}

fn default_currency() -> String {
    "USD".to_string()
}

impl NewCostRecord {
    /// Natural key used for conflict detection.
    pub fn natural_key(&self) -> (&str, &str, &str, DateTime<Utc>) {
        (
            self.service.as_str(),
            self.project.as_str(),
            self.sku.as_str(),
            self.time_period,
        )
    }
}

/// Filter applied to cost record reads and aggregate sums.
///
/// All fields are conjunctive; date bounds are inclusive.
#[derive(Debug, Clone, Default)]
pub struct CostRecordFilter {
    pub service: Option<String>,
    pub project: Option<String>,
    pub sku: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

impl CostRecordFilter {
    pub fn for_project(project: Option<String>) -> Self {
        Self {
            project,
            ..Self::default()
        }
    }
}
