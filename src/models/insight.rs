use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Category of a generated insight.
///
/// The mapping from kind to prompt instruction is total: unknown values are
/// preserved as `Other` and handled by the generic pass-through branch, so
/// no request is ever rejected for an unrecognized kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum InsightKind {
    Summary,
    SpendSummary,
    Anomaly,
    RootCause,
    Prediction,
    Recommendation,
    NaturalQuery,
    Other(String),
}

impl InsightKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Summary => "summary",
            Self::SpendSummary => "spend_summary",
            Self::Anomaly => "anomaly",
            Self::RootCause => "root_cause",
            Self::Prediction => "prediction",
            Self::Recommendation => "recommendation",
            Self::NaturalQuery => "natural_query",
            Self::Other(s) => s.as_str(),
        }
    }
}

impl From<String> for InsightKind {
    fn from(s: String) -> Self {
        match s.as_str() {
            "summary" => Self::Summary,
            "spend_summary" => Self::SpendSummary,
            "anomaly" => Self::Anomaly,
            "root_cause" => Self::RootCause,
            "prediction" => Self::Prediction,
            "recommendation" => Self::Recommendation,
            "natural_query" => Self::NaturalQuery,
            _ => Self::Other(s),
        }
    }
}

impl From<InsightKind> for String {
    fn from(kind: InsightKind) -> Self {
        kind.as_str().to_string()
    }
}

impl std::fmt::Display for InsightKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A generated or manually submitted insight. Immutable after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsightRecord {
    pub id: Uuid,
    pub insight_type: InsightKind,
    pub insight_text: String,
    /// Weak reference: points at a cost record without FK enforcement.
    pub related_cost_record_id: Option<Uuid>,
    pub sentiment: Option<String>,
    pub generated_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input shape for persisting an insight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewInsight {
    pub insight_type: InsightKind,
    pub insight_text: String,
    #[serde(default)]
    pub related_cost_record_id: Option<Uuid>,
    #[serde(default)]
    pub sentiment: Option<String>,
    /// When the insight was produced. Defaults to now at persist time.
    #[serde(default)]
    pub generated_at: Option<DateTime<Utc>>,
}

/// Filter for insight list reads.
#[derive(Debug, Clone, Default)]
pub struct InsightFilter {
    pub insight_type: Option<InsightKind>,
    pub related_cost_record_id: Option<Uuid>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_round_trips_known_values() {
        for s in [
            "summary",
            "spend_summary",
            "anomaly",
            "root_cause",
            "prediction",
            "recommendation",
            "natural_query",
        ] {
            let kind = InsightKind::from(s.to_string());
            assert_eq!(kind.as_str(), s);
            assert!(!matches!(kind, InsightKind::Other(_)));
        }
    }

    #[test]
    fn unknown_kind_is_preserved_as_other() {
        let kind = InsightKind::from("capacity_planning".to_string());
        assert_eq!(kind, InsightKind::Other("capacity_planning".to_string()));
        assert_eq!(kind.as_str(), "capacity_planning");
    }
}
