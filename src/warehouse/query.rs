//! SQL construction for the billing export table.
//!
//! Queries aggregate raw export rows into one row per
//! `(service, project, sku, day, currency, usage unit)` so the ingestion
//! pipeline persists pre-summed records.

use chrono::{DateTime, NaiveDate, Utc};

use super::WarehouseError;

/// BigQuery's ingestion-time partitioning pseudo-column. It never appears
/// in the table schema, only in `INFORMATION_SCHEMA.COLUMNS`.
pub const PARTITION_DATE_COLUMN: &str = "_PARTITIONDATE";

/// Event-time column present in every billing export schema.
pub const EVENT_TIME_COLUMN: &str = "usage_start_time";

/// Lower bound applied when scanning a partitioned table without an
/// explicit start date. Required so the partition filter stays sargable.
pub const EPOCH_LOWER_BOUND: &str = "1970-01-01";

/// Which column date bounds are applied to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterColumn {
    /// `_PARTITIONDATE`, preferred: prunes partitions instead of scanning.
    PartitionDate,
    /// `usage_start_time`, the fallback for non-partitioned tables.
    EventTime,
}

impl FilterColumn {
    pub fn name(self) -> &'static str {
        match self {
            FilterColumn::PartitionDate => PARTITION_DATE_COLUMN,
            FilterColumn::EventTime => EVENT_TIME_COLUMN,
        }
    }
}

/// Prefer the partition pseudo-column whenever the table has one.
pub fn choose_filter_column(has_partition_column: bool) -> FilterColumn {
    if has_partition_column {
        FilterColumn::PartitionDate
    } else {
        FilterColumn::EventTime
    }
}

/// Builds the aggregation query for one billing export table.
#[derive(Debug, Clone)]
pub struct BillingQueryBuilder {
    project: String,
    dataset: String,
    table: String,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
}

impl BillingQueryBuilder {
    /// Rejects identifiers that cannot be safely embedded in a backtick
    /// quoted table path.
    pub fn new(project: &str, dataset: &str, table: &str) -> Result<Self, WarehouseError> {
        for (label, value) in [("project", project), ("dataset", dataset), ("table", table)] {
            validate_identifier(label, value)?;
        }
        Ok(Self {
            project: project.to_string(),
            dataset: dataset.to_string(),
            table: table.to_string(),
            start_date: None,
            end_date: None,
        })
    }

    pub fn with_date_range(
        mut self,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Self {
        self.start_date = start_date;
        self.end_date = end_date;
        self
    }

    fn table_path(&self) -> String {
        format!("`{}.{}.{}`", self.project, self.dataset, self.table)
    }

    /// Render the aggregation SQL.
    ///
    /// On the partition path, missing bounds default to the epoch and to
    /// `now`: an unbounded predicate on `_PARTITIONDATE` is rejected by
    /// tables that require a partition filter. On the event-time path,
    /// missing bounds are simply omitted.
    pub fn aggregation_sql(&self, filter_column: FilterColumn, now: DateTime<Utc>) -> String {
        let mut predicates = Vec::new();
        match filter_column {
            FilterColumn::PartitionDate => {
                let start = self
                    .start_date
                    .map(|d| d.to_string())
                    .unwrap_or_else(|| EPOCH_LOWER_BOUND.to_string());
                let end = self
                    .end_date
                    .map(|d| d.to_string())
                    .unwrap_or_else(|| now.date_naive().to_string());
                predicates.push(format!("{} >= '{start}'", filter_column.name()));
                predicates.push(format!("{} <= '{end}'", filter_column.name()));
            }
            FilterColumn::EventTime => {
                if let Some(start) = self.start_date {
                    predicates.push(format!("DATE({}) >= '{start}'", filter_column.name()));
                }
                if let Some(end) = self.end_date {
                    predicates.push(format!("DATE({}) <= '{end}'", filter_column.name()));
                }
            }
        }
        let where_clause = if predicates.is_empty() {
            String::new()
        } else {
            format!("\nWHERE {}", predicates.join(" AND "))
        };

        format!(
            "SELECT\n    \
             service.description AS service,\n    \
             project.id AS project,\n    \
             sku.description AS sku,\n    \
             DATE(usage_start_time) AS time_period,\n    \
             SUM(cost) AS cost,\n    \
             currency AS currency,\n    \
             SUM(usage.amount) AS usage_amount,\n    \
             usage.unit AS usage_unit\n\
             FROM {table}{where_clause}\n\
             GROUP BY service, project, sku, time_period, currency, usage_unit\n\
             ORDER BY time_period, project, service, sku",
            table = self.table_path(),
        )
    }
}

/// Probe for a column's existence, partition pseudo-columns included.
pub fn column_probe_sql(
    project: &str,
    dataset: &str,
    table: &str,
    column: &str,
) -> Result<String, WarehouseError> {
    validate_identifier("project", project)?;
    validate_identifier("dataset", dataset)?;
    validate_identifier("table", table)?;
    validate_identifier("column", column)?;
    Ok(format!(
        "SELECT COUNT(*) > 0 AS column_present\n\
         FROM `{project}.{dataset}`.INFORMATION_SCHEMA.COLUMNS\n\
         WHERE table_name = '{table}' AND column_name = '{column}'"
    ))
}

fn validate_identifier(label: &str, value: &str) -> Result<(), WarehouseError> {
    let valid = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(WarehouseError::Configuration(format!(
            "invalid {label} identifier: {value:?}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone, Utc};

    use super::*;

    fn builder() -> BillingQueryBuilder {
        BillingQueryBuilder::new("my-project", "billing", "gcp_billing_export_v1").unwrap()
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn partition_path_defaults_both_bounds() {
        let now = Utc.with_ymd_and_hms(2024, 3, 15, 12, 0, 0).unwrap();
        let sql = builder().aggregation_sql(FilterColumn::PartitionDate, now);

        assert!(sql.contains("_PARTITIONDATE >= '1970-01-01'"));
        assert!(sql.contains("_PARTITIONDATE <= '2024-03-15'"));
        assert!(!sql.contains("usage_start_time >="));
    }

    #[test]
    fn partition_path_uses_explicit_bounds() {
        let now = Utc.with_ymd_and_hms(2024, 3, 15, 0, 0, 0).unwrap();
        let sql = builder()
            .with_date_range(Some(day(2024, 1, 1)), Some(day(2024, 1, 31)))
            .aggregation_sql(FilterColumn::PartitionDate, now);

        assert!(sql.contains("_PARTITIONDATE >= '2024-01-01'"));
        assert!(sql.contains("_PARTITIONDATE <= '2024-01-31'"));
    }

    #[test]
    fn event_time_path_omits_missing_bounds() {
        let now = Utc.with_ymd_and_hms(2024, 3, 15, 0, 0, 0).unwrap();
        let sql = builder().aggregation_sql(FilterColumn::EventTime, now);

        assert!(!sql.contains("WHERE"));
        assert!(sql.contains("GROUP BY service, project, sku, time_period, currency, usage_unit"));
        assert!(sql.contains("ORDER BY time_period, project, service, sku"));
    }

    #[test]
    fn event_time_path_wraps_bounds_in_date() {
        let now = Utc.with_ymd_and_hms(2024, 3, 15, 0, 0, 0).unwrap();
        let sql = builder()
            .with_date_range(Some(day(2024, 2, 1)), None)
            .aggregation_sql(FilterColumn::EventTime, now);

        assert!(sql.contains("WHERE DATE(usage_start_time) >= '2024-02-01'"));
        assert!(!sql.contains("<="));
    }

    #[test]
    fn table_path_is_fully_qualified() {
        let now = Utc.with_ymd_and_hms(2024, 3, 15, 0, 0, 0).unwrap();
        let sql = builder().aggregation_sql(FilterColumn::EventTime, now);
        assert!(sql.contains("FROM `my-project.billing.gcp_billing_export_v1`"));
    }

    #[rstest::rstest]
    #[case("billing; DROP TABLE x")]
    #[case("billing export")]
    #[case("t'--")]
    #[case("`t`")]
    #[case("")]
    fn malformed_identifiers_are_rejected(#[case] dataset: &str) {
        let err = BillingQueryBuilder::new("my-project", dataset, "t").unwrap_err();
        assert!(matches!(err, WarehouseError::Configuration(_)));

        assert!(column_probe_sql("p", dataset, "t", "c").is_err());
    }

    #[test]
    fn filter_column_selection_prefers_partition() {
        assert_eq!(choose_filter_column(true), FilterColumn::PartitionDate);
        assert_eq!(choose_filter_column(false), FilterColumn::EventTime);
    }

    #[test]
    fn column_probe_targets_information_schema() {
        let sql = column_probe_sql("p", "billing", "export", "_PARTITIONDATE").unwrap();
        assert!(sql.contains("`p.billing`.INFORMATION_SCHEMA.COLUMNS"));
        assert!(sql.contains("table_name = 'export'"));
        assert!(sql.contains("column_name = '_PARTITIONDATE'"));
    }
}
