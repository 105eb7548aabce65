use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};
use uuid::Uuid;

use crate::{
    db::{
        error::{DbError, DbResult},
        repos::{CostRecordRepo, ListResult, Page, collapse_batch},
    },
    models::{CostRecord, CostRecordFilter, NewCostRecord},
};

/// Column list shared by upsert RETURNING clauses and reads.
const RECORD_COLS: &str = "id, service, project, sku, time_period, cost, currency, \
     usage_amount, usage_unit, created_at, updated_at";

/// Conflict action for the natural key. `created_at` and `id` are absent
/// from the SET list on purpose: the original insert owns them.
const ON_CONFLICT: &str = "ON CONFLICT (service, project, sku, time_period) DO UPDATE SET \
     cost = excluded.cost, currency = excluded.currency, \
     usage_amount = excluded.usage_amount, usage_unit = excluded.usage_unit, \
     updated_at = excluded.updated_at";

pub struct SqliteCostRecordRepo {
    pool: SqlitePool,
}

impl SqliteCostRecordRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn map_cost_record(row: &SqliteRow) -> DbResult<CostRecord> {
    let id: String = row.try_get("id")?;
    let id = Uuid::parse_str(&id)
        .map_err(|e| DbError::Internal(format!("invalid uuid in cost_records.id: {e}")))?;
    Ok(CostRecord {
        id,
        service: row.try_get("service")?,
        project: row.try_get("project")?,
        sku: row.try_get("sku")?,
        time_period: row.try_get("time_period")?,
        cost: row.try_get("cost")?,
        currency: row.try_get("currency")?,
        usage_amount: row.try_get("usage_amount")?,
        usage_unit: row.try_get("usage_unit")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn filter_clauses(filter: &CostRecordFilter) -> Vec<&'static str> {
    let mut clauses = Vec::new();
    if filter.service.is_some() {
        clauses.push("service = ?");
    }
    if filter.project.is_some() {
        clauses.push("project = ?");
    }
    if filter.sku.is_some() {
        clauses.push("sku = ?");
    }
    if filter.start_date.is_some() {
        clauses.push("time_period >= ?");
    }
    if filter.end_date.is_some() {
        clauses.push("time_period <= ?");
    }
    clauses
}

fn where_clause(filter: &CostRecordFilter) -> String {
    let clauses = filter_clauses(filter);
    if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    }
}

fn bind_filter<'q>(
    mut query: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    filter: &'q CostRecordFilter,
) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
    if let Some(service) = &filter.service {
        query = query.bind(service);
    }
    if let Some(project) = &filter.project {
        query = query.bind(project);
    }
    if let Some(sku) = &filter.sku {
        query = query.bind(sku);
    }
    if let Some(start) = &filter.start_date {
        query = query.bind(start);
    }
    if let Some(end) = &filter.end_date {
        query = query.bind(end);
    }
    query
}

#[async_trait]
impl CostRecordRepo for SqliteCostRecordRepo {
    async fn upsert(&self, record: NewCostRecord) -> DbResult<CostRecord> {
        let now = Utc::now();
        let sql = format!(
            "INSERT INTO cost_records ({RECORD_COLS}) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             {ON_CONFLICT} RETURNING {RECORD_COLS}"
        );

        let row = sqlx::query(&sql)
            .bind(Uuid::new_v4().to_string())
            .bind(&record.service)
            .bind(&record.project)
            .bind(&record.sku)
            .bind(record.time_period)
            .bind(record.cost)
            .bind(&record.currency)
            .bind(record.usage_amount)
            .bind(&record.usage_unit)
            .bind(now)
            .bind(now)
            .fetch_one(&self.pool)
            .await?;

        map_cost_record(&row)
    }

    async fn upsert_batch(&self, records: Vec<NewCostRecord>) -> DbResult<Vec<CostRecord>> {
        let records = collapse_batch(records);
        if records.is_empty() {
            return Ok(Vec::new());
        }

        // SQLite caps bound parameters at 999 per statement. Each row uses
        // 11, so 80 rows per statement leaves headroom.
        const MAX_ROWS_PER_STATEMENT: usize = 80;

        let now = Utc::now();
        let mut persisted = Vec::with_capacity(records.len());

        // One transaction for the whole batch: a failed chunk rolls back
        // everything, so ingestion runs are all-or-nothing.
        let mut tx = self.pool.begin().await?;

        for chunk in records.chunks(MAX_ROWS_PER_STATEMENT) {
            let placeholders: Vec<&str> = chunk
                .iter()
                .map(|_| "(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)")
                .collect();
            let sql = format!(
                "INSERT INTO cost_records ({RECORD_COLS}) VALUES {} \
                 {ON_CONFLICT} RETURNING {RECORD_COLS}",
                placeholders.join(", ")
            );

            let mut query = sqlx::query(&sql);
            for record in chunk {
                query = query
                    .bind(Uuid::new_v4().to_string())
                    .bind(&record.service)
                    .bind(&record.project)
                    .bind(&record.sku)
                    .bind(record.time_period)
                    .bind(record.cost)
                    .bind(&record.currency)
                    .bind(record.usage_amount)
                    .bind(&record.usage_unit)
                    .bind(now)
                    .bind(now);
            }

            let rows = query.fetch_all(&mut *tx).await?;
            for row in &rows {
                persisted.push(map_cost_record(row)?);
            }
        }

        tx.commit().await?;
        Ok(persisted)
    }

    async fn get_by_id(&self, id: Uuid) -> DbResult<Option<CostRecord>> {
        let sql = format!("SELECT {RECORD_COLS} FROM cost_records WHERE id = ?");
        let row = sqlx::query(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(map_cost_record).transpose()
    }

    async fn list(
        &self,
        filter: &CostRecordFilter,
        page: Page,
    ) -> DbResult<ListResult<CostRecord>> {
        let where_sql = where_clause(filter);

        let count_sql = format!("SELECT COUNT(*) FROM cost_records {where_sql}");
        let total: i64 = bind_filter(sqlx::query(&count_sql), filter)
            .fetch_one(&self.pool)
            .await?
            .try_get(0)?;

        let list_sql = format!(
            "SELECT {RECORD_COLS} FROM cost_records {where_sql} \
             ORDER BY time_period, project, service, sku LIMIT ? OFFSET ?"
        );
        let rows = bind_filter(sqlx::query(&list_sql), filter)
            .bind(page.limit)
            .bind(page.skip)
            .fetch_all(&self.pool)
            .await?;

        let items = rows
            .iter()
            .map(map_cost_record)
            .collect::<DbResult<Vec<_>>>()?;

        Ok(ListResult { items, total })
    }

    async fn sum_cost(&self, filter: &CostRecordFilter) -> DbResult<f64> {
        let where_sql = where_clause(filter);
        let sql = format!("SELECT CAST(COALESCE(SUM(cost), 0) AS REAL) FROM cost_records {where_sql}");
        let total: f64 = bind_filter(sqlx::query(&sql), filter)
            .fetch_one(&self.pool)
            .await?
            .try_get(0)?;
        Ok(total)
    }

    async fn distinct_services(&self) -> DbResult<Vec<String>> {
        let rows =
            sqlx::query_scalar("SELECT DISTINCT service FROM cost_records ORDER BY service")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows)
    }

    async fn distinct_projects(&self) -> DbResult<Vec<String>> {
        let rows =
            sqlx::query_scalar("SELECT DISTINCT project FROM cost_records ORDER BY project")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows)
    }

    async fn distinct_skus(&self) -> DbResult<Vec<String>> {
        let rows = sqlx::query_scalar("SELECT DISTINCT sku FROM cost_records ORDER BY sku")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }
}
