use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use super::placeholder_tuple;
use crate::{
    db::{
        error::DbResult,
        repos::{CostRecordRepo, ListResult, Page, collapse_batch},
    },
    models::{CostRecord, CostRecordFilter, NewCostRecord},
};

const RECORD_COLS: &str = "id, service, project, sku, time_period, cost, currency, \
     usage_amount, usage_unit, created_at, updated_at";

const RECORD_PARAMS: usize = 11;

const ON_CONFLICT: &str = "ON CONFLICT (service, project, sku, time_period) DO UPDATE SET \
     cost = excluded.cost, currency = excluded.currency, \
     usage_amount = excluded.usage_amount, usage_unit = excluded.usage_unit, \
     updated_at = excluded.updated_at";

pub struct PostgresCostRecordRepo {
    pool: PgPool,
}

impl PostgresCostRecordRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn map_cost_record(row: &PgRow) -> DbResult<CostRecord> {
    Ok(CostRecord {
        id: row.try_get("id")?,
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

/// Build the WHERE clause and remember how many parameters it consumed.
fn where_clause(filter: &CostRecordFilter) -> (String, usize) {
    let mut clauses = Vec::new();
    let mut idx = 0usize;
    let mut next = |column: &str, op: &str| {
        idx += 1;
        format!("{column} {op} ${idx}")
    };
    if filter.service.is_some() {
        clauses.push(next("service", "="));
    }
    if filter.project.is_some() {
        clauses.push(next("project", "="));
    }
    if filter.sku.is_some() {
        clauses.push(next("sku", "="));
    }
    if filter.start_date.is_some() {
        clauses.push(next("time_period", ">="));
    }
    if filter.end_date.is_some() {
        clauses.push(next("time_period", "<="));
    }
    let sql = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    };
    (sql, idx)
}

fn bind_filter<'q>(
    mut query: sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>,
    filter: &'q CostRecordFilter,
) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
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
impl CostRecordRepo for PostgresCostRecordRepo {
    async fn upsert(&self, record: NewCostRecord) -> DbResult<CostRecord> {
        let now = Utc::now();
        let sql = format!(
            "INSERT INTO cost_records ({RECORD_COLS}) VALUES {} \
             {ON_CONFLICT} RETURNING {RECORD_COLS}",
            placeholder_tuple(1, RECORD_PARAMS)
        );

        let row = sqlx::query(&sql)
            .bind(Uuid::new_v4())
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

        // Stay well under the 65535 bound-parameter protocol limit.
        const MAX_ROWS_PER_STATEMENT: usize = 500;

        let now = Utc::now();
        let mut persisted = Vec::with_capacity(records.len());

        // One transaction for the whole batch: ingestion runs are
        // all-or-nothing.
        let mut tx = self.pool.begin().await?;

        for chunk in records.chunks(MAX_ROWS_PER_STATEMENT) {
            let placeholders: Vec<String> = (0..chunk.len())
                .map(|i| placeholder_tuple(i * RECORD_PARAMS + 1, RECORD_PARAMS))
                .collect();
            let sql = format!(
                "INSERT INTO cost_records ({RECORD_COLS}) VALUES {} \
                 {ON_CONFLICT} RETURNING {RECORD_COLS}",
                placeholders.join(", ")
            );

            let mut query = sqlx::query(&sql);
            for record in chunk {
                query = query
                    .bind(Uuid::new_v4())
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
        let sql = format!("SELECT {RECORD_COLS} FROM cost_records WHERE id = $1");
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        row.as_ref().map(map_cost_record).transpose()
    }

    async fn list(
        &self,
        filter: &CostRecordFilter,
        page: Page,
    ) -> DbResult<ListResult<CostRecord>> {
        let (where_sql, used) = where_clause(filter);

        let count_sql = format!("SELECT COUNT(*) FROM cost_records {where_sql}");
        let total: i64 = bind_filter(sqlx::query(&count_sql), filter)
            .fetch_one(&self.pool)
            .await?
            .try_get(0)?;

        let list_sql = format!(
            "SELECT {RECORD_COLS} FROM cost_records {where_sql} \
             ORDER BY time_period, project, service, sku \
             LIMIT ${} OFFSET ${}",
            used + 1,
            used + 2
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
        let (where_sql, _) = where_clause(filter);
        let sql = format!(
            "SELECT COALESCE(SUM(cost), 0)::double precision FROM cost_records {where_sql}"
        );
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
