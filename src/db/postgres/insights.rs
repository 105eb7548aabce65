use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    db::{
        error::DbResult,
        repos::{InsightRepo, ListResult, Page},
    },
    models::{InsightFilter, InsightKind, InsightRecord, NewInsight},
};

const INSIGHT_COLS: &str = "id, insight_type, insight_text, related_cost_record_id, \
     sentiment, generated_at, created_at, updated_at";

pub struct PostgresInsightRepo {
    pool: PgPool,
}

impl PostgresInsightRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn map_insight(row: &PgRow) -> DbResult<InsightRecord> {
    let insight_type: String = row.try_get("insight_type")?;
    Ok(InsightRecord {
        id: row.try_get("id")?,
        insight_type: InsightKind::from(insight_type),
        insight_text: row.try_get("insight_text")?,
        related_cost_record_id: row.try_get("related_cost_record_id")?,
        sentiment: row.try_get("sentiment")?,
        generated_at: row.try_get("generated_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn bind_filter<'q>(
    mut query: sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>,
    filter: &'q InsightFilter,
) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
    if let Some(kind) = &filter.insight_type {
        query = query.bind(kind.as_str().to_string());
    }
    if let Some(related) = &filter.related_cost_record_id {
        query = query.bind(*related);
    }
    if let Some(start) = &filter.start_date {
        query = query.bind(*start);
    }
    if let Some(end) = &filter.end_date {
        query = query.bind(*end);
    }
    query
}

#[async_trait]
impl InsightRepo for PostgresInsightRepo {
    async fn create(&self, insight: NewInsight) -> DbResult<InsightRecord> {
        let now = Utc::now();
        let generated_at = insight.generated_at.unwrap_or(now);
        let sql = format!(
            "INSERT INTO insights ({INSIGHT_COLS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING {INSIGHT_COLS}"
        );

        let row = sqlx::query(&sql)
            .bind(Uuid::new_v4())
            .bind(insight.insight_type.as_str())
            .bind(&insight.insight_text)
            .bind(insight.related_cost_record_id)
            .bind(&insight.sentiment)
            .bind(generated_at)
            .bind(now)
            .bind(now)
            .fetch_one(&self.pool)
            .await?;

        map_insight(&row)
    }

    async fn get_by_id(&self, id: Uuid) -> DbResult<Option<InsightRecord>> {
        let sql = format!("SELECT {INSIGHT_COLS} FROM insights WHERE id = $1");
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        row.as_ref().map(map_insight).transpose()
    }

    async fn list(
        &self,
        filter: &InsightFilter,
        page: Page,
    ) -> DbResult<ListResult<InsightRecord>> {
        let mut clauses = Vec::new();
        let mut idx = 0usize;
        let mut next = |column: &str, op: &str| {
            idx += 1;
            format!("{column} {op} ${idx}")
        };
        if filter.insight_type.is_some() {
            clauses.push(next("insight_type", "="));
        }
        if filter.related_cost_record_id.is_some() {
            clauses.push(next("related_cost_record_id", "="));
        }
        if filter.start_date.is_some() {
            clauses.push(next("generated_at", ">="));
        }
        if filter.end_date.is_some() {
            clauses.push(next("generated_at", "<="));
        }
        let where_sql = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };
        let used = idx;

        let count_sql = format!("SELECT COUNT(*) FROM insights {where_sql}");
        let total: i64 = bind_filter(sqlx::query(&count_sql), filter)
            .fetch_one(&self.pool)
            .await?
            .try_get(0)?;

        let list_sql = format!(
            "SELECT {INSIGHT_COLS} FROM insights {where_sql} \
             ORDER BY generated_at DESC LIMIT ${} OFFSET ${}",
            used + 1,
            used + 2
        );
        let rows = bind_filter(sqlx::query(&list_sql), filter)
            .bind(page.limit)
            .bind(page.skip)
            .fetch_all(&self.pool)
            .await?;

        let items = rows.iter().map(map_insight).collect::<DbResult<Vec<_>>>()?;
        Ok(ListResult { items, total })
    }
}
