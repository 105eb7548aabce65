use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};
use uuid::Uuid;

use crate::{
    db::{
        error::{DbError, DbResult},
        repos::{InsightRepo, ListResult, Page},
    },
    models::{InsightFilter, InsightKind, InsightRecord, NewInsight},
};

const INSIGHT_COLS: &str = "id, insight_type, insight_text, related_cost_record_id, \
     sentiment, generated_at, created_at, updated_at";

pub struct SqliteInsightRepo {
    pool: SqlitePool,
}

impl SqliteInsightRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn map_insight(row: &SqliteRow) -> DbResult<InsightRecord> {
    let id: String = row.try_get("id")?;
    let id = Uuid::parse_str(&id)
        .map_err(|e| DbError::Internal(format!("invalid uuid in insights.id: {e}")))?;
    let related: Option<String> = row.try_get("related_cost_record_id")?;
    let related = related
        .map(|s| Uuid::parse_str(&s))
        .transpose()
        .map_err(|e| {
            DbError::Internal(format!("invalid uuid in insights.related_cost_record_id: {e}"))
        })?;
    let insight_type: String = row.try_get("insight_type")?;

    Ok(InsightRecord {
        id,
        insight_type: InsightKind::from(insight_type),
        insight_text: row.try_get("insight_text")?,
        related_cost_record_id: related,
        sentiment: row.try_get("sentiment")?,
        generated_at: row.try_get("generated_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn bind_filter<'q>(
    mut query: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    filter: &'q InsightFilter,
) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
    if let Some(kind) = &filter.insight_type {
        query = query.bind(kind.as_str().to_string());
    }
    if let Some(related) = &filter.related_cost_record_id {
        query = query.bind(related.to_string());
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
impl InsightRepo for SqliteInsightRepo {
    async fn create(&self, insight: NewInsight) -> DbResult<InsightRecord> {
        let now = Utc::now();
        let generated_at = insight.generated_at.unwrap_or(now);
        let sql = format!(
            "INSERT INTO insights ({INSIGHT_COLS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?) \
             RETURNING {INSIGHT_COLS}"
        );

        let row = sqlx::query(&sql)
            .bind(Uuid::new_v4().to_string())
            .bind(insight.insight_type.as_str())
            .bind(&insight.insight_text)
            .bind(insight.related_cost_record_id.map(|id| id.to_string()))
            .bind(&insight.sentiment)
            .bind(generated_at)
            .bind(now)
            .bind(now)
            .fetch_one(&self.pool)
            .await?;

        map_insight(&row)
    }

    async fn get_by_id(&self, id: Uuid) -> DbResult<Option<InsightRecord>> {
        let sql = format!("SELECT {INSIGHT_COLS} FROM insights WHERE id = ?");
        let row = sqlx::query(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(map_insight).transpose()
    }

    async fn list(
        &self,
        filter: &InsightFilter,
        page: Page,
    ) -> DbResult<ListResult<InsightRecord>> {
        let mut clauses: Vec<&str> = Vec::new();
        if filter.insight_type.is_some() {
            clauses.push("insight_type = ?");
        }
        if filter.related_cost_record_id.is_some() {
            clauses.push("related_cost_record_id = ?");
        }
        if filter.start_date.is_some() {
            clauses.push("generated_at >= ?");
        }
        if filter.end_date.is_some() {
            clauses.push("generated_at <= ?");
        }
        let where_sql = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };

        let count_sql = format!("SELECT COUNT(*) FROM insights {where_sql}");
        let total: i64 = bind_filter(sqlx::query(&count_sql), filter)
            .fetch_one(&self.pool)
            .await?
            .try_get(0)?;

        let list_sql = format!(
            "SELECT {INSIGHT_COLS} FROM insights {where_sql} \
             ORDER BY generated_at DESC LIMIT ? OFFSET ?"
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
