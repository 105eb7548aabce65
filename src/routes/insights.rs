//! Insight endpoints: generation, manual submission, listing.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::NaiveDate;
use serde::Deserialize;
use uuid::Uuid;

use super::error::ApiError;
use crate::{
    db::{ListResult, Page},
    models::{InsightFilter, InsightKind, InsightRecord, NewInsight},
    services::InsightRequest,
    AppState,
};

const MAX_PAGE_LIMIT: i64 = 1000;

/// Body for the generation endpoint. `insight_type` accepts any string;
/// unrecognized kinds fall through to the generic prompt.
#[derive(Debug, Deserialize)]
pub struct GenerateBody {
    pub insight_type: InsightKind,
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct InsightQuery {
    #[serde(default)]
    pub skip: i64,
    pub limit: Option<i64>,
    pub insight_type: Option<InsightKind>,
    pub related_cost_record_id: Option<Uuid>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl InsightQuery {
    fn filter(&self) -> InsightFilter {
        InsightFilter {
            insight_type: self.insight_type.clone(),
            related_cost_record_id: self.related_cost_record_id,
            start_date: self
                .start_date
                .map(|d| d.and_hms_opt(0, 0, 0).expect("midnight is valid").and_utc()),
            end_date: self
                .end_date
                .map(|d| d.and_hms_opt(23, 59, 59).expect("valid time").and_utc()),
        }
    }

    fn page(&self) -> Page {
        Page {
            skip: self.skip.max(0),
            limit: self
                .limit
                .unwrap_or(Page::default().limit)
                .clamp(1, MAX_PAGE_LIMIT),
        }
    }
}

#[tracing::instrument(name = "insights.generate", skip(state, body), fields(insight_type = %body.insight_type))]
pub async fn generate(
    State(state): State<AppState>,
    Json(body): Json<GenerateBody>,
) -> Result<impl IntoResponse, ApiError> {
    let insight = state
        .services
        .insights
        .generate(InsightRequest {
            insight_type: body.insight_type,
            query: body.query,
            project: body.project,
            start_date: body.start_date,
            end_date: body.end_date,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(insight)))
}

#[tracing::instrument(name = "insights.submit", skip(state, insight))]
pub async fn submit(
    State(state): State<AppState>,
    Json(insight): Json<NewInsight>,
) -> Result<impl IntoResponse, ApiError> {
    let created = state.services.insights.submit(insight).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

#[tracing::instrument(name = "insights.list", skip(state))]
pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<InsightQuery>,
) -> Result<Json<ListResult<InsightRecord>>, ApiError> {
    let result = state
        .services
        .insights
        .list(&query.filter(), query.page())
        .await?;
    Ok(Json(result))
}

#[tracing::instrument(name = "insights.get", skip(state))]
pub async fn get_by_id(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<InsightRecord>, ApiError> {
    state
        .services
        .insights
        .get(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Insight {id} not found")))
}
