//! Cost record endpoints: manual submission, listing, aggregates.

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
    models::{CostRecord, CostRecordFilter, NewCostRecord},
    AppState,
};

/// Hard ceiling on page size regardless of what the client asks for.
const MAX_PAGE_LIMIT: i64 = 1000;

#[derive(Debug, Deserialize)]
pub struct CostRecordQuery {
    #[serde(default)]
    pub skip: i64,
    pub limit: Option<i64>,
    pub service: Option<String>,
    pub project: Option<String>,
    pub sku: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl CostRecordQuery {
    fn filter(&self) -> CostRecordFilter {
        CostRecordFilter {
            service: self.service.clone(),
            project: self.project.clone(),
            sku: self.sku.clone(),
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

#[tracing::instrument(name = "cost_records.submit", skip(state, record))]
pub async fn submit(
    State(state): State<AppState>,
    Json(record): Json<NewCostRecord>,
) -> Result<impl IntoResponse, ApiError> {
    let created = state.services.cost_records.submit(record).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

#[tracing::instrument(name = "cost_records.list", skip(state))]
pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<CostRecordQuery>,
) -> Result<Json<ListResult<CostRecord>>, ApiError> {
    let result = state
        .services
        .cost_records
        .list(&query.filter(), query.page())
        .await?;
    Ok(Json(result))
}

#[tracing::instrument(name = "cost_records.get", skip(state))]
pub async fn get_by_id(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<CostRecord>, ApiError> {
    state
        .services
        .cost_records
        .get(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Cost record {id} not found")))
}

#[tracing::instrument(name = "cost_records.total", skip(state))]
pub async fn total_cost(
    State(state): State<AppState>,
    Query(query): Query<CostRecordQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let total = state
        .services
        .cost_records
        .total_cost(&query.filter())
        .await?;
    Ok(Json(serde_json::json!({ "total_cost": total })))
}

#[tracing::instrument(name = "cost_records.dimensions", skip(state))]
pub async fn dimensions(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let dims = state.services.cost_records.dimensions().await?;
    Ok(Json(dims))
}

#[cfg(all(test, feature = "database-sqlite"))]
mod tests {
    use http::StatusCode;
    use serde_json::json;

    use crate::routes::tests::{get_json, post_json, test_app};

    fn record(sku: &str, cost: f64) -> serde_json::Value {
        json!({
            "service": "Compute Engine",
            "project": "proj-a",
            "sku": sku,
            "time_period": "2024-01-05T00:00:00Z",
            "cost": cost,
        })
    }

    #[tokio::test]
    async fn submit_then_read_back() {
        let app = test_app().await;

        let (status, created) = post_json(&app, "/api/cost-records", record("sku-1", 12.5)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["currency"], "USD");

        let id = created["id"].as_str().unwrap();
        let (status, fetched) = get_json(&app, &format!("/api/cost-records/{id}")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched["cost"], 12.5);
    }

    #[tokio::test]
    async fn list_filters_by_project() {
        let app = test_app().await;
        post_json(&app, "/api/cost-records", record("sku-1", 1.0)).await;

        let (status, body) = get_json(&app, "/api/cost-records?project=proj-a").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 1);

        let (_, empty) = get_json(&app, "/api/cost-records?project=proj-z").await;
        assert_eq!(empty["total"], 0);
    }

    #[tokio::test]
    async fn invalid_record_is_a_validation_error() {
        let app = test_app().await;
        let (status, body) = post_json(
            &app,
            "/api/cost-records",
            json!({
                "service": "",
                "project": "proj-a",
                "sku": "sku-1",
                "time_period": "2024-01-05T00:00:00Z",
                "cost": 1.0,
            }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "validation_error");
    }

    #[tokio::test]
    async fn unknown_id_is_not_found() {
        let app = test_app().await;
        let (status, body) = get_json(
            &app,
            "/api/cost-records/00000000-0000-0000-0000-000000000000",
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "not_found");
    }

    #[tokio::test]
    async fn total_and_dimensions_aggregate_the_store() {
        let app = test_app().await;
        post_json(&app, "/api/cost-records", record("sku-1", 10.0)).await;
        post_json(&app, "/api/cost-records", record("sku-2", 5.0)).await;

        let (_, total) = get_json(&app, "/api/cost-records/total").await;
        assert_eq!(total["total_cost"], 15.0);

        let (_, dims) = get_json(&app, "/api/cost-records/dimensions").await;
        assert_eq!(dims["projects"], json!(["proj-a"]));
        assert_eq!(dims["skus"].as_array().unwrap().len(), 2);
    }
}
