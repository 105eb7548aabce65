//! Warehouse endpoints: export discovery and ingestion runs.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::NaiveDate;
use serde::Deserialize;

use super::error::ApiError;
use crate::{
    services::{IngestReport, IngestRequest},
    warehouse::DatasetPage,
    AppState,
};

#[derive(Debug, Deserialize)]
pub struct DatasetQuery {
    pub page_size: Option<i64>,
    pub page_token: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct IngestBody {
    #[serde(default)]
    pub dataset: Option<String>,
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
}

#[tracing::instrument(name = "warehouse.datasets", skip(state))]
pub async fn list_datasets(
    State(state): State<AppState>,
    Query(query): Query<DatasetQuery>,
) -> Result<Json<DatasetPage>, ApiError> {
    let page = state
        .services
        .ingestion
        .list_datasets(query.page_size, query.page_token.as_deref())
        .await?;
    Ok(Json(page))
}

#[tracing::instrument(name = "warehouse.tables", skip(state))]
pub async fn list_tables(
    State(state): State<AppState>,
    Path(dataset): Path<String>,
) -> Result<Json<Vec<String>>, ApiError> {
    let tables = state.services.ingestion.list_tables(&dataset).await?;
    Ok(Json(tables))
}

#[tracing::instrument(name = "warehouse.ingest", skip(state))]
pub async fn ingest(
    State(state): State<AppState>,
    Json(body): Json<IngestBody>,
) -> Result<Json<IngestReport>, ApiError> {
    let report = state
        .services
        .ingestion
        .ingest(IngestRequest {
            dataset: body.dataset,
            table: body.table,
            start_date: body.start_date,
            end_date: body.end_date,
        })
        .await?;
    Ok(Json(report))
}

#[cfg(all(test, feature = "database-sqlite"))]
mod tests {
    use http::StatusCode;
    use serde_json::json;

    use crate::routes::tests::{get_json, post_json, test_app};

    #[tokio::test]
    async fn discovery_lists_datasets_and_tables() {
        let app = test_app().await;

        let (status, datasets) = get_json(&app, "/api/warehouse/datasets").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(datasets["ids"], json!(["billing_export"]));

        let (status, tables) =
            get_json(&app, "/api/warehouse/datasets/billing_export/tables").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(tables, json!(["gcp_billing_export_v1"]));
    }

    #[tokio::test]
    async fn ingest_reports_fetched_and_persisted_counts() {
        let app = test_app().await;

        let (status, report) = post_json(&app, "/api/warehouse/ingest", json!({})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(report["dataset"], "billing_export");
        assert_eq!(report["rows_fetched"], 1);
        assert_eq!(report["records_persisted"], 1);

        let (_, records) = get_json(&app, "/api/cost-records").await;
        assert_eq!(records["total"], 1);
    }

    #[tokio::test]
    async fn bad_identifiers_are_a_configuration_error() {
        let app = test_app().await;

        let (status, body) = post_json(
            &app,
            "/api/warehouse/ingest",
            json!({ "table": "billing; DROP TABLE x" }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "configuration_error");
    }
}
