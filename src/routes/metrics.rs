//! Derived spend metric endpoints.

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;

use super::error::ApiError;
use crate::{services::SpendOverview, AppState};

#[derive(Debug, Deserialize)]
pub struct OverviewQuery {
    pub project: Option<String>,
}

#[tracing::instrument(name = "metrics.overview", skip(state))]
pub async fn overview(
    State(state): State<AppState>,
    Query(query): Query<OverviewQuery>,
) -> Result<Json<SpendOverview>, ApiError> {
    let overview = state.services.metrics.overview(query.project).await?;
    Ok(Json(overview))
}
