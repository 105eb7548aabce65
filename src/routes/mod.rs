pub mod cost_records;
pub mod error;
pub mod health;
pub mod insights;
pub mod metrics;
pub mod warehouse;

use axum::{
    routing::{get, post},
    Router,
};

use crate::AppState;

/// All resource routes, mounted under `/api`.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/cost-records",
            post(cost_records::submit).get(cost_records::list),
        )
        .route("/cost-records/total", get(cost_records::total_cost))
        .route("/cost-records/dimensions", get(cost_records::dimensions))
        .route("/cost-records/{id}", get(cost_records::get_by_id))
        .route("/metrics/overview", get(metrics::overview))
        .route("/insights", post(insights::submit).get(insights::list))
        .route("/insights/generate", post(insights::generate))
        .route("/insights/{id}", get(insights::get_by_id))
        .route("/warehouse/datasets", get(warehouse::list_datasets))
        .route(
            "/warehouse/datasets/{dataset}/tables",
            get(warehouse::list_tables),
        )
        .route("/warehouse/ingest", post(warehouse::ingest))
}

#[cfg(all(test, feature = "database-sqlite"))]
pub mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::{body::Body, Router};
    use http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::{
        config::AppConfig,
        db::tests::harness::create_test_db,
        insight::{GenerationConfig, GenerationError, GenerativeClient},
        services::Services,
        warehouse::{DatasetPage, WarehouseClient, WarehouseError, WarehouseRow},
        AppState,
    };

    struct CannedWarehouse;

    #[async_trait]
    impl WarehouseClient for CannedWarehouse {
        async fn run_query(&self, _sql: &str) -> Result<Vec<WarehouseRow>, WarehouseError> {
            let row = json!({
                "service": "Compute Engine",
                "project": "proj-a",
                "sku": "sku-1",
                "time_period": "2024-01-05",
                "cost": "10.0",
                "currency": "USD",
                "usage_amount": null,
                "usage_unit": null,
            });
            Ok(vec![row.as_object().unwrap().clone()])
        }

        async fn list_datasets(
            &self,
            _page_size: Option<i64>,
            _page_token: Option<&str>,
        ) -> Result<DatasetPage, WarehouseError> {
            Ok(DatasetPage {
                ids: vec!["billing_export".to_string()],
                next_page_token: None,
            })
        }

        async fn list_tables(&self, _dataset: &str) -> Result<Vec<String>, WarehouseError> {
            Ok(vec!["gcp_billing_export_v1".to_string()])
        }

        async fn column_exists(
            &self,
            _dataset: &str,
            _table: &str,
            _column: &str,
        ) -> Result<bool, WarehouseError> {
            Ok(false)
        }
    }

    struct CannedGenerator;

    #[async_trait]
    impl GenerativeClient for CannedGenerator {
        async fn generate(
            &self,
            _prompt: &str,
            _config: &GenerationConfig,
        ) -> Result<String, GenerationError> {
            Ok("canned insight".to_string())
        }
    }

    /// Build a full application over in-memory SQLite with canned
    /// warehouse and generator backends.
    pub async fn test_app() -> Router {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();

        let config_str = r#"
[database]
type = "sqlite"
path = ":memory:"

[warehouse]
project = "my-project"

[insight]
api_key = "test-key"
"#;
        let config = AppConfig::from_str(config_str).expect("Failed to parse test config");
        let db = Arc::new(create_test_db().await);
        let services = Services::new(
            &config,
            Arc::clone(&db),
            Arc::new(CannedWarehouse),
            Arc::new(CannedGenerator),
        );
        let state = AppState {
            config: Arc::new(config.clone()),
            db,
            services,
        };
        crate::build_app(&config, state)
    }

    pub async fn get_json(app: &Router, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("GET")
            .uri(uri)
            .body(Body::empty())
            .unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
        (status, json)
    }

    pub async fn get_raw(app: &Router, uri: &str) -> (StatusCode, String) {
        let request = Request::builder()
            .method("GET")
            .uri(uri)
            .body(Body::empty())
            .unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8_lossy(&body).to_string())
    }

    pub async fn post_json(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: Value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }
}
