//! BigQuery REST v2 client.
//!
//! Supports two authentication modes:
//! - **OAuth/ADC**: service accounts or Application Default Credentials
//! - **Static token**: a pre-issued bearer token, used by tests
//!
//! Query execution uses `jobs.query` and, when the job does not finish
//! within the request window or the result spans pages, follows up with
//! `jobs.getQueryResults`.

use std::{path::Path, sync::Arc, time::Duration};

use async_trait::async_trait;
use google_cloud_token::TokenSourceProvider;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;

use super::{query, DatasetPage, WarehouseClient, WarehouseError, WarehouseRow};
use crate::config::{GcpCredentials, WarehouseConfig};

const BIGQUERY_SCOPE: &str = "https://www.googleapis.com/auth/bigquery.readonly";

/// Buffer time before token expiry to trigger refresh (5 minutes).
const TOKEN_REFRESH_BUFFER_SECS: u64 = 300;

/// Default token cache duration (1 hour).
/// Most Google OAuth tokens have a 1-hour lifetime.
const TOKEN_CACHE_DURATION_SECS: u64 = 3600;

/// Server-side wait for query completion before the response returns with
/// `jobComplete: false`.
const QUERY_TIMEOUT_MS: u64 = 30_000;

const MAX_RESULTS_PER_PAGE: u64 = 10_000;

/// Upper bound on `getQueryResults` polls while a job reports incomplete.
/// Each poll waits up to [`QUERY_TIMEOUT_MS`] server-side, so this caps a
/// stuck job at roughly ten minutes before the query errors out.
const MAX_INCOMPLETE_POLLS: u32 = 20;

pub struct BigQueryClient {
    http: reqwest::Client,
    project: String,
    credentials: GcpCredentials,
    base_url_override: Option<String>,
    token_cache: Arc<RwLock<Option<CachedToken>>>,
    timeout: Duration,
}

struct CachedToken {
    token: String,
    expires_at: std::time::Instant,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    query: &'a str,
    use_legacy_sql: bool,
    timeout_ms: u64,
    max_results: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    schema: Option<TableSchema>,
    rows: Option<Vec<TableRow>>,
    job_complete: Option<bool>,
    job_reference: Option<JobReference>,
    page_token: Option<String>,
}

#[derive(Deserialize)]
struct TableSchema {
    fields: Vec<TableFieldSchema>,
}

#[derive(Deserialize)]
struct TableFieldSchema {
    name: String,
}

#[derive(Deserialize)]
struct TableRow {
    #[serde(default)]
    f: Vec<TableCell>,
}

#[derive(Deserialize)]
struct TableCell {
    #[serde(default)]
    v: Value,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    job_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DatasetListResponse {
    #[serde(default)]
    datasets: Vec<DatasetEntry>,
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DatasetEntry {
    dataset_reference: DatasetReference,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DatasetReference {
    dataset_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TableListResponse {
    #[serde(default)]
    tables: Vec<TableEntry>,
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TableEntry {
    table_reference: TableReference,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TableReference {
    table_id: String,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: Option<ApiErrorDetail>,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: Option<String>,
}

impl BigQueryClient {
    pub fn from_config(config: &WarehouseConfig, http: reqwest::Client) -> Self {
        Self {
            http,
            project: config.project.clone(),
            credentials: config.credentials.clone(),
            base_url_override: config.base_url.clone(),
            token_cache: Arc::new(RwLock::new(None)),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    fn base_url(&self) -> String {
        self.base_url_override
            .clone()
            .unwrap_or_else(|| "https://bigquery.googleapis.com/bigquery/v2".to_string())
    }

    fn project_url(&self, suffix: &str) -> String {
        format!("{}/projects/{}/{suffix}", self.base_url(), self.project)
    }

    /// Get an access token, refreshing the cache if necessary.
    async fn get_token(&self) -> Result<String, WarehouseError> {
        if let GcpCredentials::StaticToken { token } = &self.credentials {
            return Ok(token.clone());
        }

        {
            let cache = self.token_cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.expires_at
                    > std::time::Instant::now() + Duration::from_secs(TOKEN_REFRESH_BUFFER_SECS)
                {
                    return Ok(cached.token.clone());
                }
            }
        }

        let token = match &self.credentials {
            GcpCredentials::StaticToken { .. } => unreachable!("handled above"),
            GcpCredentials::Default => {
                let config =
                    google_cloud_auth::project::Config::default().with_scopes(&[BIGQUERY_SCOPE]);
                let ts = google_cloud_auth::token::DefaultTokenSourceProvider::new(config)
                    .await
                    .map_err(|e| {
                        WarehouseError::Auth(format!("Failed to create token source: {e}"))
                    })?;
                ts.token_source()
                    .token()
                    .await
                    .map_err(|e| WarehouseError::Auth(format!("Failed to get token: {e}")))?
            }
            GcpCredentials::ServiceAccount { key_path } => {
                self.token_from_service_account_file(Path::new(key_path))
                    .await?
            }
            GcpCredentials::ServiceAccountJson { json } => {
                self.token_from_service_account_json(json).await?
            }
        };

        {
            let mut cache = self.token_cache.write().await;
            *cache = Some(CachedToken {
                token: token.clone(),
                expires_at: std::time::Instant::now()
                    + Duration::from_secs(TOKEN_CACHE_DURATION_SECS),
            });
        }

        Ok(token)
    }

    async fn token_from_service_account_file(
        &self,
        key_path: &Path,
    ) -> Result<String, WarehouseError> {
        let key_json = tokio::fs::read_to_string(key_path).await.map_err(|e| {
            WarehouseError::Auth(format!(
                "Failed to read service account key file '{}': {e}",
                key_path.display()
            ))
        })?;
        self.token_from_service_account_json(&key_json).await
    }

    async fn token_from_service_account_json(&self, json: &str) -> Result<String, WarehouseError> {
        use google_cloud_auth::credentials::CredentialsFile;

        let creds: CredentialsFile = serde_json::from_str(json).map_err(|e| {
            WarehouseError::Auth(format!("Failed to parse service account JSON: {e}"))
        })?;
        let config = google_cloud_auth::project::Config::default().with_scopes(&[BIGQUERY_SCOPE]);
        let ts = google_cloud_auth::token::DefaultTokenSourceProvider::new_with_credentials(
            config,
            Box::new(creds),
        )
        .await
        .map_err(|e| {
            WarehouseError::Auth(format!(
                "Failed to create token source from service account: {e}"
            ))
        })?;
        ts.token_source()
            .token()
            .await
            .map_err(|e| WarehouseError::Auth(format!("Failed to get token: {e}")))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        query_params: &[(&str, String)],
    ) -> Result<T, WarehouseError> {
        let token = self.get_token().await?;
        let response = self
            .http
            .get(url)
            .query(query_params)
            .bearer_auth(token)
            .timeout(self.timeout)
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn decode<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, WarehouseError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ApiErrorBody>(&body)
            .ok()
            .and_then(|b| b.error)
            .and_then(|e| e.message)
            .unwrap_or(body);
        let message = format!("{status}: {message}");

        Err(match status.as_u16() {
            400 | 403 | 404 => WarehouseError::Configuration(message),
            401 => WarehouseError::Auth(message),
            _ => WarehouseError::Query(message),
        })
    }

    fn append_rows(
        schema: &TableSchema,
        rows: Vec<TableRow>,
        out: &mut Vec<WarehouseRow>,
    ) -> Result<(), WarehouseError> {
        for row in rows {
            if row.f.len() != schema.fields.len() {
                return Err(WarehouseError::MalformedResponse(format!(
                    "row has {} cells but schema has {} fields",
                    row.f.len(),
                    schema.fields.len()
                )));
            }
            let mut decoded = WarehouseRow::new();
            for (field, cell) in schema.fields.iter().zip(row.f) {
                decoded.insert(field.name.clone(), cell.v);
            }
            out.push(decoded);
        }
        Ok(())
    }
}

#[async_trait]
impl WarehouseClient for BigQueryClient {
    #[tracing::instrument(skip(self, sql), fields(project = %self.project))]
    async fn run_query(&self, sql: &str) -> Result<Vec<WarehouseRow>, WarehouseError> {
        let token = self.get_token().await?;
        let request = QueryRequest {
            query: sql,
            use_legacy_sql: false,
            timeout_ms: QUERY_TIMEOUT_MS,
            max_results: MAX_RESULTS_PER_PAGE,
        };
        let response = self
            .http
            .post(self.project_url("queries"))
            .bearer_auth(token)
            .json(&request)
            .timeout(self.timeout)
            .send()
            .await?;
        let mut page: QueryResponse = Self::decode(response).await?;

        let job_id = page
            .job_reference
            .as_ref()
            .and_then(|j| j.job_id.clone());

        let mut rows = Vec::new();
        let mut schema = page.schema.take();
        let mut complete = page.job_complete.unwrap_or(false);
        if complete {
            if let (Some(schema), Some(batch)) = (schema.as_ref(), page.rows.take()) {
                Self::append_rows(schema, batch, &mut rows)?;
            }
        }
        let mut page_token = page.page_token.take();

        // Incomplete jobs and paged results both continue through
        // getQueryResults until the job finishes and pages run out.
        let mut incomplete_polls = 0u32;
        while !complete || page_token.is_some() {
            let job_id = job_id.as_deref().ok_or_else(|| {
                WarehouseError::MalformedResponse(
                    "query response carried no job reference".to_string(),
                )
            })?;

            let mut params = vec![("timeoutMs", QUERY_TIMEOUT_MS.to_string())];
            if let Some(token) = &page_token {
                params.push(("pageToken", token.clone()));
            }
            let url = self.project_url(&format!("queries/{job_id}"));
            let mut next: QueryResponse = self.get_json(&url, &params).await?;

            complete = next.job_complete.unwrap_or(false);
            if !complete {
                incomplete_polls += 1;
                if incomplete_polls >= MAX_INCOMPLETE_POLLS {
                    return Err(WarehouseError::Query(format!(
                        "query job {job_id} still incomplete after {MAX_INCOMPLETE_POLLS} polls"
                    )));
                }
                continue;
            }
            if schema.is_none() {
                schema = next.schema.take();
            }
            if let (Some(schema), Some(batch)) = (schema.as_ref(), next.rows.take()) {
                Self::append_rows(schema, batch, &mut rows)?;
            }
            page_token = next.page_token.take();
        }

        tracing::debug!(rows = rows.len(), "query returned");
        Ok(rows)
    }

    async fn list_datasets(
        &self,
        page_size: Option<i64>,
        page_token: Option<&str>,
    ) -> Result<DatasetPage, WarehouseError> {
        let mut params = Vec::new();
        if let Some(size) = page_size {
            params.push(("maxResults", size.to_string()));
        }
        if let Some(token) = page_token {
            params.push(("pageToken", token.to_string()));
        }

        let response: DatasetListResponse = self
            .get_json(&self.project_url("datasets"), &params)
            .await?;
        Ok(DatasetPage {
            ids: response
                .datasets
                .into_iter()
                .map(|d| d.dataset_reference.dataset_id)
                .collect(),
            next_page_token: response.next_page_token,
        })
    }

    async fn list_tables(&self, dataset: &str) -> Result<Vec<String>, WarehouseError> {
        let url = self.project_url(&format!("datasets/{dataset}/tables"));
        let mut tables = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut params = Vec::new();
            if let Some(token) = &page_token {
                params.push(("pageToken", token.clone()));
            }
            let response: TableListResponse = self.get_json(&url, &params).await?;
            tables.extend(
                response
                    .tables
                    .into_iter()
                    .map(|t| t.table_reference.table_id),
            );
            page_token = response.next_page_token;
            if page_token.is_none() {
                return Ok(tables);
            }
        }
    }

    async fn column_exists(
        &self,
        dataset: &str,
        table: &str,
        column: &str,
    ) -> Result<bool, WarehouseError> {
        let sql = query::column_probe_sql(&self.project, dataset, table, column)?;
        let rows = self.run_query(&sql).await?;
        let value = rows
            .first()
            .and_then(|row| row.get("column_present"))
            .ok_or_else(|| {
                WarehouseError::MalformedResponse(
                    "column probe returned no result row".to_string(),
                )
            })?;
        match value {
            Value::Bool(b) => Ok(*b),
            Value::String(s) => Ok(s.eq_ignore_ascii_case("true")),
            other => Err(WarehouseError::MalformedResponse(format!(
                "column probe returned non-boolean value: {other}"
            ))),
        }
    }
}
