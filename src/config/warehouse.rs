use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Billing warehouse (BigQuery) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WarehouseConfig {
    /// GCP project holding the billing export.
    pub project: String,

    /// Dataset containing the billing export table.
    #[serde(default = "default_dataset")]
    pub dataset: String,

    /// Billing export table.
    #[serde(default = "default_table")]
    pub table: String,

    /// Credentials for warehouse access.
    #[serde(default)]
    pub credentials: GcpCredentials,

    /// Override the API base URL. Used for testing against mock servers.
    #[serde(default)]
    pub base_url: Option<String>,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl WarehouseConfig {
    /// Minimal configuration for a project, defaults everywhere else.
    pub fn for_project(project: &str) -> Self {
        Self {
            project: project.to_string(),
            dataset: default_dataset(),
            table: default_table(),
            credentials: GcpCredentials::default(),
            base_url: None,
            timeout_secs: default_timeout(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.project.is_empty() {
            return Err(ConfigError::Validation(
                "warehouse.project cannot be empty".into(),
            ));
        }
        Ok(())
    }
}

/// GCP credentials configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[serde(deny_unknown_fields)]
pub enum GcpCredentials {
    /// Use Application Default Credentials.
    #[default]
    Default,

    /// Service account key file path.
    ServiceAccount { key_path: String },

    /// Service account key as inline JSON.
    ServiceAccountJson { json: String },

    /// A pre-issued bearer token. No refresh; intended for tests.
    StaticToken { token: String },
}

fn default_dataset() -> String {
    "billing_export".to_string()
}

fn default_table() -> String {
    "gcp_billing_export_v1".to_string()
}

fn default_timeout() -> u64 {
    60
}
