use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Generative insight backend (Gemini) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InsightConfig {
    /// Google Generative Language API key.
    pub api_key: String,

    /// Model to use for insight generation.
    #[serde(default = "default_model")]
    pub model: String,

    /// Override the API base URL. Used for testing against mock servers.
    #[serde(default)]
    pub base_url: Option<String>,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Character budget for serialized record data in prompts.
    #[serde(default = "default_prompt_budget")]
    pub prompt_budget_chars: usize,
}

impl Default for InsightConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: default_model(),
            base_url: None,
            timeout_secs: default_timeout(),
            prompt_budget_chars: default_prompt_budget(),
        }
    }
}

impl InsightConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_key.is_empty() {
            return Err(ConfigError::Validation(
                "insight.api_key cannot be empty".into(),
            ));
        }
        Ok(())
    }
}

fn default_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_timeout() -> u64 {
    60
}

fn default_prompt_budget() -> usize {
    8000
}
