//! Insight generation: prompt construction and the Gemini REST client.

mod gemini;
pub mod prompt;

use async_trait::async_trait;
pub use gemini::GeminiClient;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Sampling configuration sent with every generation request.
///
/// The defaults favor focused, reproducible analysis text over creative
/// variety.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub temperature: f64,
    pub top_p: f64,
    pub top_k: u32,
    pub max_output_tokens: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            top_p: 0.8,
            top_k: 40,
            max_output_tokens: 1024,
        }
    }
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Generation configuration error: {0}")]
    Configuration(String),

    /// The backend answered but produced no candidates. Not retried here;
    /// retry policy belongs to the caller.
    #[error("Generative backend returned no response candidates")]
    NoCandidates,

    #[error("Generative backend request failed: {0}")]
    Backend(String),

    #[error("Generative backend transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Stateless handle to a generative-text backend. Shared as a singleton
/// across requests.
#[async_trait]
pub trait GenerativeClient: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        config: &GenerationConfig,
    ) -> Result<String, GenerationError>;
}
