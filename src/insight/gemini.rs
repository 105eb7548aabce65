//! Google Generative Language (Gemini) client.
//!
//! Uses the simple API-key mode: the key rides along as a `?key=` query
//! parameter on `generateContent` requests.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{GenerationConfig, GenerationError, GenerativeClient};
use crate::config::InsightConfig;

pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url_override: Option<String>,
    timeout: Duration,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: &'a GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: Option<ApiErrorDetail>,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: Option<String>,
}

impl GeminiClient {
    pub fn from_config(config: &InsightConfig, http: reqwest::Client) -> Self {
        Self {
            http,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            base_url_override: config.base_url.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    fn generate_url(&self) -> String {
        let base = self
            .base_url_override
            .clone()
            .unwrap_or_else(|| "https://generativelanguage.googleapis.com/v1beta".to_string());
        format!(
            "{base}/models/{}:generateContent?key={}",
            self.model, self.api_key
        )
    }
}

#[async_trait]
impl GenerativeClient for GeminiClient {
    #[tracing::instrument(skip(self, prompt, config), fields(model = %self.model))]
    async fn generate(
        &self,
        prompt: &str,
        config: &GenerationConfig,
    ) -> Result<String, GenerationError> {
        let request = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![Part { text: prompt }],
            }],
            generation_config: config,
        };

        let response = self
            .http
            .post(self.generate_url())
            .json(&request)
            .timeout(self.timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorBody>(&body)
                .ok()
                .and_then(|b| b.error)
                .and_then(|e| e.message)
                .unwrap_or(body);
            let message = format!("{status}: {message}");
            return Err(match status.as_u16() {
                400 | 403 | 404 => GenerationError::Configuration(message),
                _ => GenerationError::Backend(message),
            });
        }

        let parsed: GenerateContentResponse = response.json().await?;
        let Some(first) = parsed.candidates.into_iter().next() else {
            return Err(GenerationError::NoCandidates);
        };

        let text = first
            .content
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::{
        matchers::{body_partial_json, method, path, query_param},
        Mock, MockServer, ResponseTemplate,
    };

    use super::*;

    fn test_client(server: &MockServer) -> GeminiClient {
        let config = InsightConfig {
            api_key: "test-key".to_string(),
            base_url: Some(server.uri()),
            ..InsightConfig::default()
        };
        GeminiClient::from_config(&config, reqwest::Client::new())
    }

    #[tokio::test]
    async fn generate_returns_first_candidate_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-2.5-flash:generateContent"))
            .and(query_param("key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{
                    "content": {"parts": [{"text": "Spend is "}, {"text": "stable."}]},
                    "finishReason": "STOP",
                }]
            })))
            .mount(&server)
            .await;

        let text = test_client(&server)
            .generate("analyze", &GenerationConfig::default())
            .await
            .unwrap();
        assert_eq!(text, "Spend is stable.");
    }

    #[tokio::test]
    async fn generate_sends_fixed_sampling_config() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({
                "generationConfig": {
                    "temperature": 0.2,
                    "topP": 0.8,
                    "topK": 40,
                    "maxOutputTokens": 1024,
                }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{"content": {"parts": [{"text": "ok"}]}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        test_client(&server)
            .generate("analyze", &GenerationConfig::default())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn zero_candidates_is_a_generation_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"candidates": []})))
            .mount(&server)
            .await;

        let err = test_client(&server)
            .generate("analyze", &GenerationConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::NoCandidates));
    }

    #[tokio::test]
    async fn bad_model_maps_to_configuration_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error": {"message": "model not found", "code": 404}
            })))
            .mount(&server)
            .await;

        let err = test_client(&server)
            .generate("analyze", &GenerationConfig::default())
            .await
            .unwrap_err();
        match err {
            GenerationError::Configuration(msg) => assert!(msg.contains("model not found")),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
