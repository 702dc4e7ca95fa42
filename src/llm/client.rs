//! Gemini text-generation client.
//!
//! The detection layer talks to the `TextGenerator` trait, never to this
//! client directly, so tests can substitute canned responses and the
//! pipeline can degrade cleanly when no API key is present.

use crate::config::LlmConfig;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::warn;

/// Failure modes of the text-generation layer. All of them are survivable:
/// the caller degrades to zero LLM findings and keeps the pipeline running.
#[derive(Debug, thiserror::Error)]
pub enum LlmFailure {
    #[error("LLM not configured: environment variable {0} is not set")]
    NotConfigured(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("API returned status {code}: {body}")]
    Status { code: u16, body: String },

    #[error("API returned an empty response")]
    EmptyResponse,

    #[error("retries exhausted after {0} attempts")]
    RetriesExhausted(u32),
}

/// Anything that can turn a prompt into generated text
pub trait TextGenerator {
    fn generate(
        &self,
        prompt: &str,
    ) -> impl std::future::Future<Output = Result<String, LlmFailure>> + Send;
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

/// Client for the Gemini generateContent API
pub struct GeminiClient {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
    max_retries: u32,
}

impl GeminiClient {
    /// Build a client from configuration. Fails with `NotConfigured` when
    /// the API key environment variable is absent or empty.
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmFailure> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| LlmFailure::NotConfigured(config.api_key_env.clone()))?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LlmFailure::Transport(e.to_string()))?;

        Ok(Self {
            http,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
            max_retries: config.max_retries,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.endpoint, self.model, self.api_key
        )
    }

    async fn attempt(&self, prompt: &str) -> Result<String, LlmFailure> {
        let payload = json!({
            "contents": [{
                "parts": [{ "text": prompt }]
            }]
        });

        let response = self
            .http
            .post(self.url())
            .json(&payload)
            .send()
            .await
            .map_err(|e| LlmFailure::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmFailure::Status {
                code: status.as_u16(),
                body,
            });
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| LlmFailure::Transport(e.to_string()))?;

        let text: String = parsed
            .candidates
            .first()
            .map(|c| {
                c.content
                    .parts
                    .iter()
                    .map(|p| p.text.as_str())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(LlmFailure::EmptyResponse);
        }
        Ok(text)
    }

    fn retryable(failure: &LlmFailure) -> bool {
        match failure {
            LlmFailure::Transport(_) | LlmFailure::EmptyResponse => true,
            LlmFailure::Status { code, .. } => *code == 429 || *code >= 500,
            _ => false,
        }
    }
}

impl TextGenerator for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<String, LlmFailure> {
        for attempt in 0..self.max_retries {
            match self.attempt(prompt).await {
                Ok(text) => return Ok(text),
                Err(failure) if Self::retryable(&failure) => {
                    let backoff = Duration::from_secs(1 << attempt);
                    warn!(
                        attempt = attempt + 1,
                        max = self.max_retries,
                        backoff_secs = backoff.as_secs(),
                        error = %failure,
                        "LLM request failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(failure) => return Err(failure),
            }
        }
        Err(LlmFailure::RetriesExhausted(self.max_retries))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LlmConfig;

    #[test]
    fn test_missing_api_key_is_not_configured() {
        let config = LlmConfig {
            model: "gemini-1.5-flash".to_string(),
            endpoint: "https://generativelanguage.googleapis.com".to_string(),
            api_key_env: "NONEXISTENT_TEST_KEY_VAR".to_string(),
            max_retries: 3,
            timeout_secs: 60,
        };
        match GeminiClient::from_config(&config) {
            Err(LlmFailure::NotConfigured(var)) => {
                assert_eq!(var, "NONEXISTENT_TEST_KEY_VAR")
            }
            other => panic!("expected NotConfigured, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_retryable_classification() {
        assert!(GeminiClient::retryable(&LlmFailure::Transport(
            "timeout".to_string()
        )));
        assert!(GeminiClient::retryable(&LlmFailure::Status {
            code: 429,
            body: String::new()
        }));
        assert!(GeminiClient::retryable(&LlmFailure::Status {
            code: 503,
            body: String::new()
        }));
        assert!(!GeminiClient::retryable(&LlmFailure::Status {
            code: 400,
            body: String::new()
        }));
        assert!(!GeminiClient::retryable(&LlmFailure::NotConfigured(
            "X".to_string()
        )));
    }

    #[test]
    fn test_response_parsing() {
        let raw = r#"{
            "candidates": [{
                "content": {
                    "parts": [{"text": "first "}, {"text": "second"}]
                }
            }]
        }"#;
        let parsed: GenerateResponse = serde_json::from_str(raw).unwrap();
        let text: String = parsed.candidates[0]
            .content
            .parts
            .iter()
            .map(|p| p.text.as_str())
            .collect();
        assert_eq!(text, "first second");
    }
}
