//! Answer generation provider abstraction.
//!
//! The orchestrator consumes generation through the [`GenerationProvider`]
//! trait so tests can stub it out. The production implementation calls the
//! Generative Language `generateContent` endpoint with the same retry and
//! backoff discipline as the embedding backend.

use std::time::Duration;

use async_trait::async_trait;

use crate::config::GenerationConfig;
use crate::error::{Error, Result};

/// A text completion backend.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Model identifier reported in answer metadata.
    fn model_name(&self) -> &str;

    /// Complete a prompt. May fail transiently; the orchestrator degrades
    /// rather than propagating.
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Generation provider backed by the Generative Language API.
///
/// Requires `GOOGLE_API_KEY` in the environment; missing credentials are
/// a configuration error at construction, not per call.
pub struct GoogleGenerationProvider {
    model: String,
    api_key: String,
    max_retries: u32,
    client: reqwest::Client,
}

impl GoogleGenerationProvider {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let api_key = std::env::var("GOOGLE_API_KEY")
            .map_err(|_| Error::Config("GOOGLE_API_KEY environment variable not set".into()))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            model: config.model.clone(),
            api_key,
            max_retries: config.max_retries,
            client,
        })
    }
}

#[async_trait]
impl GenerationProvider for GoogleGenerationProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent?key={}",
            self.model, self.api_key
        );

        let body = serde_json::json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self.client.post(&url).json(&body).send().await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await?;
                        return parse_generate_response(&json);
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(Error::Provider(format!(
                            "generation API error {}: {}",
                            status, body_text
                        )));
                        continue;
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    return Err(Error::Provider(format!(
                        "generation API error {}: {}",
                        status, body_text
                    )));
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| Error::Provider("generation failed after retries".into())))
    }
}

fn parse_generate_response(json: &serde_json::Value) -> Result<String> {
    let parts = json
        .get("candidates")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("content"))
        .and_then(|c| c.get("parts"))
        .and_then(|p| p.as_array())
        .ok_or_else(|| Error::Provider("invalid generation response: missing candidates".into()))?;

    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect::<Vec<_>>()
        .join("");

    if text.is_empty() {
        return Err(Error::Provider(
            "generation response contained no text".into(),
        ));
    }

    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_generate_response() {
        let json = serde_json::json!({
            "candidates": [{
                "content": {
                    "parts": [
                        { "text": "The Act regulates " },
                        { "text": "employment." }
                    ]
                }
            }]
        });
        let text = parse_generate_response(&json).unwrap();
        assert_eq!(text, "The Act regulates employment.");
    }

    #[test]
    fn test_parse_generate_response_missing_candidates() {
        let err = parse_generate_response(&serde_json::json!({})).unwrap_err();
        assert!(matches!(err, Error::Provider(_)));
    }

    #[test]
    fn test_parse_generate_response_empty_text() {
        let json = serde_json::json!({
            "candidates": [{ "content": { "parts": [] } }]
        });
        let err = parse_generate_response(&json).unwrap_err();
        assert!(matches!(err, Error::Provider(_)));
    }
}
