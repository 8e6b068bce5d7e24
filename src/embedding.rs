//! Embedding backends and the provider chain.
//!
//! Texts are embedded by the first backend in the chain that succeeds:
//! the remote provider first (when configured), then the deterministic
//! local hash backend. The hash backend cannot fail, so a provider outage
//! degrades retrieval quality but never halts the pipeline. Every degrade
//! is logged at WARN.
//!
//! # Retry Strategy
//!
//! The remote backend uses exponential backoff for transient errors:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::EmbeddingConfig;
use crate::error::{Error, Result};
use crate::models::{Chunk, EmbeddingVector};

/// A single embedding strategy in the fallback chain.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Backend identifier used in logs (e.g. `"google"`, `"hash"`).
    fn name(&self) -> &str;

    /// Vector dimensionality produced by this backend.
    fn dims(&self) -> usize;

    /// Embed a batch of texts, one vector per input, in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

// ============ Google backend ============

/// Remote backend calling the Generative Language embeddings API.
///
/// Requires `GOOGLE_API_KEY` in the environment; a missing key is a
/// configuration error at construction time, not per call.
pub struct GoogleEmbeddingBackend {
    model: String,
    dims: usize,
    api_key: String,
    max_retries: u32,
    client: reqwest::Client,
}

impl GoogleEmbeddingBackend {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = std::env::var("GOOGLE_API_KEY")
            .map_err(|_| Error::Config("GOOGLE_API_KEY environment variable not set".into()))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            model: config.model.clone(),
            dims: config.dims,
            api_key,
            max_retries: config.max_retries,
            client,
        })
    }
}

#[async_trait]
impl EmbeddingBackend for GoogleEmbeddingBackend {
    fn name(&self) -> &str {
        "google"
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:batchEmbedContents?key={}",
            self.model, self.api_key
        );

        let requests: Vec<serde_json::Value> = texts
            .iter()
            .map(|text| {
                serde_json::json!({
                    "model": format!("models/{}", self.model),
                    "content": { "parts": [{ "text": text }] },
                })
            })
            .collect();
        let body = serde_json::json!({ "requests": requests });

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
                        return parse_embed_response(&json, self.dims);
                    }

                    // Rate limited or server error — retry
                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(Error::Provider(format!(
                            "embedding API error {}: {}",
                            status, body_text
                        )));
                        continue;
                    }

                    // Client error (not 429) — don't retry
                    let body_text = response.text().await.unwrap_or_default();
                    return Err(Error::Provider(format!(
                        "embedding API error {}: {}",
                        status, body_text
                    )));
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| Error::Provider("embedding failed after retries".into())))
    }
}

fn parse_embed_response(json: &serde_json::Value, dims: usize) -> Result<Vec<Vec<f32>>> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| Error::Provider("invalid embedding response: missing embeddings".into()))?;

    let mut result = Vec::with_capacity(embeddings.len());
    for item in embeddings {
        let values = item
            .get("values")
            .and_then(|v| v.as_array())
            .ok_or_else(|| Error::Provider("invalid embedding response: missing values".into()))?;
        let vec: Vec<f32> = values
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();
        if vec.len() != dims {
            return Err(Error::Provider(format!(
                "embedding dimensionality mismatch: expected {}, got {}",
                dims,
                vec.len()
            )));
        }
        result.push(vec);
    }
    Ok(result)
}

// ============ Hash backend ============

/// Deterministic bag-of-words hash embedding.
///
/// Tokenizes on whitespace, maps each lowercased token through a string
/// hash to a slot, accumulates counts, and L2-normalizes. Not semantic;
/// it exists so the pipeline keeps moving through provider outages.
pub struct HashEmbeddingBackend {
    dims: usize,
}

impl HashEmbeddingBackend {
    pub fn new(dims: usize) -> Self {
        Self { dims }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut values = vec![0.0f32; self.dims];
        for token in text.to_lowercase().split_whitespace() {
            let slot = token_slot(token, self.dims);
            values[slot] += 1.0;
        }

        let magnitude = values.iter().map(|v| v * v).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for v in values.iter_mut() {
                *v /= magnitude;
            }
        }
        values
    }
}

/// Map a token to a vector slot. 32-bit multiplicative hash, folded to
/// an absolute value so the slot is stable across platforms.
fn token_slot(token: &str, dims: usize) -> usize {
    let mut hash: i32 = 0;
    for c in token.chars() {
        hash = hash
            .wrapping_shl(5)
            .wrapping_sub(hash)
            .wrapping_add(c as i32);
    }
    hash.unsigned_abs() as usize % dims
}

#[async_trait]
impl EmbeddingBackend for HashEmbeddingBackend {
    fn name(&self) -> &str {
        "hash"
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

// ============ Embedder (chain + batching) ============

/// Embeds queries and chunks through an ordered backend chain.
///
/// Batches are processed in fixed-size groups with a short pause between
/// groups as a cooperative concession to provider rate limits.
pub struct Embedder {
    backends: Vec<Box<dyn EmbeddingBackend>>,
    dims: usize,
    batch_size: usize,
    batch_delay: Duration,
}

impl std::fmt::Debug for Embedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Embedder")
            .field("backends", &self.backends.len())
            .field("dims", &self.dims)
            .field("batch_size", &self.batch_size)
            .field("batch_delay", &self.batch_delay)
            .finish()
    }
}

impl Embedder {
    /// Build the backend chain from configuration.
    ///
    /// `provider = "google"` puts the remote backend first with the hash
    /// backend behind it; `provider = "hash"` runs offline only. Unknown
    /// providers and missing credentials are configuration errors.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let mut backends: Vec<Box<dyn EmbeddingBackend>> = Vec::new();

        match config.provider.as_str() {
            "google" => {
                backends.push(Box::new(GoogleEmbeddingBackend::new(config)?));
                backends.push(Box::new(HashEmbeddingBackend::new(config.dims)));
            }
            "hash" => {
                backends.push(Box::new(HashEmbeddingBackend::new(config.dims)));
            }
            other => {
                return Err(Error::Config(format!(
                    "Unknown embedding provider: '{}'",
                    other
                )));
            }
        }

        Ok(Self {
            backends,
            dims: config.dims,
            batch_size: config.batch_size.max(1),
            batch_delay: Duration::from_millis(config.batch_delay_ms),
        })
    }

    /// Dimensionality of every vector this embedder produces.
    pub fn dims(&self) -> usize {
        self.dims
    }

    /// Embed one text (typically a query) through the chain.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let texts = [text.to_string()];
        let vectors = self.embed_group(&texts).await?;
        vectors
            .into_iter()
            .next()
            .ok_or_else(|| Error::Provider("empty embedding response".into()))
    }

    /// Embed a batch of chunks, preserving order.
    ///
    /// Partial failure is tolerated by omission: a chunk whose vector came
    /// back with the wrong dimensionality is skipped (and logged), so
    /// callers must reconcile results by chunk id rather than position.
    pub async fn embed_chunks(&self, chunks: &[Chunk]) -> Result<Vec<EmbeddingVector>> {
        let mut results = Vec::with_capacity(chunks.len());

        for (group_index, group) in chunks.chunks(self.batch_size).enumerate() {
            if group_index > 0 && !self.batch_delay.is_zero() {
                tokio::time::sleep(self.batch_delay).await;
            }

            let texts: Vec<String> = group.iter().map(|c| c.content.clone()).collect();
            let vectors = self.embed_group(&texts).await?;

            for (chunk, values) in group.iter().zip(vectors.into_iter()) {
                if values.len() != self.dims {
                    warn!(
                        chunk_id = %chunk.id,
                        expected = self.dims,
                        actual = values.len(),
                        "dropping embedding with mismatched dimensionality"
                    );
                    continue;
                }
                results.push(EmbeddingVector {
                    chunk_id: chunk.id.clone(),
                    source_content_length: chunk.content.len(),
                    values,
                });
            }
        }

        Ok(results)
    }

    /// Try each backend in order; first success wins. A backend failure
    /// degrades to the next strategy for this group only.
    async fn embed_group(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut last_err = None;

        for (i, backend) in self.backends.iter().enumerate() {
            match backend.embed_batch(texts).await {
                Ok(vectors) => {
                    if i > 0 {
                        warn!(
                            backend = backend.name(),
                            texts = texts.len(),
                            "embedding degraded to fallback backend"
                        );
                    } else {
                        debug!(backend = backend.name(), texts = texts.len(), "embedded batch");
                    }
                    return Ok(vectors);
                }
                Err(e) => {
                    warn!(backend = backend.name(), error = %e, "embedding backend failed");
                    last_err = Some(e);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| Error::Config("no embedding backends configured".into())))
    }
}
