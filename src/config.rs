use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub storage: StorageConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

/// Object storage settings for the document corpus bucket.
#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub bucket: String,
    #[serde(default)]
    pub prefix: String,
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint for S3-compatible stores (MinIO, GCS interop).
    #[serde(default)]
    pub endpoint_url: Option<String>,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default = "default_storage_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_storage_timeout_secs() -> u64 {
    60
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*.pdf".to_string(), "**/*.txt".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_target_chars")]
    pub target_chars: usize,
    #[serde(default = "default_overlap_chars")]
    pub overlap_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            target_chars: default_target_chars(),
            overlap_chars: default_overlap_chars(),
        }
    }
}

fn default_target_chars() -> usize {
    1000
}
fn default_overlap_chars() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// Provider chain head: "google" (remote, hash fallback behind it) or
    /// "hash" (offline only).
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_dims")]
    pub dims: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Pause between batch groups, a cooperative nod to provider rate limits.
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: default_embedding_model(),
            dims: default_dims(),
            batch_size: default_batch_size(),
            batch_delay_ms: default_batch_delay_ms(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_embedding_provider() -> String {
    "hash".to_string()
}
fn default_embedding_model() -> String {
    "text-embedding-004".to_string()
}
fn default_dims() -> usize {
    768
}
fn default_batch_size() -> usize {
    5
}
fn default_batch_delay_ms() -> u64 {
    500
}
fn default_max_retries() -> u32 {
    3
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    /// "google" or "disabled". Disabled generation answers with the raw
    /// context marker and is only useful for tests and dry runs.
    #[serde(default = "default_generation_provider")]
    pub provider: String,
    #[serde(default = "default_generation_model")]
    pub model: String,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_generation_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_generation_provider(),
            model: default_generation_model(),
            max_retries: default_max_retries(),
            timeout_secs: default_generation_timeout_secs(),
        }
    }
}

fn default_generation_provider() -> String {
    "google".to_string()
}
fn default_generation_model() -> String {
    "gemini-1.5-flash".to_string()
}
fn default_generation_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Truncation length for citation previews. The generation step always
    /// sees the full chunk content.
    #[serde(default = "default_preview_chars")]
    pub preview_chars: usize,
    /// What `ask` does when the index is empty: "ingest-on-demand" runs a
    /// synchronous ingestion first; "no-documents" answers immediately.
    #[serde(default = "default_empty_index_policy")]
    pub empty_index_policy: String,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            preview_chars: default_preview_chars(),
            empty_index_policy: default_empty_index_policy(),
        }
    }
}

fn default_top_k() -> usize {
    5
}
fn default_preview_chars() -> usize {
    200
}
fn default_empty_index_policy() -> String {
    "ingest-on-demand".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    /// Documents processed per group before the inter-group pause.
    #[serde(default = "default_group_size")]
    pub group_size: usize,
    #[serde(default = "default_group_delay_ms")]
    pub group_delay_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            group_size: default_group_size(),
            group_delay_ms: default_group_delay_ms(),
        }
    }
}

fn default_group_size() -> usize {
    2
}
fn default_group_delay_ms() -> u64 {
    2000
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    validate(&config)?;
    Ok(config)
}

/// Validate a parsed config. Bad chunking parameters are rejected here,
/// before any document is touched.
pub fn validate(config: &Config) -> Result<()> {
    if config.storage.bucket.trim().is_empty() {
        anyhow::bail!("storage.bucket must not be empty");
    }

    if config.chunking.target_chars == 0 {
        anyhow::bail!("chunking.target_chars must be > 0");
    }

    if config.chunking.overlap_chars >= config.chunking.target_chars {
        anyhow::bail!(
            "chunking.overlap_chars ({}) must be smaller than chunking.target_chars ({})",
            config.chunking.overlap_chars,
            config.chunking.target_chars
        );
    }

    if config.embedding.dims == 0 {
        anyhow::bail!("embedding.dims must be > 0");
    }

    if config.embedding.batch_size == 0 {
        anyhow::bail!("embedding.batch_size must be > 0");
    }

    match config.embedding.provider.as_str() {
        "google" | "hash" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be google or hash.",
            other
        ),
    }

    match config.generation.provider.as_str() {
        "google" | "disabled" => {}
        other => anyhow::bail!(
            "Unknown generation provider: '{}'. Must be google or disabled.",
            other
        ),
    }

    if config.retrieval.top_k == 0 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }

    match config.retrieval.empty_index_policy.as_str() {
        "ingest-on-demand" | "no-documents" => {}
        other => anyhow::bail!(
            "Unknown empty_index_policy: '{}'. Must be ingest-on-demand or no-documents.",
            other
        ),
    }

    if config.pipeline.group_size == 0 {
        anyhow::bail!("pipeline.group_size must be > 0");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_str: &str) -> Result<Config> {
        let config: Config = toml::from_str(toml_str)?;
        validate(&config)?;
        Ok(config)
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = parse(
            r#"
            [storage]
            bucket = "legal-corpus"
            "#,
        )
        .unwrap();

        assert_eq!(config.chunking.target_chars, 1000);
        assert_eq!(config.chunking.overlap_chars, 200);
        assert_eq!(config.embedding.dims, 768);
        assert_eq!(config.retrieval.top_k, 5);
        assert_eq!(config.retrieval.empty_index_policy, "ingest-on-demand");
    }

    #[test]
    fn test_overlap_not_smaller_than_target_rejected() {
        let err = parse(
            r#"
            [storage]
            bucket = "legal-corpus"

            [chunking]
            target_chars = 200
            overlap_chars = 200
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("overlap_chars"));
    }

    #[test]
    fn test_unknown_embedding_provider_rejected() {
        let err = parse(
            r#"
            [storage]
            bucket = "legal-corpus"

            [embedding]
            provider = "quantum"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("Unknown embedding provider"));
    }

    #[test]
    fn test_unknown_empty_index_policy_rejected() {
        let err = parse(
            r#"
            [storage]
            bucket = "legal-corpus"

            [retrieval]
            empty_index_policy = "panic"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("empty_index_policy"));
    }
}
