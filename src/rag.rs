//! Query-time orchestration: retrieve, assemble context, generate, cite.
//!
//! [`RagEngine::ask`] embeds the question, queries the vector index,
//! assembles a bounded context block, invokes the generation provider,
//! and returns the answer with ranked source citations. It never returns
//! an error: any internal failure becomes a best-effort textual
//! explanation in the answer with empty sources, so callers always
//! receive a well-formed response.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{info, warn};

use crate::config::RetrievalConfig;
use crate::embedding::Embedder;
use crate::error::{Error, Result};
use crate::generation::GenerationProvider;
use crate::index::{Query, VectorIndex};
use crate::models::SearchResult;
use crate::pipeline::IngestionPipeline;

/// What `ask` does when the index holds no chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmptyIndexPolicy {
    /// Run a synchronous ingestion before answering (lazy-build).
    IngestOnDemand,
    /// Answer immediately that no documents are available.
    NoDocuments,
}

impl EmptyIndexPolicy {
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "ingest-on-demand" => Ok(Self::IngestOnDemand),
            "no-documents" => Ok(Self::NoDocuments),
            other => Err(Error::Config(format!(
                "Unknown empty_index_policy: '{}'",
                other
            ))),
        }
    }
}

/// One cited source, ranked by relevance.
#[derive(Debug, Clone, Serialize)]
pub struct Citation {
    pub title: String,
    pub source_ref: String,
    /// Truncated preview. The generation step saw the full content.
    pub content_preview: String,
    pub score: f32,
    pub chunk_index: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnswerMetadata {
    /// Chunks in the index at answer time.
    pub chunks_considered: usize,
    /// Wall-clock time from question embedding through generation.
    pub search_latency_ms: u64,
    pub model: String,
}

/// The response shape returned to surrounding application code.
#[derive(Debug, Clone, Serialize)]
pub struct RagAnswer {
    pub answer: String,
    pub sources: Vec<Citation>,
    pub metadata: AnswerMetadata,
}

const NO_CONTEXT_MARKER: &str = "No relevant documents found.";

/// Retrieval-augmented answering over the ingested corpus.
pub struct RagEngine {
    embedder: Arc<Embedder>,
    index: Arc<dyn VectorIndex>,
    generator: Box<dyn GenerationProvider>,
    pipeline: Arc<IngestionPipeline>,
    top_k: usize,
    preview_chars: usize,
    empty_index_policy: EmptyIndexPolicy,
}

impl RagEngine {
    pub fn new(
        embedder: Arc<Embedder>,
        index: Arc<dyn VectorIndex>,
        generator: Box<dyn GenerationProvider>,
        pipeline: Arc<IngestionPipeline>,
        retrieval: &RetrievalConfig,
    ) -> Result<Self> {
        Ok(Self {
            embedder,
            index,
            generator,
            pipeline,
            top_k: retrieval.top_k.max(1),
            preview_chars: retrieval.preview_chars,
            empty_index_policy: EmptyIndexPolicy::parse(&retrieval.empty_index_policy)?,
        })
    }

    /// Answer a question from the corpus.
    ///
    /// `top_k` overrides the configured result count. This method never
    /// fails: provider and index errors degrade to an explanatory answer
    /// with no sources.
    pub async fn ask(&self, question: &str, top_k: Option<usize>) -> RagAnswer {
        let top_k = top_k.unwrap_or(self.top_k).max(1);
        let model = self.generator.model_name().to_string();

        // Empty-index policy, applied before any retrieval work.
        match self.index.stats().await {
            Ok(stats) if stats.chunk_count == 0 => match self.empty_index_policy {
                EmptyIndexPolicy::IngestOnDemand => {
                    info!("index is empty, running ingestion before answering");
                    match self.pipeline.process_all().await {
                        Ok(run) if run.fatal_error.is_some() => {
                            return self.degraded(
                                format!(
                                    "The document index could not be built: {}",
                                    run.fatal_error.unwrap_or_default()
                                ),
                                &model,
                            );
                        }
                        Ok(_) => {}
                        Err(e) => {
                            return self.degraded(
                                format!("The document index could not be built: {}", e),
                                &model,
                            );
                        }
                    }
                }
                EmptyIndexPolicy::NoDocuments => {
                    return self.degraded(
                        "No documents have been ingested yet, so this question cannot \
                         be answered from the corpus."
                            .to_string(),
                        &model,
                    );
                }
            },
            Ok(_) => {}
            Err(e) => {
                return self.degraded(format!("The document index is unavailable: {}", e), &model);
            }
        }

        let started = Instant::now();

        let query_vector = match self.embedder.embed(question).await {
            Ok(v) => v,
            Err(e) => {
                return self.degraded(
                    format!("The question could not be embedded: {}", e),
                    &model,
                );
            }
        };

        let query = Query {
            vector: query_vector,
            text: question.to_string(),
        };
        let results = match self.index.search(&query, top_k).await {
            Ok(r) => r,
            Err(e) => {
                return self.degraded(format!("The document search failed: {}", e), &model);
            }
        };

        let context = build_context(&results);
        let prompt = build_prompt(question, &context);

        let answer = match self.generator.complete(&prompt).await {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "generation failed, returning degraded answer");
                return self.degraded(
                    format!(
                        "Sorry, an answer could not be generated for this question: {}",
                        e
                    ),
                    &model,
                );
            }
        };

        let search_latency_ms = started.elapsed().as_millis() as u64;

        let chunks_considered = self
            .index
            .stats()
            .await
            .map(|s| s.chunk_count)
            .unwrap_or(0);

        let sources = results
            .iter()
            .map(|r| Citation {
                title: r.chunk.title.clone(),
                source_ref: r.chunk.source_ref.clone(),
                content_preview: truncate_preview(&r.chunk.content, self.preview_chars),
                score: r.score,
                chunk_index: r.chunk.chunk_index,
            })
            .collect();

        RagAnswer {
            answer,
            sources,
            metadata: AnswerMetadata {
                chunks_considered,
                search_latency_ms,
                model,
            },
        }
    }

    fn degraded(&self, answer: String, model: &str) -> RagAnswer {
        RagAnswer {
            answer,
            sources: Vec::new(),
            metadata: AnswerMetadata {
                chunks_considered: 0,
                search_latency_ms: 0,
                model: model.to_string(),
            },
        }
    }
}

/// Concatenate results into the context block, best match first, one
/// clearly delimited section per chunk. Full chunk content goes to the
/// model; only citation previews are truncated.
fn build_context(results: &[SearchResult]) -> String {
    if results.is_empty() {
        return NO_CONTEXT_MARKER.to_string();
    }

    results
        .iter()
        .enumerate()
        .map(|(i, r)| {
            format!(
                "Document {}: {}\nSource: {}\nContent: {}\n\n---",
                i + 1,
                r.chunk.title,
                r.chunk.source_ref,
                r.chunk.content
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn build_prompt(question: &str, context: &str) -> String {
    format!(
        "You are a legal research assistant. Answer the following question \
         using only the legal documents provided in the context. If the \
         context does not contain relevant information, say so plainly.\n\n\
         Context:\n{}\n\n\
         Question: {}\n\n\
         Provide a clear, accurate answer grounded in the documents above, \
         citing the source documents you relied on.",
        context, question
    )
}

/// Truncate to a character limit without splitting a code point, with an
/// ellipsis when anything was cut.
fn truncate_preview(content: &str, max_chars: usize) -> String {
    if content.chars().count() <= max_chars {
        return content.to_string();
    }
    let mut preview: String = content.chars().take(max_chars).collect();
    preview.push_str("...");
    preview
}
