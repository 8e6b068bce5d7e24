//! End-to-end tests for the ingestion pipeline and the RAG engine,
//! running entirely in-process: an in-memory corpus bucket, the offline
//! hash embedder, the in-memory vector index, and a scripted generation
//! provider.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use counsel_rag::config::{ChunkingConfig, EmbeddingConfig, PipelineConfig, RetrievalConfig};
use counsel_rag::embedding::Embedder;
use counsel_rag::error::{Error, Result};
use counsel_rag::generation::GenerationProvider;
use counsel_rag::index::{InMemoryIndex, VectorIndex};
use counsel_rag::pipeline::IngestionPipeline;
use counsel_rag::progress::{NoProgress, ProgressEvent, ProgressReporter, Stage};
use counsel_rag::rag::RagEngine;
use counsel_rag::storage::MemoryObjectStore;

const DIMS: usize = 256;

/// Generation stub that echoes a canned answer, or fails on demand.
struct ScriptedGenerator {
    answer: String,
    fail: bool,
}

impl ScriptedGenerator {
    fn answering(answer: &str) -> Self {
        Self {
            answer: answer.to_string(),
            fail: false,
        }
    }

    fn failing() -> Self {
        Self {
            answer: String::new(),
            fail: true,
        }
    }
}

#[async_trait]
impl GenerationProvider for ScriptedGenerator {
    fn model_name(&self) -> &str {
        "scripted-model"
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        if self.fail {
            return Err(Error::Provider("simulated generation outage".into()));
        }
        // Sanity: the orchestrator must always supply a context block.
        assert!(prompt.contains("Context:"), "prompt missing context block");
        Ok(self.answer.clone())
    }
}

fn legal_corpus() -> MemoryObjectStore {
    let mut store = MemoryObjectStore::new();

    let employment: String = (0..20)
        .map(|i| {
            format!(
                "Part {} of the Employment Code Act regulates employment \
                 relationships, including minimum wage, working hours, and \
                 leave entitlements for workers.",
                i + 1
            )
        })
        .collect::<Vec<_>>()
        .join(" ");
    store.insert("Employment Code Act.txt", employment.into_bytes());

    let penal: String = (0..20)
        .map(|i| {
            format!(
                "Chapter {} of the Penal Code defines criminal offences and \
                 the penalties attached to offences against persons and property.",
                i + 1
            )
        })
        .collect::<Vec<_>>()
        .join(" ");
    store.insert("Penal Code Act.txt", penal.into_bytes());

    store
}

fn hash_embedder() -> Arc<Embedder> {
    Arc::new(
        Embedder::new(&EmbeddingConfig {
            provider: "hash".to_string(),
            dims: DIMS,
            batch_size: 5,
            batch_delay_ms: 0,
            ..Default::default()
        })
        .unwrap(),
    )
}

fn build_engine(
    store: MemoryObjectStore,
    generator: Box<dyn GenerationProvider>,
    policy: &str,
) -> (RagEngine, Arc<InMemoryIndex>, Arc<IngestionPipeline>) {
    let embedder = hash_embedder();
    let index = Arc::new(InMemoryIndex::new(DIMS));

    let pipeline = Arc::new(
        IngestionPipeline::new(
            Arc::new(store),
            embedder.clone(),
            index.clone(),
            ChunkingConfig {
                target_chars: 400,
                overlap_chars: 80,
            },
            PipelineConfig {
                group_size: 2,
                group_delay_ms: 0,
            },
            Box::new(NoProgress),
        )
        .unwrap(),
    );

    let engine = RagEngine::new(
        embedder,
        index.clone(),
        generator,
        pipeline.clone(),
        &RetrievalConfig {
            top_k: 3,
            preview_chars: 200,
            empty_index_policy: policy.to_string(),
        },
    )
    .unwrap();

    (engine, index, pipeline)
}

#[tokio::test]
async fn test_ask_cites_relevant_act() {
    let (engine, _index, pipeline) = build_engine(
        legal_corpus(),
        Box::new(ScriptedGenerator::answering(
            "The Employment Code Act regulates employment relationships.",
        )),
        "ingest-on-demand",
    );

    pipeline.process_all().await.unwrap();

    let response = engine
        .ask("What does the Employment Code Act regulate?", Some(3))
        .await;

    assert!(!response.answer.is_empty());
    assert!(!response.sources.is_empty());
    assert!(
        response
            .sources
            .iter()
            .any(|s| s.title.contains("Employment Code Act")),
        "no Employment Code Act citation in {:?}",
        response.sources.iter().map(|s| &s.title).collect::<Vec<_>>()
    );
    // Previews are bounded regardless of chunk size.
    for source in &response.sources {
        assert!(source.content_preview.chars().count() <= 203);
    }
    assert!(response.metadata.chunks_considered > 0);
    assert_eq!(response.metadata.model, "scripted-model");
}

#[tokio::test]
async fn test_sources_ranked_descending() {
    let (engine, _index, pipeline) = build_engine(
        legal_corpus(),
        Box::new(ScriptedGenerator::answering("answer")),
        "ingest-on-demand",
    );
    pipeline.process_all().await.unwrap();

    let response = engine.ask("minimum wage for workers", Some(3)).await;
    assert!(response.sources.len() <= 3);
    for pair in response.sources.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
}

#[tokio::test]
async fn test_empty_index_ingests_on_demand() {
    let (engine, index, _pipeline) = build_engine(
        legal_corpus(),
        Box::new(ScriptedGenerator::answering("on-demand answer")),
        "ingest-on-demand",
    );

    // No explicit ingestion: asking must trigger it.
    assert_eq!(index.stats().await.unwrap().chunk_count, 0);
    let response = engine.ask("criminal offences", None).await;

    assert_eq!(response.answer, "on-demand answer");
    assert!(index.stats().await.unwrap().chunk_count > 0);
    assert!(!response.sources.is_empty());
}

#[tokio::test]
async fn test_empty_index_no_documents_policy() {
    let (engine, index, _pipeline) = build_engine(
        MemoryObjectStore::new(),
        Box::new(ScriptedGenerator::answering("should not be called")),
        "no-documents",
    );

    let response = engine.ask("irrelevant question", Some(3)).await;

    assert!(!response.answer.is_empty());
    assert_ne!(response.answer, "should not be called");
    assert!(response.sources.is_empty());
    // The policy must not ingest behind the caller's back.
    assert_eq!(index.stats().await.unwrap().chunk_count, 0);
}

#[tokio::test]
async fn test_empty_corpus_with_on_demand_policy_still_answers() {
    let (engine, _index, _pipeline) = build_engine(
        MemoryObjectStore::new(),
        Box::new(ScriptedGenerator::answering(
            "There is no relevant information in the provided documents.",
        )),
        "ingest-on-demand",
    );

    // Ingestion finds nothing; generation still runs against the
    // "no relevant documents" marker and must not crash.
    let response = engine.ask("irrelevant question", Some(3)).await;
    assert!(!response.answer.is_empty());
    assert!(response.sources.is_empty());
}

#[tokio::test]
async fn test_generation_failure_degrades_without_fault() {
    let (engine, _index, pipeline) = build_engine(
        legal_corpus(),
        Box::new(ScriptedGenerator::failing()),
        "ingest-on-demand",
    );
    pipeline.process_all().await.unwrap();

    let response = engine.ask("What does the Penal Code cover?", Some(3)).await;

    assert!(response.answer.contains("could not be generated"));
    assert!(response.sources.is_empty());
}

#[tokio::test]
async fn test_reprocessing_replaces_rather_than_duplicates() {
    let (_engine, index, pipeline) = build_engine(
        legal_corpus(),
        Box::new(ScriptedGenerator::answering("answer")),
        "ingest-on-demand",
    );

    let first = pipeline.process_all().await.unwrap();
    let count_after_first = index.stats().await.unwrap().chunk_count;

    let second = pipeline.process_all().await.unwrap();
    let count_after_second = index.stats().await.unwrap().chunk_count;

    assert_eq!(first.chunks_created, second.chunks_created);
    assert_eq!(count_after_first, count_after_second);
}

#[tokio::test]
async fn test_clear_then_stats_reports_zero() {
    let (_engine, index, pipeline) = build_engine(
        legal_corpus(),
        Box::new(ScriptedGenerator::answering("answer")),
        "ingest-on-demand",
    );

    pipeline.process_all().await.unwrap();
    assert!(index.stats().await.unwrap().chunk_count > 0);

    index.clear().await.unwrap();
    let stats = index.stats().await.unwrap();
    assert_eq!(stats.chunk_count, 0);
    assert_eq!(stats.vector_count, 0);
}

/// Progress reporter that records whether every stage was observed.
struct RecordingReporter {
    saw_extracting: AtomicBool,
    saw_chunking: AtomicBool,
    saw_embedding: AtomicBool,
    saw_storing: AtomicBool,
    saw_done: AtomicBool,
}

impl RecordingReporter {
    fn new() -> Self {
        Self {
            saw_extracting: AtomicBool::new(false),
            saw_chunking: AtomicBool::new(false),
            saw_embedding: AtomicBool::new(false),
            saw_storing: AtomicBool::new(false),
            saw_done: AtomicBool::new(false),
        }
    }
}

impl ProgressReporter for RecordingReporter {
    fn report(&self, event: ProgressEvent) {
        if let ProgressEvent::DocumentStage { stage, .. } = event {
            let flag = match stage {
                Stage::Extracting => &self.saw_extracting,
                Stage::Chunking => &self.saw_chunking,
                Stage::Embedding => &self.saw_embedding,
                Stage::Storing => &self.saw_storing,
                Stage::Done => &self.saw_done,
                _ => return,
            };
            flag.store(true, Ordering::SeqCst);
        }
    }
}

#[tokio::test]
async fn test_pipeline_emits_every_stage() {
    let reporter = Arc::new(RecordingReporter::new());

    struct Forward(Arc<RecordingReporter>);
    impl ProgressReporter for Forward {
        fn report(&self, event: ProgressEvent) {
            self.0.report(event);
        }
    }

    let embedder = hash_embedder();
    let index = Arc::new(InMemoryIndex::new(DIMS));
    let pipeline = IngestionPipeline::new(
        Arc::new(legal_corpus()),
        embedder,
        index,
        ChunkingConfig {
            target_chars: 400,
            overlap_chars: 80,
        },
        PipelineConfig {
            group_size: 1,
            group_delay_ms: 0,
        },
        Box::new(Forward(reporter.clone())),
    )
    .unwrap();

    pipeline.process_all().await.unwrap();

    assert!(reporter.saw_extracting.load(Ordering::SeqCst));
    assert!(reporter.saw_chunking.load(Ordering::SeqCst));
    assert!(reporter.saw_embedding.load(Ordering::SeqCst));
    assert!(reporter.saw_storing.load(Ordering::SeqCst));
    assert!(reporter.saw_done.load(Ordering::SeqCst));
}
