//! Ingestion pipeline orchestration.
//!
//! Drives each corpus document through the stage sequence
//! `pending → extracting → chunking → embedding → storing → done | failed`.
//! Documents are processed in small groups with a pause between groups,
//! both to stay polite toward the embedding provider and to bound peak
//! memory: a document's text, chunks, and vectors are dropped before the
//! next group starts.
//!
//! One bad document never aborts a run: its failure is recorded in the
//! [`ProcessingRun`] and processing moves on. Only an unreachable index is
//! fatal, and that is reported distinctly from per-document failures.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{error, info, warn};

use crate::chunk::{chunk_document, chunk_text};
use crate::config::{ChunkingConfig, PipelineConfig};
use crate::embedding::Embedder;
use crate::error::{Error, Result};
use crate::extract::extract_text;
use crate::index::VectorIndex;
use crate::models::{
    document_id, document_title, Document, DocumentFailure, FileType, ProcessingRun,
};
use crate::progress::{ProgressEvent, ProgressReporter, Stage};
use crate::storage::{ObjectMeta, ObjectStore};

/// Cooperative cancellation handle, checked at group boundaries.
///
/// Cancelling mid-run never corrupts already-stored documents; it only
/// stops new groups from starting.
#[derive(Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Corpus-level counts reported by [`IngestionPipeline::stats`].
#[derive(Debug, Clone, Copy)]
pub struct PipelineStats {
    pub documents: usize,
    pub chunks: usize,
    pub embeddings: usize,
}

/// Drives Chunker → Embedder → VectorIndex across the corpus.
pub struct IngestionPipeline {
    store: Arc<dyn ObjectStore>,
    embedder: Arc<Embedder>,
    index: Arc<dyn VectorIndex>,
    chunking: ChunkingConfig,
    batching: PipelineConfig,
    reporter: Box<dyn ProgressReporter>,
    cancel: CancelFlag,
    running: AtomicBool,
}

/// Clears the run-in-progress flag on every exit path.
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl IngestionPipeline {
    /// Build a pipeline. Malformed chunking parameters are rejected here,
    /// before any document is processed.
    pub fn new(
        store: Arc<dyn ObjectStore>,
        embedder: Arc<Embedder>,
        index: Arc<dyn VectorIndex>,
        chunking: ChunkingConfig,
        batching: PipelineConfig,
        reporter: Box<dyn ProgressReporter>,
    ) -> Result<Self> {
        // Probing with empty text exercises the parameter validation
        // without touching any document.
        chunk_text("", chunking.target_chars, chunking.overlap_chars)?;

        Ok(Self {
            store,
            embedder,
            index,
            chunking,
            batching,
            reporter,
            cancel: CancelFlag::new(),
            running: AtomicBool::new(false),
        })
    }

    /// Handle for cancelling a run between group boundaries.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Process every document in the corpus.
    pub async fn process_all(&self) -> Result<ProcessingRun> {
        let objects = self.store.list().await?;
        self.run(objects).await
    }

    /// Process a single document — a run of size one with identical
    /// semantics. Accepts the object name or the derived document id.
    pub async fn process_one(&self, document: &str) -> Result<ProcessingRun> {
        let objects = self.store.list().await?;

        let target: Vec<ObjectMeta> = objects
            .into_iter()
            .filter(|obj| obj.name == document || document_id(&obj.name) == document)
            .collect();

        if target.is_empty() {
            return Err(Error::Storage(format!(
                "document not found in corpus: {}",
                document
            )));
        }

        self.run(target).await
    }

    /// Corpus-level counts: documents in the bucket, chunks and vectors in
    /// the index.
    pub async fn stats(&self) -> Result<PipelineStats> {
        let documents = self.store.list().await?.len();
        let index_stats = self.index.stats().await?;
        Ok(PipelineStats {
            documents,
            chunks: index_stats.chunk_count,
            embeddings: index_stats.vector_count,
        })
    }

    async fn run(&self, objects: Vec<ObjectMeta>) -> Result<ProcessingRun> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(Error::Validation(
                "an ingestion run is already in progress".into(),
            ));
        }
        let _guard = RunGuard(&self.running);

        let started = Instant::now();
        let total = objects.len();
        let mut run = ProcessingRun {
            documents_attempted: total,
            ..Default::default()
        };

        info!(documents = total, "starting ingestion run");
        self.reporter.report(ProgressEvent::RunStarted { total });

        let group_delay = Duration::from_millis(self.batching.group_delay_ms);

        'groups: for (group_index, group) in
            objects.chunks(self.batching.group_size.max(1)).enumerate()
        {
            if self.cancel.is_cancelled() {
                info!("ingestion run cancelled at group boundary");
                run.cancelled = true;
                break;
            }
            if group_index > 0 && !group_delay.is_zero() {
                tokio::time::sleep(group_delay).await;
            }

            for obj in group {
                let completed = run.documents_succeeded + run.documents_failed;
                match self.process_document(obj, completed, total).await {
                    Ok((chunks, embeddings)) => {
                        run.documents_succeeded += 1;
                        run.chunks_created += chunks;
                        run.embeddings_created += embeddings;
                    }
                    Err(Error::Index(reason)) => {
                        // The backing store is gone; continuing would fail
                        // every remaining document the same way.
                        error!(error = %reason, "index unreachable, aborting run");
                        run.fatal_error = Some(reason);
                        break 'groups;
                    }
                    Err(e) => {
                        warn!(document = %obj.name, error = %e, "document failed");
                        run.documents_failed += 1;
                        run.failures.push(DocumentFailure {
                            document: obj.name.clone(),
                            reason: e.to_string(),
                        });
                        self.reporter.report(ProgressEvent::DocumentStage {
                            document: obj.name.clone(),
                            stage: Stage::Failed,
                            completed: run.documents_succeeded + run.documents_failed,
                            total,
                        });
                    }
                }
                // The document's text, chunks, and vectors went out of
                // scope inside process_document; nothing from this
                // document is retained across the group boundary.
            }
        }

        run.elapsed_ms = started.elapsed().as_millis() as u64;
        self.reporter.report(ProgressEvent::RunFinished {
            succeeded: run.documents_succeeded,
            failed: run.documents_failed,
        });
        info!(
            succeeded = run.documents_succeeded,
            failed = run.documents_failed,
            chunks = run.chunks_created,
            embeddings = run.embeddings_created,
            elapsed_ms = run.elapsed_ms,
            "ingestion run finished"
        );

        Ok(run)
    }

    /// Run one document through the full stage sequence. Returns the chunk
    /// and embedding counts on success.
    async fn process_document(
        &self,
        obj: &ObjectMeta,
        completed: usize,
        total: usize,
    ) -> Result<(usize, usize)> {
        let stage = |stage: Stage| {
            self.reporter.report(ProgressEvent::DocumentStage {
                document: obj.name.clone(),
                stage,
                completed,
                total,
            });
        };

        stage(Stage::Extracting);
        let file_type = FileType::from_name(&obj.name).ok_or_else(|| Error::Extraction {
            name: obj.name.clone(),
            reason: format!("unsupported file type: {}", obj.name),
        })?;
        let bytes = self.store.download(&obj.name).await.map_err(|e| {
            // A failed download fails this document at the extracting
            // stage, not the whole run.
            Error::Extraction {
                name: obj.name.clone(),
                reason: format!("download failed: {}", e),
            }
        })?;
        let text = extract_text(&obj.name, &bytes, file_type)?;
        drop(bytes);

        stage(Stage::Chunking);
        let doc = Document {
            id: document_id(&obj.name),
            title: document_title(&obj.name, &text),
            source_ref: format!("bucket://{}", obj.name),
            file_type,
            size_bytes: obj.size,
            processed_at: Utc::now(),
        };
        let chunks = chunk_document(
            &doc,
            &text,
            self.chunking.target_chars,
            self.chunking.overlap_chars,
        )?;
        drop(text);

        if chunks.is_empty() {
            warn!(document = %obj.name, "no chunks produced, skipping");
            stage(Stage::Done);
            return Ok((0, 0));
        }

        stage(Stage::Embedding);
        // Provider failures inside the embedder degrade to the hash
        // fallback; they do not fail the document.
        let vectors = self.embedder.embed_chunks(&chunks).await?;

        stage(Stage::Storing);
        let outcome = self.index.upsert(&chunks, &vectors).await?;
        if outcome.rejected > 0 {
            warn!(
                document = %obj.name,
                rejected = outcome.rejected,
                "some chunks were rejected by the index"
            );
        }

        stage(Stage::Done);
        info!(
            document = %obj.name,
            chunks = chunks.len(),
            stored = outcome.stored,
            "document processed"
        );
        Ok((chunks.len(), outcome.stored))
    }
}
