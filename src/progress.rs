//! Ingestion progress reporting.
//!
//! The pipeline emits a [`ProgressEvent`] at every per-document stage
//! transition so an external caller can render progress without polling.
//! Events go to **stderr** so stdout remains parseable for scripts.

use std::io::Write;

use serde::Serialize;

/// Per-document pipeline stage. Transitions are strictly sequential.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Pending,
    Extracting,
    Chunking,
    Embedding,
    Storing,
    Done,
    Failed,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Pending => "pending",
            Stage::Extracting => "extracting",
            Stage::Chunking => "chunking",
            Stage::Embedding => "embedding",
            Stage::Storing => "storing",
            Stage::Done => "done",
            Stage::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

/// A single progress event emitted by the ingestion pipeline.
#[derive(Clone, Debug)]
pub enum ProgressEvent {
    /// The run started; `total` documents will be attempted.
    RunStarted { total: usize },
    /// A document entered a new stage. `completed` counts finished
    /// documents (done or failed) so far.
    DocumentStage {
        document: String,
        stage: Stage,
        completed: usize,
        total: usize,
    },
    /// The run finished (normally, cancelled, or aborted).
    RunFinished { succeeded: usize, failed: usize },
}

/// Reports ingestion progress. Implementations write to stderr.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// Human-friendly progress: "ingest  employment-code.pdf  embedding  2 / 14".
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: ProgressEvent) {
        let line = match &event {
            ProgressEvent::RunStarted { total } => {
                format!("ingest  starting  {} documents\n", total)
            }
            ProgressEvent::DocumentStage {
                document,
                stage,
                completed,
                total,
            } => {
                format!("ingest  {}  {}  {} / {}\n", document, stage, completed, total)
            }
            ProgressEvent::RunFinished { succeeded, failed } => {
                format!("ingest  finished  {} ok, {} failed\n", succeeded, failed)
            }
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, event: ProgressEvent) {
        let obj = match &event {
            ProgressEvent::RunStarted { total } => serde_json::json!({
                "event": "run_started",
                "total": total
            }),
            ProgressEvent::DocumentStage {
                document,
                stage,
                completed,
                total,
            } => serde_json::json!({
                "event": "document_stage",
                "document": document,
                "stage": stage,
                "completed": completed,
                "total": total
            }),
            ProgressEvent::RunFinished { succeeded, failed } => serde_json::json!({
                "event": "run_finished",
                "succeeded": succeeded,
                "failed": failed
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: ProgressEvent) {}
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    /// Build a reporter for this mode. Caller passes it to the pipeline.
    pub fn reporter(&self) -> Box<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_display() {
        assert_eq!(Stage::Extracting.to_string(), "extracting");
        assert_eq!(Stage::Done.to_string(), "done");
    }

    #[test]
    fn test_stage_serializes_lowercase() {
        let json = serde_json::to_string(&Stage::Embedding).unwrap();
        assert_eq!(json, "\"embedding\"");
    }
}
