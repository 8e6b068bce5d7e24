//! # Counsel RAG CLI (`counsel`)
//!
//! Thin command-line surface over the library: ingest the corpus, ask a
//! question, or print corpus statistics. All engine settings come from a
//! TOML config file; credentials come from the environment
//! (`AWS_ACCESS_KEY_ID`/`AWS_SECRET_ACCESS_KEY` for the corpus bucket,
//! `GOOGLE_API_KEY` for the embedding and generation providers).
//!
//! ```bash
//! counsel --config ./counsel.toml ingest
//! counsel --config ./counsel.toml ask "What does the Employment Code Act regulate?"
//! counsel --config ./counsel.toml stats
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use counsel_rag::config::{load_config, Config};
use counsel_rag::embedding::Embedder;
use counsel_rag::generation::{GenerationProvider, GoogleGenerationProvider};
use counsel_rag::index::InMemoryIndex;
use counsel_rag::pipeline::IngestionPipeline;
use counsel_rag::progress::ProgressMode;
use counsel_rag::rag::RagEngine;
use counsel_rag::storage::CorpusBucket;

/// Counsel RAG — retrieval-augmented question answering over a legal
/// document corpus.
#[derive(Parser)]
#[command(
    name = "counsel",
    about = "Retrieval-augmented question answering over a legal document corpus",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./counsel.toml")]
    config: PathBuf,

    /// Progress output: auto, human, json, or off.
    #[arg(long, global = true, default_value = "auto")]
    progress: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest the corpus: extract, chunk, embed, and index documents.
    Ingest {
        /// Process a single document (object name or document id)
        /// instead of the whole corpus.
        #[arg(long)]
        document: Option<String>,
    },

    /// Ask a question and print the answer with its cited sources.
    Ask {
        /// The question to answer.
        question: String,

        /// Number of passages to retrieve.
        #[arg(long)]
        top_k: Option<usize>,
    },

    /// Print corpus and index statistics.
    Stats,
}

fn progress_mode(flag: &str) -> ProgressMode {
    match flag {
        "human" => ProgressMode::Human,
        "json" => ProgressMode::Json,
        "off" => ProgressMode::Off,
        _ => ProgressMode::default_for_tty(),
    }
}

fn build_pipeline(config: &Config, mode: ProgressMode) -> Result<Arc<IngestionPipeline>> {
    let store = Arc::new(CorpusBucket::new(config.storage.clone())?);
    let embedder = Arc::new(Embedder::new(&config.embedding)?);
    let index = Arc::new(InMemoryIndex::new(config.embedding.dims));

    let pipeline = IngestionPipeline::new(
        store,
        embedder,
        index,
        config.chunking.clone(),
        config.pipeline.clone(),
        mode.reporter(),
    )?;
    Ok(Arc::new(pipeline))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;
    let mode = progress_mode(&cli.progress);

    match cli.command {
        Commands::Ingest { document } => {
            let pipeline = build_pipeline(&config, mode)?;
            let run = match document {
                Some(name) => pipeline.process_one(&name).await?,
                None => pipeline.process_all().await?,
            };

            println!("ingest");
            println!("  documents attempted: {}", run.documents_attempted);
            println!("  documents succeeded: {}", run.documents_succeeded);
            println!("  documents failed:    {}", run.documents_failed);
            println!("  chunks created:      {}", run.chunks_created);
            println!("  embeddings created:  {}", run.embeddings_created);
            println!("  elapsed:             {} ms", run.elapsed_ms);
            for failure in &run.failures {
                println!("  failed: {} ({})", failure.document, failure.reason);
            }
            if let Some(fatal) = &run.fatal_error {
                anyhow::bail!("run aborted: {}", fatal);
            }
            println!("ok");
        }

        Commands::Ask { question, top_k } => {
            // The pipeline and engine share one embedder and one index so
            // that ingest-on-demand fills the same index `ask` searches.
            let store = Arc::new(CorpusBucket::new(config.storage.clone())?);
            let embedder = Arc::new(Embedder::new(&config.embedding)?);
            let index = Arc::new(InMemoryIndex::new(config.embedding.dims));
            let generator: Box<dyn GenerationProvider> =
                Box::new(GoogleGenerationProvider::new(&config.generation)?);

            let pipeline = Arc::new(IngestionPipeline::new(
                store,
                embedder.clone(),
                index.clone(),
                config.chunking.clone(),
                config.pipeline.clone(),
                ProgressMode::Off.reporter(),
            )?);

            let engine = RagEngine::new(
                embedder,
                index,
                generator,
                pipeline,
                &config.retrieval,
            )?;

            let response = engine.ask(&question, top_k).await;

            println!("{}", response.answer);
            if !response.sources.is_empty() {
                println!();
                println!("Sources:");
                for (i, source) in response.sources.iter().enumerate() {
                    println!(
                        "  {}. {} (score {:.3})\n     {}",
                        i + 1,
                        source.title,
                        source.score,
                        source.content_preview
                    );
                }
            }
            println!();
            println!(
                "[{} chunks considered, {} ms, model {}]",
                response.metadata.chunks_considered,
                response.metadata.search_latency_ms,
                response.metadata.model
            );
        }

        Commands::Stats => {
            let pipeline = build_pipeline(&config, ProgressMode::Off)?;
            let stats = pipeline.stats().await?;
            println!("counsel — corpus stats");
            println!("  documents:  {}", stats.documents);
            println!("  chunks:     {}", stats.chunks);
            println!("  embeddings: {}", stats.embeddings);
        }
    }

    Ok(())
}
