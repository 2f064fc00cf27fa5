//! DocQA Ingestion
//!
//! Maintains the document index snapshot:
//! - `ingestion ingest <file|dir>...` indexes text files
//! - `ingestion list` prints the indexed documents
//! - `ingestion delete <document-id>` removes one document
//! - `ingestion clear` removes everything

use anyhow::Context;
use clap::{Parser, Subcommand};
use docqa_common::config::{AppConfig, ObservabilityConfig};
use docqa_common::embeddings::create_embedder;
use docqa_common::errors::AppError;
use docqa_common::index::InMemoryIndex;
use docqa_common::{RetrievalIndex, VERSION};
use docqa_ingestion::IngestionProcessor;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, info_span, Instrument};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// Segment, embed and index documents
#[derive(Parser, Debug)]
#[command(name = "ingestion", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Command {
    /// Index text files or every file in the given directories
    Ingest {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Print the indexed documents as JSON lines
    List,
    /// Remove one document and all its passages
    Delete { document_id: Uuid },
    /// Remove every document
    Clear,
}

fn init_tracing(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    if config.json_logging {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(config: AppConfig, command: Command) -> anyhow::Result<()> {
    let snapshot = config.index.snapshot_path.as_path();
    let index = Arc::new(InMemoryIndex::load(snapshot, &config.index.collection).await?);

    match command {
        Command::List => {
            for document in index.list_documents().await? {
                println!("{}", serde_json::to_string(&document)?);
            }
            return Ok(());
        }
        Command::Delete { document_id } => {
            if index.delete(document_id).await? == 0 {
                return Err(AppError::DocumentNotFound {
                    id: document_id.to_string(),
                }
                .into());
            }
        }
        Command::Clear => {
            let removed = index.clear().await?;
            println!("{}", serde_json::json!({ "removed_chunks": removed }));
        }
        Command::Ingest { paths } => {
            let embedder = create_embedder(&config.embedding)?;
            let processor = IngestionProcessor::new(embedder, index.clone(), &config);

            for path in paths {
                let results = if path.is_dir() {
                    processor.ingest_directory(&path).await?
                } else {
                    match processor.ingest_file(&path).await {
                        Ok(outcome) => vec![(path, outcome)],
                        Err(e) => {
                            error!(
                                path = %path.display(),
                                error = %e,
                                code = ?e.code(),
                                transient = e.is_transient(),
                                "Failed to ingest file"
                            );
                            continue;
                        }
                    }
                };

                for (path, outcome) in results {
                    println!(
                        "{}",
                        serde_json::json!({ "path": path.display().to_string(), "outcome": outcome })
                    );
                }
            }
        }
    }

    index.persist(snapshot).await?;
    info!(
        path = %snapshot.display(),
        chunks = index.count().await?,
        "Index snapshot saved"
    );

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load environment variables
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("Failed to load configuration")?;
    init_tracing(&config.observability);

    info!("Starting DocQA Ingestion v{}", VERSION);

    let span = info_span!("service", name = %config.observability.service_name);
    run(config, cli.command).instrument(span).await
}
