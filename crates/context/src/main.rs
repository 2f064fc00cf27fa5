//! DocQA Context Engine
//!
//! Answers questions against the indexed documents:
//! - Loads the index snapshot written by the ingestion service
//! - Runs each question through the reasoning pipeline
//! - Prints one JSON answer per question
//!
//! `context [--top-k N] [--style concise|detailed|bullet] [question...]`
//! answers a single question, or reads one question per line from stdin.

use anyhow::Context;
use clap::Parser;
use docqa_common::config::{AppConfig, ObservabilityConfig};
use docqa_common::embeddings::create_embedder;
use docqa_common::index::InMemoryIndex;
use docqa_common::llm::create_language_model;
use docqa_common::{metrics, AnswerStyle, Embedder, LanguageModel, Pipeline, RetrievalIndex, VERSION};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, info_span, Instrument};
use tracing_subscriber::EnvFilter;

/// Grounded question answering over the document index
#[derive(Parser, Debug)]
#[command(name = "context", version, about, long_about = None)]
struct Cli {
    /// Question to answer (reads one per line from stdin if omitted)
    question: Vec<String>,

    /// Passages to retrieve (defaults to pipeline.default_top_k)
    #[arg(short = 'k', long)]
    top_k: Option<usize>,

    /// Answer style: concise, detailed, bullet
    #[arg(short, long, default_value = "concise")]
    style: AnswerStyle,
}

impl Cli {
    fn question(&self) -> Option<String> {
        (!self.question.is_empty()).then(|| self.question.join(" "))
    }
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

async fn answer(pipeline: &Pipeline, question: &str, top_k: usize, style: AnswerStyle) -> anyhow::Result<()> {
    let answer = pipeline.ask(question, top_k, style).await;
    println!("{}", serde_json::to_string(&answer)?);
    Ok(())
}

async fn run(config: AppConfig, cli: Cli) -> anyhow::Result<()> {
    let top_k = cli.top_k.unwrap_or(config.pipeline.default_top_k);

    if config.observability.metrics_port > 0 {
        let addr = SocketAddr::from(([0, 0, 0, 0], config.observability.metrics_port));
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("Failed to install Prometheus exporter")?;
        metrics::register_metrics();
        info!(%addr, "Metrics exporter listening");
    }

    let index = Arc::new(InMemoryIndex::load(&config.index.snapshot_path, &config.index.collection).await?);
    let embedder = create_embedder(&config.embedding)?;
    let llm = create_language_model(&config.llm)?;

    info!(
        chunks = index.count().await?,
        embedder = embedder.model_name(),
        llm = llm.model_name(),
        "Context Engine ready"
    );

    let pipeline = Pipeline::new(embedder, index, llm, config.pipeline.clone());

    if let Some(question) = cli.question() {
        return answer(&pipeline, &question, top_k, cli.style).await;
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let question = line.trim();
                if question.is_empty() {
                    continue;
                }
                answer(&pipeline, question, top_k, cli.style).await?;
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    info!("Context Engine shutting down");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load environment variables
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("Failed to load configuration")?;
    init_tracing(&config.observability);

    info!("Starting DocQA Context Engine v{}", VERSION);

    let span = info_span!("service", name = %config.observability.service_name);
    run(config, cli).instrument(span).await
}
