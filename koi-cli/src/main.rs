//! `koi`: chat with your documents from the terminal.
//!
//! ```text
//! koi data/                      # index every .txt/.docx/.pdf in data/
//! koi handbook.pdf --mode agentic
//! koi --load-index koi-index.json
//! ```
//!
//! Requires `GOOGLE_API_KEY` or `GEMINI_API_KEY` (a `.env` file is read if present).

mod repl;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Parser, ValueEnum};
use koi_chat::{AnswerMode, ChatConfig, PromptTemplates, Session};
use koi_model::GeminiModel;
use koi_rag::{FileBlob, GeminiEmbeddingProvider, RagConfig, RagPipeline, RetrievalStrategy};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "koi", version, about = "Ask questions about your documents", long_about = None)]
struct Args {
    /// Files, or a single directory, to index at startup
    #[arg(value_name = "PATH")]
    paths: Vec<PathBuf>,

    /// Gemini API key (falls back to GEMINI_API_KEY)
    #[arg(long, env = "GOOGLE_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Completion model
    #[arg(long, env = "KOI_MODEL", default_value = "gemini-2.5-flash")]
    model: String,

    /// Embedding model
    #[arg(long, env = "KOI_EMBEDDING_MODEL", default_value = "gemini-embedding-001")]
    embedding_model: String,

    /// How answers are produced
    #[arg(long, value_enum, default_value_t = ModeArg::Fixed)]
    mode: ModeArg,

    /// Retrieval ranking
    #[arg(long, value_enum, default_value_t = StrategyArg::Hybrid)]
    retrieval: StrategyArg,

    #[arg(long, default_value_t = 1000)]
    chunk_size: usize,

    #[arg(long, default_value_t = 200)]
    chunk_overlap: usize,

    /// Chunks retrieved per question
    #[arg(long, default_value_t = 5)]
    top_k: usize,

    #[arg(long, default_value_t = 0.1)]
    temperature: f32,

    /// Seconds to wait for the model and embedding service
    #[arg(long, default_value_t = 60)]
    timeout: u64,

    /// JSON file overriding the built-in prompts
    #[arg(long)]
    prompts: Option<PathBuf>,

    /// Restore a previously saved index instead of indexing PATHs
    #[arg(long, conflicts_with = "paths")]
    load_index: Option<PathBuf>,

    /// Save the index after indexing
    #[arg(long)]
    save_index: Option<PathBuf>,

    /// Log JSON lines to stderr
    #[arg(long)]
    log_json: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ModeArg {
    Fixed,
    Agentic,
}

impl From<ModeArg> for AnswerMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Fixed => AnswerMode::FixedPipeline,
            ModeArg::Agentic => AnswerMode::Agentic,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum StrategyArg {
    Hybrid,
    Dense,
    Keyword,
}

impl From<StrategyArg> for RetrievalStrategy {
    fn from(strategy: StrategyArg) -> Self {
        match strategy {
            StrategyArg::Hybrid => RetrievalStrategy::default(),
            StrategyArg::Dense => RetrievalStrategy::DenseOnly,
            StrategyArg::Keyword => RetrievalStrategy::SparseOnly,
        }
    }
}

/// Telemetry goes to stderr; stdout carries the conversation.
fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("koi=info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.with_target(false).init();
    }
}

fn build_session(args: &Args, api_key: &str) -> anyhow::Result<Session> {
    let rag_config = RagConfig::builder()
        .chunk_size(args.chunk_size)
        .chunk_overlap(args.chunk_overlap)
        .top_k(args.top_k)
        .retrieval(args.retrieval.into())
        .service_timeout_secs(args.timeout)
        .build()?;

    let embeddings = GeminiEmbeddingProvider::with_model(api_key, args.embedding_model.as_str())?;
    let pipeline = RagPipeline::builder()
        .config(rag_config)
        .embedding_provider(Arc::new(embeddings))
        .build()?;

    let chat_config = ChatConfig::builder()
        .mode(args.mode.into())
        .temperature(Some(args.temperature))
        .service_timeout_secs(args.timeout)
        .build()?;

    let templates = match &args.prompts {
        Some(path) => PromptTemplates::from_json_file(path)
            .with_context(|| format!("failed to load prompts from {}", path.display()))?,
        None => PromptTemplates::default(),
    };

    let llm = GeminiModel::new(api_key, &args.model)?;
    let session = Session::builder()
        .config(chat_config)
        .templates(templates)
        .llm(Arc::new(llm))
        .pipeline(pipeline)
        .build()?;
    Ok(session)
}

async fn index_paths(session: &mut Session, paths: &[PathBuf]) -> anyhow::Result<()> {
    if let [dir] = paths {
        if dir.is_dir() {
            println!("Indexing {}...", dir.display());
            repl::print_report(session.ingest_directory(dir).await);
            return Ok(());
        }
    }

    let blobs = paths
        .iter()
        .map(|path| {
            FileBlob::from_path(path).with_context(|| format!("failed to read {}", path.display()))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    println!("Indexing {} file(s)...", blobs.len());
    repl::print_report(session.ingest(&blobs).await);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    init_logging(args.log_json);

    let Some(api_key) = args.api_key.clone().or_else(|| std::env::var("GEMINI_API_KEY").ok())
    else {
        bail!(
            "GOOGLE_API_KEY or GEMINI_API_KEY must be set.\n\
             Get a key at https://aistudio.google.com/apikey"
        );
    };

    let mut session = build_session(&args, &api_key)?;
    info!(session = %session.id(), model = %args.model, "koi ready");

    if let Some(path) = &args.load_index {
        let chunks = session.load_index(path).await?;
        println!("Loaded {chunks} chunks from {}.", path.display());
    } else if !args.paths.is_empty() {
        index_paths(&mut session, &args.paths).await?;
        if let (Some(path), Some(_)) = (&args.save_index, session.knowledge_base()) {
            session.save_index(path)?;
            println!("Index saved to {}.", path.display());
        }
    }

    repl::run(&mut session).await
}
