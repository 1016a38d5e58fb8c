// ============================================================================
// memberqa - CLI for the member question answering engine
// ============================================================================
// Usage:
//   memberqa ingest [--refresh]      Fetch the message corpus into the cache
//   memberqa ask "QUESTION" [--json] Answer a question about a member
//   memberqa members                 List members found in the cached corpus
//   memberqa stats                   Show corpus statistics
//
// Environment (a .env file is honored):
//   OPENAI_API_KEY                   API key for embeddings + generation
//   MEMBERQA_API_URL                 Upstream message API base URL
//   MEMBERQA_BASE_URL                OpenAI-compatible API base URL
//   MEMBERQA_EMBED_MODEL / MEMBERQA_CHAT_MODEL
//   MEMBERQA_QDRANT_URL              Use Qdrant instead of the in-memory store
//   MEMBERQA_CACHE                   Message cache file path
// ============================================================================

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use memberqa_core::{
    ingest, CorpusSnapshot, EmbeddingProvider, InMemoryStore, LanguageModel, OpenAiChat,
    OpenAiEmbeddings, QaConfig, QaEngine, QdrantStore, VectorStore,
};

/// Default upstream message API
const DEFAULT_API_URL: &str = "https://november7-730026606190.europe-west1.run.app/messages";

/// Vector dimension of the default embedding model
const DEFAULT_EMBED_DIM: usize = 1536;

/// Member question answering over message history
#[derive(Parser)]
#[command(name = "memberqa", version, about = "Ask questions about members, grounded in their message history")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch the message corpus from the upstream API into the local cache
    Ingest {
        /// Re-fetch even if a cache file exists
        #[arg(long)]
        refresh: bool,
    },

    /// Answer a question about a member
    Ask {
        /// The natural-language question
        question: String,

        /// Print the full answer envelope as JSON
        #[arg(long)]
        json: bool,
    },

    /// List members found in the cached corpus
    Members,

    /// Show corpus statistics
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Ingest { refresh } => cmd_ingest(refresh).await,
        Commands::Ask { question, json } => cmd_ask(&question, json).await,
        Commands::Members => cmd_members().await,
        Commands::Stats => cmd_stats().await,
    }
}

fn api_url() -> String {
    std::env::var("MEMBERQA_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string())
}

fn cache_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("MEMBERQA_CACHE") {
        return Ok(PathBuf::from(path));
    }
    let base = dirs::data_dir().ok_or_else(|| anyhow!("Could not determine data directory"))?;
    Ok(base.join("memberqa").join("messages.json"))
}

fn api_key() -> Result<String> {
    std::env::var("OPENAI_API_KEY")
        .context("OPENAI_API_KEY not set. Add it to the environment or a .env file")
}

fn embeddings_provider() -> Result<OpenAiEmbeddings> {
    let key = api_key()?;
    let provider = match std::env::var("MEMBERQA_BASE_URL") {
        Ok(base) => {
            let model = std::env::var("MEMBERQA_EMBED_MODEL")
                .unwrap_or_else(|_| memberqa_core::providers::DEFAULT_EMBEDDING_MODEL.to_string());
            OpenAiEmbeddings::with_base_url(key, base, model)
        }
        Err(_) => OpenAiEmbeddings::new(key),
    };
    Ok(provider)
}

fn chat_provider() -> Result<OpenAiChat> {
    let key = api_key()?;
    let chat = match std::env::var("MEMBERQA_BASE_URL") {
        Ok(base) => {
            let model = std::env::var("MEMBERQA_CHAT_MODEL")
                .unwrap_or_else(|_| memberqa_core::providers::DEFAULT_CHAT_MODEL.to_string());
            OpenAiChat::with_base_url(key, base, model)
        }
        Err(_) => OpenAiChat::new(key),
    };
    Ok(chat)
}

async fn vector_store() -> Result<Arc<dyn VectorStore>> {
    match std::env::var("MEMBERQA_QDRANT_URL") {
        Ok(url) => {
            let dim = match std::env::var("MEMBERQA_EMBED_DIM") {
                Ok(v) => v.parse().context("MEMBERQA_EMBED_DIM must be a number")?,
                Err(_) => DEFAULT_EMBED_DIM,
            };
            info!("Using Qdrant store at {}", url);
            Ok(Arc::new(QdrantStore::new(&url, dim).await?))
        }
        Err(_) => {
            info!("Using in-memory vector store");
            Ok(Arc::new(InMemoryStore::new()))
        }
    }
}

async fn load_snapshot() -> Result<CorpusSnapshot> {
    let messages = ingest::load_messages(&api_url(), &cache_path()?, false).await?;
    CorpusSnapshot::build(messages, 0).map_err(Into::into)
}

async fn cmd_ingest(refresh: bool) -> Result<()> {
    let cache = cache_path()?;
    let messages = ingest::load_messages(&api_url(), &cache, refresh).await?;
    println!(
        "{} messages cached at {}",
        messages.len(),
        cache.display()
    );
    Ok(())
}

async fn cmd_ask(question: &str, json: bool) -> Result<()> {
    let messages = ingest::load_messages(&api_url(), &cache_path()?, false).await?;

    let embeddings: Arc<dyn EmbeddingProvider> = Arc::new(embeddings_provider()?);
    let llm: Arc<dyn LanguageModel> = Arc::new(chat_provider()?);
    let store = vector_store().await?;
    let config = QaConfig::from_env()?;

    let engine = QaEngine::new(messages, embeddings, store, llm, config).await?;
    let envelope = engine.answer(question).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&envelope)?);
    } else {
        println!("{}", envelope.answer_text);
    }
    Ok(())
}

async fn cmd_members() -> Result<()> {
    let snapshot = load_snapshot().await?;
    for member in snapshot.members() {
        println!("{}  ({})", member.name, member.id);
    }
    Ok(())
}

async fn cmd_stats() -> Result<()> {
    let snapshot = load_snapshot().await?;
    println!("=== MemberQA Corpus Stats ===");
    println!("Messages: {}", snapshot.message_count());
    println!("Members:  {}", snapshot.members().len());
    Ok(())
}
