//! `saga` — semantic passage search over registered vector stores.
//!
//! The CLI is a thin presentation layer: it parses arguments and config,
//! dispatches blocking core calls onto worker threads with a deadline, and
//! formats results. All retrieval semantics live in the core crates.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use saga_core::{SagaError, SagaResult};
use saga_registry::StoreRegistry;
use saga_retrieval::{HttpCrossEncoderScorer, RerankAdapter, TwoStageRetriever};
use saga_store::{EmbeddingIndex, EmbeddingProducer, HashEmbedding, HttpEmbeddingProducer};
use serde::Deserialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod dispatch;
mod display;

#[derive(Parser)]
#[command(name = "saga", about = "saga — semantic passage search with two-stage retrieval")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "saga.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search a store for passages matching a query
    Search {
        /// Search query text
        query: String,
        /// Store name, or "default"
        #[arg(long, default_value = "default")]
        store: String,
        /// Stage-1 candidate count (overrides config)
        #[arg(long)]
        initial_k: Option<usize>,
        /// Final result count after reranking (overrides config)
        #[arg(long)]
        final_k: Option<usize>,
        /// Skip the reranking pass
        #[arg(long)]
        no_rerank: bool,
        /// Only show hits whose metadata location matches
        #[arg(long)]
        location: Option<String>,
        /// Only show hits whose metadata character list matches
        #[arg(long)]
        character: Option<String>,
    },
    /// Manage registered stores
    Stores {
        #[command(subcommand)]
        action: StoresAction,
    },
    /// Show store statistics
    Stats {
        /// Store name, or "default"
        #[arg(long, default_value = "default")]
        store: String,
    },
}

#[derive(Subcommand)]
enum StoresAction {
    /// List registered stores
    List,
    /// Register an existing collection file under a name
    Register {
        /// Unique store name
        name: String,
        /// Path to the collection file
        path: PathBuf,
        /// Origin tag (e.g. "neptune", "chat", "llama-server")
        #[arg(long)]
        source_type: String,
        /// Human-readable description
        #[arg(long)]
        description: Option<String>,
        /// Record count (detected from the file when omitted)
        #[arg(long)]
        records: Option<usize>,
    },
    /// Rename a registered store
    Rename {
        /// Current name
        old: String,
        /// New name
        new: String,
    },
    /// Set the default store
    SetDefault {
        /// Store name
        name: String,
    },
    /// Remove a store from the registry (the collection file is kept)
    Delete {
        /// Store name
        name: String,
    },
}

// --- Config ---

#[derive(Deserialize, Default)]
struct SagaConfig {
    #[serde(default)]
    registry: RegistryConfig,
    #[serde(default)]
    embedding: EmbeddingConfig,
    #[serde(default)]
    rerank: RerankConfig,
    #[serde(default)]
    search: SearchConfig,
}

#[derive(Deserialize)]
struct RegistryConfig {
    #[serde(default = "default_registry_root")]
    root: PathBuf,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            root: default_registry_root(),
        }
    }
}

#[derive(Deserialize)]
struct EmbeddingConfig {
    /// OpenAI-compatible embeddings endpoint; the local hash producer is
    /// used when absent.
    #[serde(default)]
    endpoint: Option<String>,
    #[serde(default = "default_embedding_model")]
    model: String,
    #[serde(default = "default_dimension")]
    dimension: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            model: default_embedding_model(),
            dimension: default_dimension(),
        }
    }
}

#[derive(Deserialize)]
struct RerankConfig {
    /// Rerank endpoint; reranking degrades to embedding-only when absent.
    #[serde(default)]
    endpoint: Option<String>,
    #[serde(default = "default_rerank_model")]
    model: String,
    #[serde(default = "default_batch_size")]
    batch_size: usize,
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            model: default_rerank_model(),
            batch_size: default_batch_size(),
        }
    }
}

#[derive(Deserialize)]
struct SearchConfig {
    #[serde(default = "default_initial_k")]
    initial_k: usize,
    #[serde(default = "default_final_k")]
    final_k: usize,
    #[serde(default = "default_search_timeout")]
    search_timeout_secs: u64,
    #[serde(default = "default_rerank_timeout")]
    rerank_timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            initial_k: default_initial_k(),
            final_k: default_final_k(),
            search_timeout_secs: default_search_timeout(),
            rerank_timeout_secs: default_rerank_timeout(),
        }
    }
}

fn default_registry_root() -> PathBuf {
    PathBuf::from("./data/stores")
}
fn default_embedding_model() -> String {
    "all-MiniLM-L6-v2".to_string()
}
fn default_dimension() -> usize {
    384
}
fn default_rerank_model() -> String {
    "bge-reranker-v2-m3".to_string()
}
fn default_batch_size() -> usize {
    32
}
fn default_initial_k() -> usize {
    50
}
fn default_final_k() -> usize {
    10
}
fn default_search_timeout() -> u64 {
    30
}
fn default_rerank_timeout() -> u64 {
    60
}

fn load_config(path: &Path) -> anyhow::Result<SagaConfig> {
    if !path.exists() {
        return Ok(SagaConfig::default());
    }
    let data = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read config {}: {}", path.display(), e))?;
    toml::from_str(&data)
        .map_err(|e| anyhow::anyhow!("failed to parse config {}: {}", path.display(), e))
}

/// Builds the rerank adapter from config, failing when no endpoint is
/// configured. The failure is what flips the retriever into its permanent
/// embedding-only state.
fn build_adapter(
    endpoint: Option<String>,
    model: String,
    batch_size: usize,
) -> SagaResult<RerankAdapter> {
    let endpoint = endpoint.ok_or_else(|| {
        SagaError::Unavailable("no rerank endpoint configured".to_string())
    })?;
    let scorer = HttpCrossEncoderScorer::new(endpoint, model);
    Ok(RerankAdapter::new(Box::new(scorer)).with_batch_size(batch_size))
}

fn build_embedder(config: &EmbeddingConfig) -> Box<dyn EmbeddingProducer> {
    match &config.endpoint {
        Some(endpoint) => Box::new(HttpEmbeddingProducer::new(
            endpoint.clone(),
            config.model.clone(),
            config.dimension,
        )),
        None => Box::new(HashEmbedding::new(config.dimension)),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Search {
            query,
            store,
            initial_k,
            final_k,
            no_rerank,
            location,
            character,
        } => {
            let query = display::format_search_query(&query).map_err(|e| anyhow::anyhow!(e))?;
            let initial_k = initial_k.unwrap_or(config.search.initial_k);
            let final_k = final_k.unwrap_or(config.search.final_k);
            let deadline = Duration::from_secs(if no_rerank {
                config.search.search_timeout_secs
            } else {
                config.search.rerank_timeout_secs
            });

            let root = config.registry.root.clone();
            let embedding = config.embedding;
            let rerank = config.rerank;
            let closure_query = query.clone();

            let mut result = dispatch::run_with_deadline(deadline, move || {
                let registry = StoreRegistry::open(&root)?;
                let meta = registry.get(&store)?;
                let index = EmbeddingIndex::load(&meta.path)?;
                info!(store = %meta.name, records = index.len(), "Searching store");

                let embedder = build_embedder(&embedding);
                let query_vector = embedder.embed(&closure_query)?;

                let retriever = if no_rerank {
                    TwoStageRetriever::disabled("disabled by --no-rerank")
                } else {
                    TwoStageRetriever::new(build_adapter(
                        rerank.endpoint,
                        rerank.model,
                        rerank.batch_size,
                    ))
                };
                retriever.retrieve(&index, &closure_query, &query_vector, initial_k, final_k)
            })
            .await?;

            result.hits =
                display::apply_filters(result.hits, location.as_deref(), character.as_deref());
            println!("{}", display::render_results(&result, &query));
        }

        Commands::Stats { store } => {
            let root = config.registry.root.clone();
            let deadline = Duration::from_secs(config.search.search_timeout_secs);
            let (meta, stats) = dispatch::run_with_deadline(deadline, move || {
                let registry = StoreRegistry::open(&root)?;
                let meta = registry.get(&store)?;
                let index = EmbeddingIndex::load(&meta.path)?;
                let stats = index.stats()?;
                Ok((meta, stats))
            })
            .await?;

            println!("Store:       {}", meta.name);
            println!("Path:        {}", meta.path.display());
            println!("Records:     {}", stats.record_count);
            println!("Disk size:   {:.1} MB", stats.disk_size as f64 / 1024.0 / 1024.0);
            println!("Cache size:  {:.1} MB", stats.cache_size as f64 / 1024.0 / 1024.0);
        }

        Commands::Stores { action } => {
            let root = config.registry.root.clone();
            match action {
                StoresAction::List => {
                    let (stores, default) = dispatch::run_blocking(move || {
                        let registry = StoreRegistry::open(&root)?;
                        Ok((registry.list(), registry.get_default()))
                    })
                    .await?;
                    print!("{}", display::render_store_table(&stores, default.as_deref()));
                }
                StoresAction::Register {
                    name,
                    path,
                    source_type,
                    description,
                    records,
                } => {
                    let meta = dispatch::run_blocking(move || {
                        let mut registry = StoreRegistry::open(&root)?;
                        registry.register(&name, &path, &source_type, description, records)
                    })
                    .await?;
                    println!("Registered '{}' ({} records)", meta.name, meta.record_count);
                }
                StoresAction::Rename { old, new } => {
                    let renamed = new.clone();
                    dispatch::run_blocking(move || {
                        let mut registry = StoreRegistry::open(&root)?;
                        registry.rename(&old, &new)
                    })
                    .await?;
                    println!("Renamed to '{renamed}'");
                }
                StoresAction::SetDefault { name } => {
                    let set = name.clone();
                    dispatch::run_blocking(move || {
                        let mut registry = StoreRegistry::open(&root)?;
                        registry.set_default(&name)
                    })
                    .await?;
                    println!("Default store is now '{set}'");
                }
                StoresAction::Delete { name } => {
                    let deleted = name.clone();
                    dispatch::run_blocking(move || {
                        let mut registry = StoreRegistry::open(&root)?;
                        registry.delete(&name)
                    })
                    .await?;
                    println!("Unregistered '{deleted}' (collection file kept)");
                }
            }
        }
    }

    Ok(())
}
