//! Synapse CLI
//!
//! Command-line interface for the semantic store and the policy gate.

use clap::{Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::path::Path;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use synapse_core::search::{Metadata, DEFAULT_RECENT_LIMIT, DEFAULT_SEARCH_K};
use synapse_core::{
    build_provider, ApiServer, AppState, EmbeddingProvider, Error, PolicyGate, Result,
    RocksRepository, SemanticStore, SynapseConfig, ToolCall,
};

#[derive(Parser)]
#[command(name = "synapse")]
#[command(author, version, about = "Synapse semantic memory and policy gate", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "synapse.toml")]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init {
        /// Output path for configuration file
        #[arg(short, long, default_value = "synapse.toml")]
        output: String,
    },

    /// Embed and store a document
    Ingest {
        /// Document id (generated when omitted)
        #[arg(long)]
        id: Option<String>,

        /// Document text
        #[arg(long)]
        text: String,

        /// Metadata as a JSON object
        #[arg(long)]
        metadata: Option<String>,
    },

    /// Semantic search over stored documents
    Search {
        query: String,

        /// Number of results
        #[arg(short, long, default_value_t = DEFAULT_SEARCH_K)]
        k: usize,
    },

    /// List the most recently stored documents
    Recent {
        #[arg(short, long, default_value_t = DEFAULT_RECENT_LIMIT)]
        limit: usize,
    },

    /// Show store statistics
    Stats,

    /// Delete a document by id
    Delete { id: String },

    /// Print a plain-text digest of recent documents
    Digest {
        #[arg(short, long, default_value_t = DEFAULT_RECENT_LIMIT)]
        limit: usize,
    },

    /// Check whether a URL may be fetched
    CanFetch { url: String },

    /// Check a tool name against the whitelist
    ValidateTool {
        name: String,

        /// Tool arguments as JSON (never inspected)
        #[arg(long, default_value = "{}")]
        args: String,
    },

    /// Check an MCP configuration file
    ValidateConfig { file: String },

    /// Start the HTTP API
    Serve {
        /// HTTP API listen address (overrides config)
        #[arg(long)]
        addr: Option<String>,
    },
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn load_config(path: &str) -> Result<SynapseConfig> {
    if Path::new(path).exists() {
        info!("Loading configuration from: {}", path);
        SynapseConfig::load(path)
    } else {
        info!("Using default configuration");
        Ok(SynapseConfig::default())
    }
}

fn open_store(config: &SynapseConfig) -> Result<SemanticStore> {
    let embedder = build_provider(&config.embedding)?;
    info!(
        provider = embedder.name(),
        dimensions = embedder.dimensions(),
        "Embedding provider ready"
    );
    let repository = RocksRepository::open(&config.store.path)?;
    Ok(SemanticStore::new(embedder, Arc::new(repository)))
}

fn parse_json<T: serde::de::DeserializeOwned>(raw: &str, what: &str) -> Result<T> {
    serde_json::from_str(raw).map_err(|e| Error::Validation(format!("Invalid {}: {}", what, e)))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    match cli.command {
        Commands::Init { output } => {
            info!("Initializing new configuration at: {}", output);
            let config = SynapseConfig::default();
            config.save(&output)?;
            info!("Configuration saved successfully");
        }

        Commands::Ingest { id, text, metadata } => {
            let config = load_config(&cli.config)?;
            let metadata: Option<Metadata> = metadata
                .as_deref()
                .map(|raw| parse_json(raw, "metadata"))
                .transpose()?;
            let id = id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

            let store = open_store(&config)?;
            store.store_document(&id, &text, metadata).await?;
            println!("{}", id);
        }

        Commands::Search { query, k } => {
            let config = load_config(&cli.config)?;
            let store = open_store(&config)?;
            let hits = match store.search(&query, k).await {
                Ok(hits) => hits,
                Err(e) => {
                    warn!("Search failed: {}", e);
                    Vec::new()
                }
            };
            for hit in hits {
                println!("{:.4}\t{}\t{}", hit.score, hit.document.id, hit.document.text);
            }
        }

        Commands::Recent { limit } => {
            let config = load_config(&cli.config)?;
            let store = open_store(&config)?;
            for doc in store.recent_documents(limit).await? {
                println!("{}\t{}\t{}", doc.timestamp, doc.id, doc.text);
            }
        }

        Commands::Stats => {
            let config = load_config(&cli.config)?;
            let store = open_store(&config)?;
            print_json(&store.stats().await?)?;
        }

        Commands::Delete { id } => {
            let config = load_config(&cli.config)?;
            let store = open_store(&config)?;
            if store.delete_document(&id).await? {
                info!("Deleted document {}", id);
            } else {
                error!("Document {} not found", id);
                std::process::exit(1);
            }
        }

        Commands::Digest { limit } => {
            let config = load_config(&cli.config)?;
            let store = open_store(&config)?;
            for line in store.digest(limit).await? {
                println!("{}", line);
            }
        }

        Commands::CanFetch { url } => {
            let config = load_config(&cli.config)?;
            let gate = PolicyGate::from_config(&config.policy)?;
            let decision = gate.can_fetch(&url).await;
            println!("{}", decision);
            if !decision.allowed {
                std::process::exit(2);
            }
        }

        Commands::ValidateTool { name, args } => {
            let config = load_config(&cli.config)?;
            let gate = PolicyGate::from_config(&config.policy)?;
            let call = ToolCall::new(name, parse_json(&args, "tool arguments")?);
            let decision = gate.validate_tool_call(&call);
            println!("{}", decision);
            if !decision.allowed {
                std::process::exit(2);
            }
        }

        Commands::ValidateConfig { file } => {
            let config = load_config(&cli.config)?;
            let gate = PolicyGate::from_config(&config.policy)?;
            let raw = std::fs::read_to_string(&file)?;
            let decision = gate.validate_mcp_config(&raw).await;
            println!("{}", decision);
            if !decision.allowed {
                std::process::exit(2);
            }
        }

        Commands::Serve { addr } => {
            info!("Starting Synapse API...");
            let config = load_config(&cli.config)?;
            let api_addr = addr.unwrap_or_else(|| config.api.listen_address.clone());

            let metrics = PrometheusBuilder::new()
                .install_recorder()
                .map_err(|e| Error::Api(format!("Failed to install metrics recorder: {}", e)))?;

            let store = Arc::new(open_store(&config)?);
            let gate = Arc::new(PolicyGate::from_config(&config.policy)?);
            let app_state = AppState::new(store, gate).with_metrics(metrics);

            let api_server = ApiServer::with_state(config.api.clone(), app_state);

            tokio::select! {
                result = api_server.run(&api_addr) => {
                    if let Err(e) = result {
                        error!("API server error: {}", e);
                        return Err(e);
                    }
                }
                _ = signal::ctrl_c() => {
                    info!("Received shutdown signal");
                }
            }
            info!("Synapse stopped");
        }
    }

    Ok(())
}
