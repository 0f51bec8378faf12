use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use hermes::config::Config;
use hermes::embed::{BiEncoder, Embedder};
use hermes::serving::{self, AppState};

#[derive(Parser)]
#[command(name = "hermes")]
#[command(about = "Semantic code search: hybrid retrieval plus neural reranking", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file
    #[arg(short, long, default_value = "hermes.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP serving surface
    Serve {
        /// Address to bind, e.g. 127.0.0.1:8080
        #[arg(long, default_value = "127.0.0.1:8080")]
        addr: String,

        /// Load an existing index from the configured artifacts directory on startup
        #[arg(long)]
        load_index: bool,
    },

    /// Build an index for a repository and exit
    BuildIndex {
        /// Repository root to scan
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "hermes=debug" } else { "hermes=info" };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = Config::from_file(&cli.config)?;

    match cli.command {
        Commands::Serve { addr, load_index } => {
            serve(config, addr, load_index).await?;
        }
        Commands::BuildIndex { path } => {
            build_index(config, path).await?;
        }
    }

    Ok(())
}

async fn serve(config: Config, addr: String, load_index: bool) -> Result<()> {
    info!("starting hermes serving surface on {addr}");

    let embedder: Arc<dyn Embedder> = Arc::new(BiEncoder::new(&config.embed.biencoder_model)?);
    let orchestrator = Arc::new(hermes::build::IndexBuildOrchestrator::new(embedder));
    let state = AppState::new(orchestrator, config.clone());

    if load_index {
        match serving::load_pipeline(&config).await {
            Ok(pipeline) => {
                *state.pipeline.write().await = Some(Arc::new(pipeline));
                info!("loaded existing index from {:?}", config.general.artifacts_dir);
            }
            Err(e) => {
                info!("no index loaded at startup: {e}");
            }
        }
    }

    let app = serving::router(state);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn build_index(config: Config, path: PathBuf) -> Result<()> {
    info!("indexing repository at {:?}", path);

    let embedder: Arc<dyn Embedder> = Arc::new(BiEncoder::new(&config.embed.biencoder_model)?);
    let orchestrator = hermes::build::IndexBuildOrchestrator::new(embedder);
    let artifacts_dir = config.general.artifacts_dir.clone();
    let summary = orchestrator.run(&path, &config, &artifacts_dir).await?;

    println!("Indexing complete");
    println!("  files scanned:   {}", summary.files_scanned);
    println!("  chunks produced: {}", summary.chunks_produced);
    println!("  total time:      {:.1}ms", summary.total_ms());

    Ok(())
}
