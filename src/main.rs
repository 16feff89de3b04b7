//! docent CLI entry point

use clap::{Parser, Subcommand};
use docent::{
    answer::{create_generator, AnswerGenerator},
    api::{self, AppState},
    config::{Config, PathsConfig},
    embed::{create_embedder, Embedder},
    error::Result,
    ingest::IngestionService,
    jobs::JobStore,
    store::VectorStore,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "docent")]
#[command(version, about = "Self-hosted RAG backend: crawl, index, ask", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize docent configuration
    Init {
        /// Force overwrite existing config
        #[arg(long)]
        force: bool,
    },

    /// Run the HTTP API server
    Serve {
        /// Bind host (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// Bind port (overrides config)
        #[arg(long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    match cli.command {
        Commands::Init { force } => handle_init(cli.config, force),
        Commands::Serve { host, port } => {
            let config = load_config(cli.config.as_deref())?;
            serve(config, host, port).await
        }
    }
}

fn handle_init(config_arg: Option<PathBuf>, force: bool) -> Result<()> {
    // If the user names a .toml file, use it; a directory gets config.toml inside
    let (base_dir, config_path) = if let Some(path) = config_arg {
        if path.extension().map_or(false, |e| e == "toml") {
            let base = path
                .parent()
                .map(PathBuf::from)
                .unwrap_or_else(Config::default_base_dir);
            (base, path)
        } else {
            (path.clone(), path.join("config.toml"))
        }
    } else {
        let base = Config::default_base_dir();
        (base.clone(), base.join("config.toml"))
    };

    if config_path.exists() && !force {
        eprintln!(
            "Config file already exists at: {}\nUse --force to overwrite.",
            config_path.display()
        );
        std::process::exit(1);
    }

    let mut config = Config::default();
    config.paths = PathsConfig {
        config_file: config_path,
        db_file: base_dir.join("jobs.db"),
        base_dir,
    };
    config.save()?;

    println!("✓ docent initialized successfully");
    println!("  Config: {}", config.paths.config_file.display());
    println!("\nNext steps:");
    println!("  1. Edit the config to point at your embedding and generation backends");
    println!("  2. Start the server: docent serve");
    println!("  3. Ingest content: POST /api/ingest with {{\"urls\": [\"https://...\"]}}");

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let config_path = path
        .map(PathBuf::from)
        .unwrap_or_else(Config::default_config_path);

    if !config_path.exists() {
        eprintln!(
            "Config file not found: {}\nRun 'docent init' first.",
            config_path.display()
        );
        std::process::exit(1);
    }

    Config::load(&config_path)
}

async fn serve(mut config: Config, host: Option<String>, port: Option<u16>) -> Result<()> {
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    let jobs = JobStore::connect(&config.paths.db_file).await?;
    let store = Arc::new(VectorStore::new(config.embedding.dimension));
    let embedder: Arc<dyn Embedder> =
        Arc::from(create_embedder(&config.embedding, config.embedding_api_key())?);
    let generator = create_generator(&config.answer, config.generation_api_key())?;
    let answerer = Arc::new(AnswerGenerator::new(generator, &config.answer));
    let ingestion = Arc::new(IngestionService::new(
        &config,
        Arc::clone(&embedder),
        Arc::clone(&store),
        jobs.clone(),
    )?);

    info!(
        "Starting docent {} (embedding: {}, generation: {})",
        env!("CARGO_PKG_VERSION"),
        config.embedding.model,
        config.answer.model
    );

    let state = AppState::new(
        ingestion,
        store,
        embedder,
        answerer,
        jobs,
        config.answer.min_confidence,
    );
    api::serve(state, &config.server.host, config.server.port).await
}
