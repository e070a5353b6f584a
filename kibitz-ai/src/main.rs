//! kibitz-ai - chess game analysis service
//!
//! Accepts PGN uploads, splits bulk submissions into one analysis job per
//! game, and runs each job against a generative model, either inline or
//! through a managed task queue.

use anyhow::{Context, Result};
use clap::Parser;
use kibitz_common::api::resolve_shared_secret;
use kibitz_common::config::{
    ensure_directory_exists, resolve_bind_address, resolve_data_folder, resolve_dispatch_mode,
    DispatchMode, TomlConfig,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use kibitz_ai::config::{resolve_model_settings, resolve_queue_settings};
use kibitz_ai::services::{
    AnalysisModel, AnalysisWorker, Dispatcher, GeminiClient, InlineDispatcher, LocalObjectStorage,
    ObjectStorage, QueueDispatcher,
};
use kibitz_ai::{build_router, AppState};

const MODULE_NAME: &str = "kibitz-ai";

/// Command line arguments
#[derive(Debug, Parser)]
#[command(name = "kibitz-ai", version, about = "Chess game analysis service")]
struct Args {
    /// Path to the TOML config file
    #[arg(long, env = "KIBITZ_CONFIG")]
    config: Option<PathBuf>,

    /// Folder holding the database and uploaded files
    #[arg(long)]
    data_folder: Option<PathBuf>,

    /// HTTP listen address, e.g. 127.0.0.1:5740
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Config is needed before tracing for the log level; its own logging is lost
    let toml_config = TomlConfig::load_for_module(args.config.as_deref(), MODULE_NAME)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&toml_config.logging.level)),
        )
        .init();

    info!(
        "Starting kibitz-ai v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let data_folder = resolve_data_folder(args.data_folder, &toml_config)?;
    ensure_directory_exists(&data_folder)?;
    let bind_address = resolve_bind_address(args.bind, &toml_config)?;
    let dispatch_mode = resolve_dispatch_mode(&toml_config)?;

    let db_path = data_folder.join("kibitz.db");
    info!("Database: {}", db_path.display());
    let db_pool = kibitz_ai::db::init_database_pool(&db_path).await?;
    kibitz_ai::db::settings::set_max_lock_wait_ms(&db_pool, toml_config.database.max_lock_wait_ms)
        .await?;
    info!("Database connection established");

    let shared_secret = resolve_shared_secret(&db_pool, &toml_config)
        .await
        .context("Failed to resolve shared secret")?;
    if shared_secret == 0 {
        info!("API authentication disabled (shared_secret = 0)");
    }

    // Collaborators are built once here and shared through AppState
    let storage: Arc<dyn ObjectStorage> =
        Arc::new(LocalObjectStorage::new(data_folder.join("uploads")));

    let model: Arc<dyn AnalysisModel> = Arc::new(
        GeminiClient::new(resolve_model_settings(&toml_config)?)
            .context("Failed to build model client")?,
    );
    let worker = Arc::new(AnalysisWorker::new(db_pool.clone(), model));

    let dispatcher: Arc<dyn Dispatcher> = match dispatch_mode {
        DispatchMode::Inline => {
            info!("Dispatch mode: inline");
            Arc::new(InlineDispatcher::new(Arc::clone(&worker)))
        }
        DispatchMode::Queue => {
            let settings = resolve_queue_settings(&toml_config, shared_secret)?;
            info!("Dispatch mode: queue ({})", settings.queue_url);
            Arc::new(QueueDispatcher::new(settings).context("Failed to build queue client")?)
        }
    };

    let state = AppState::new(db_pool, storage, dispatcher, worker, shared_secret);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", bind_address))?;
    info!("Listening on http://{}", bind_address);
    info!("Health check: http://{}/health", bind_address);

    axum::serve(listener, app).await?;

    Ok(())
}
