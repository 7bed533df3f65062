//! jotter-api - HTTP API server for jotter.

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use jotter_api::{router, ApiConfig, AppState};
use jotter_db::{create_pool_with_config, Database, FilesystemBackend, PoolConfig, StorageBackend};
use jotter_inference::{
    GenerationBackend, OllamaBackend, OllamaVisionBackend, TranscriptionBackend, VisionBackend,
    WhisperBackend,
};
use jotter_jobs::scheduler::{self, SchedulerConfig};
use jotter_jobs::{
    DescribeImageHandler, ExtractEntitiesHandler, TaggingHandler, TranscribeAudioHandler,
    WorkerBuilder, WorkerConfig,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let _file_guard = init_logging();

    let config = ApiConfig::from_env()?;

    // Connect to database
    info!("Connecting to database...");
    let pool = create_pool_with_config(&config.database_url, PoolConfig::from_env()).await?;
    let db = Database::new(pool);
    info!("Database connected");

    info!("Running database migrations...");
    db.migrate().await?;
    info!("Database migrations complete");

    // Object store
    let filesystem = FilesystemBackend::new(&config.object_store_path);
    filesystem.validate().await.with_context(|| {
        format!(
            "object store at {} is not writable",
            config.object_store_path.display()
        )
    })?;
    let storage: Arc<dyn StorageBackend> = Arc::new(filesystem);
    info!(path = %config.object_store_path.display(), "Object store initialized");

    // Inference backends; speech and vision are optional
    let ollama = OllamaBackend::from_env();
    if !ollama.health_check().await.unwrap_or(false) {
        warn!(url = %ollama.base_url(), "Ollama unreachable; extraction jobs will retry until it is up");
    }
    let generation: Arc<dyn GenerationBackend> = Arc::new(ollama);
    let transcription: Option<Arc<dyn TranscriptionBackend>> = WhisperBackend::from_env()
        .map(|b| Arc::new(b) as Arc<dyn TranscriptionBackend>);
    let vision: Option<Arc<dyn VisionBackend>> =
        OllamaVisionBackend::from_env().map(|b| Arc::new(b) as Arc<dyn VisionBackend>);
    if transcription.is_none() {
        warn!("WHISPER_BASE_URL not set; audio notes will be stored without transcripts");
    }
    if vision.is_none() {
        warn!("OLLAMA_VISION_MODEL not set; image notes will be stored without descriptions");
    }

    // Pipeline worker
    let worker = WorkerBuilder::new(Arc::new(db.jobs.clone()))
        .with_config(WorkerConfig::from_env())
        .with_wakeup(db.jobs.job_notify())
        .with_handler(TranscribeAudioHandler::new(
            db.clone(),
            storage.clone(),
            transcription,
        ))
        .with_handler(DescribeImageHandler::new(db.clone(), storage.clone(), vision))
        .with_handler(ExtractEntitiesHandler::new(db.clone(), generation.clone()))
        .with_handler(TaggingHandler::new(db.clone(), generation))
        .build();
    let worker_handle = worker.start();

    // Recurrence and retention
    let scheduler_handle = scheduler::start(db.pool.clone(), SchedulerConfig::from_env()?);

    let addr = config.bind_addr()?;
    let app = router(AppState::new(db, storage, config));

    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped; draining background tasks");
    scheduler_handle.shutdown().await;
    worker_handle.shutdown().await?;
    Ok(())
}

/// Initialize tracing with configurable output.
///
/// Environment variables:
///   LOG_FORMAT  - "json" or "text" (default: "text")
///   LOG_FILE    - path to log file (optional, enables file logging)
///   LOG_ANSI    - "true"/"false" override ANSI colors (auto-detected by default)
///   RUST_LOG    - standard env filter (default: "jotter_api=debug,tower_http=debug")
///
/// The returned guard flushes the file writer when dropped.
fn init_logging() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let log_file = std::env::var("LOG_FILE").ok();
    let log_ansi = std::env::var("LOG_ANSI")
        .ok()
        .map(|v| v == "true" || v == "1");

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "jotter_api=debug,jotter_jobs=debug,jotter_db=info,tower_http=debug".into()
    });

    let registry = tracing_subscriber::registry().with(env_filter);

    let guard = if let Some(ref path) = log_file {
        let file_dir = std::path::Path::new(path)
            .parent()
            .unwrap_or(std::path::Path::new("."));
        let file_name = std::path::Path::new(path)
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("jotter-api.log");
        let file_appender = tracing_appender::rolling::daily(file_dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(non_blocking),
                )
                .init();
        } else {
            // no ANSI in files unless asked
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(log_ansi.unwrap_or(false));
            registry.with(layer).init();
        }
        Some(guard)
    } else {
        if log_format == "json" {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        } else {
            let mut layer = tracing_subscriber::fmt::layer();
            if let Some(ansi) = log_ansi {
                layer = layer.with_ansi(ansi);
            }
            registry.with(layer).init();
        }
        None
    };

    info!(
        log_format = %log_format,
        log_file = log_file.as_deref().unwrap_or("(stdout)"),
        "Logging initialized"
    );
    guard
}

/// Resolve on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
