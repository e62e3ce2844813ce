//! Render worker binary.

use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use montage_media::FfmpegTranscoder;
use montage_queue::{connect_pool, JobStore, PgJobStore};
use montage_worker::{HttpGenerationProvider, RenderOrchestrator, Worker, WorkerConfig};

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env()
        .add_directive("montage=info".parse().expect("static directive"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(true).with_target(true))
            .with(env_filter)
            .init();
    }

    info!("Starting montage-worker");

    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    let database_url = match std::env::var("DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            error!("DATABASE_URL is not set");
            std::process::exit(1);
        }
    };

    let pool = match connect_pool(&database_url, 10).await {
        Ok(pool) => pool,
        Err(e) => {
            error!("Failed to connect to queue store: {}", e);
            std::process::exit(1);
        }
    };

    let pg_store = PgJobStore::new(pool);
    if let Err(e) = pg_store.migrate().await {
        error!("Failed to run queue migrations: {}", e);
        std::process::exit(1);
    }
    let store: Arc<dyn JobStore> = Arc::new(pg_store);

    let provider = match HttpGenerationProvider::from_env() {
        Ok(provider) => Arc::new(provider),
        Err(e) => {
            error!("Failed to create generation provider: {}", e);
            std::process::exit(1);
        }
    };

    let transcoder = Arc::new(FfmpegTranscoder::new().with_timeout(config.ffmpeg_timeout.as_secs()));

    let orchestrator =
        RenderOrchestrator::new(Arc::clone(&store), provider, transcoder, &config);
    let worker = Worker::new(store, orchestrator, config);

    worker.install_signal_handlers();
    let sweeper = worker.spawn_stale_sweeper();

    if let Err(e) = worker.run().await {
        error!("Worker error: {}", e);
        std::process::exit(1);
    }

    if let Some(sweeper) = sweeper {
        sweeper.abort();
    }

    info!("Worker shutdown complete");
}
