mod app_state;
mod auth;
mod board;
mod cache;
mod config;
mod database;
mod embedded;
mod error;
mod handlers;
mod models;
mod store;

use app_state::AppState;
use board::Board;
use cache::{CacheBackend, CacheLayer, MemoryBackend, RedisBackend};
use config::{CacheConfig, CacheKind, Config};
use database::init_database;
use embedded::load_templates;
use std::sync::Arc;
use store::Store;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;

    info!("Initializing database at {}...", config.database_file);
    let pool = init_database(&config.database_file).await?;

    let cache = Arc::new(build_cache(&config.cache).await);
    if let Some(period) = config.cache.recovery_interval {
        info!("Cache recovery probe every {:?}", period);
        cache.spawn_recovery(period, &[board::LISTING_CACHE_KEY]);
    }

    let board = Arc::new(Board::new(Store::new(pool.clone()), cache, config.cache.ttl_secs));
    let state = AppState::new(board, load_templates()?);
    let app = handlers::router(state);

    info!("Message board listening on http://{}", config.bind_addr);
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    pool.close().await;
    info!("Database connections closed");
    Ok(())
}

// Startup never fails because of the cache: an unusable backend just means
// the board runs straight off the database.
async fn build_cache(config: &CacheConfig) -> CacheLayer {
    let backend: Arc<dyn CacheBackend> = match config.kind {
        CacheKind::Redis => match RedisBackend::new(&config.redis) {
            Ok(backend) => Arc::new(backend),
            Err(e) => {
                warn!("Invalid Redis configuration, caching disabled: {}", e);
                return CacheLayer::disabled();
            }
        },
        CacheKind::Memory => Arc::new(MemoryBackend::new()),
        CacheKind::None => {
            info!("Listing cache turned off by configuration");
            return CacheLayer::disabled();
        }
    };
    CacheLayer::connect(backend, config.op_timeout).await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
