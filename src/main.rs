use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use secret_friend::{
    abuse::{self, RateLimiter},
    api,
    config::Config,
    exchange::Exchange,
    store::MemoryStore,
};

#[tokio::main]
async fn main() -> std::io::Result<()> {
    // Load .env file if present (before any env var reads)
    if let Err(e) = dotenvy::dotenv() {
        // Not an error if .env doesn't exist, only log if it's a different issue
        if !matches!(e, dotenvy::Error::Io(_)) {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "secret_friend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting secret friend exchange...");

    let config = Config::from_env();

    let store = match &config.snapshot_path {
        Some(path) => MemoryStore::with_persistence(path.clone())
            .await
            .map_err(|e| std::io::Error::other(e.to_string()))?,
        None => MemoryStore::new(),
    };

    let exchange = Arc::new(Exchange::new(Arc::new(store), config.exchange.clone()));

    let limiter = config
        .rate_limit
        .as_ref()
        .map(|rl| Arc::new(RateLimiter::from_config(rl)));
    if let Some(limiter) = &limiter {
        abuse::spawn_rate_limit_sweeper(limiter.clone());
    }

    let app = api::router(exchange, limiter);

    let addr = config.socket_addr();
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await
}
