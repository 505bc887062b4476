use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use parlay_gateway::config::Config;
use parlay_gateway::store::memory::MemoryStore;
use parlay_gateway::store::pg::PgStore;
use parlay_gateway::store::retention::{spawn_sweeper, SWEEP_INTERVAL};
use parlay_gateway::store::{ChatStore, NotificationStore};
use parlay_gateway::AppState;

#[tokio::main]
async fn main() {
    // Load .env file (silently skip if missing; env vars may be set externally)
    if dotenvy::dotenv().is_err() {
        let env_path = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(env_path);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    let port = config.port;

    let (notifications, chats): (Arc<dyn NotificationStore>, Arc<dyn ChatStore>) =
        match &config.database_url {
            Some(url) => {
                let pool = parlay_gateway::db::pool::connect(url).expect("failed to create pool");
                let store = Arc::new(PgStore::new(pool));
                (store.clone(), store)
            }
            None => {
                tracing::warn!("DATABASE_URL not set, using in-memory stores");
                let store = Arc::new(MemoryStore::new());
                (store.clone(), store)
            }
        };

    let sweeper = spawn_sweeper(notifications.clone(), config.retention_days, SWEEP_INTERVAL);

    tracing::info!(
        heartbeat_timeout = ?config.heartbeat_timeout,
        retention_days = config.retention_days,
        "gateway configured"
    );

    let state = AppState::new(config, notifications, chats);
    let app = parlay_gateway::app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "gateway listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    sweeper.abort();
    tracing::info!("gateway stopped");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(?e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
