pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod gateway;
pub mod routes;
pub mod store;

use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use gateway::fanout::GatewayBroadcast;
use gateway::presence::OnlineUserDirectory;
use gateway::rooms::RoomTable;
use store::memory::MemoryStore;
use store::{ChatStore, NotificationStore};

/// Shared application state available to all route handlers and sockets.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub notifications: Arc<dyn NotificationStore>,
    pub chats: Arc<dyn ChatStore>,
    pub broadcast: Arc<GatewayBroadcast>,
    pub directory: Arc<OnlineUserDirectory>,
    pub rooms: Arc<RoomTable>,
}

impl AppState {
    pub fn new(
        config: Config,
        notifications: Arc<dyn NotificationStore>,
        chats: Arc<dyn ChatStore>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            notifications,
            chats,
            broadcast: Arc::new(GatewayBroadcast::new()),
            directory: Arc::new(OnlineUserDirectory::new()),
            rooms: Arc::new(RoomTable::new()),
        }
    }

    /// State backed by one [`MemoryStore`] for both seams. The store is
    /// returned too so callers can seed chats and inspect notifications.
    pub fn in_memory(config: Config) -> (Self, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let state = Self::new(config, store.clone(), store.clone());
        (state, store)
    }
}

/// The full HTTP + socket application with CORS and request tracing.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(routes::router())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
