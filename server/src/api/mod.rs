//! API Router and Application State
//!
//! Central routing configuration and shared state.

use std::sync::Arc;

use axum::{routing::get, Router};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{auth, auth::TokenRegistry, config::Config, voice, voice::RelayServer, ws};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration
    pub config: Arc<Config>,
    /// Outstanding admission tokens
    pub tokens: Arc<TokenRegistry>,
    /// Rooms, clients and the peer-session engine
    pub relay: Arc<RelayServer>,
}

impl AppState {
    /// Create new application state.
    #[must_use]
    pub fn new(config: Config, relay: Arc<RelayServer>) -> Self {
        Self {
            tokens: Arc::new(TokenRegistry::with_ttl(config.token_ttl)),
            config: Arc::new(config),
            relay,
        }
    }
}

/// Create the main application router.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/connect", get(ws::handler))
        .nest("/connect", auth::router().merge(voice::router()))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
