//! Web server — Axum router + shared state.

pub mod api;

use std::sync::Arc;

use axum::Router;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use luisbot_core::config::HandlerSettings;
use luisbot_core::services::BotServices;

/// Shared application state. Handlers are built per turn from these.
pub struct AppState {
    pub services: Arc<BotServices>,
    pub settings: HandlerSettings,
    /// Cancelled on shutdown; each turn runs under a child token.
    pub shutdown: CancellationToken,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(api::routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}
