//! # concierge_api
//!
//! HTTP API library for Concierge.

pub mod config;
pub mod error;
pub mod handlers;

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use concierge_core::credentials::TokenManager;
use concierge_core::dispatch::Dispatcher;
use concierge_core::oauth::OAuthStateStore;
use tower_http::cors::{Any, CorsLayer};

use crate::config::ApiConfig;
use crate::handlers::{command, health, oauth};

/// Route paths.
pub mod routes {
    pub const POST_API_COMMAND: &str = "/api/command";
    pub const GET_AUTH_GOOGLE: &str = "/auth/google";
    pub const GET_AUTH_GOOGLE_CALLBACK: &str = "/auth/google/callback";
    pub const GET_HEALTH: &str = "/health";
}

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    /// API configuration.
    pub config: ApiConfig,
    /// Credential lifecycle for OAuth-backed integrations.
    pub tokens: TokenManager,
    /// Immutable command table.
    pub dispatcher: Dispatcher,
    /// Which integrations have configuration, by provider name.
    pub integrations: Arc<BTreeMap<&'static str, bool>>,
    /// Consent redirects awaiting their callback.
    pub oauth_state: Arc<OAuthStateStore>,
}

/// Builds the Axum router with all routes and shared state.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route(routes::POST_API_COMMAND, post(command::command_handler))
        .route(routes::GET_AUTH_GOOGLE, get(oauth::google_start_handler))
        .route(
            routes::GET_AUTH_GOOGLE_CALLBACK,
            get(oauth::google_callback_handler),
        )
        .route(routes::GET_HEALTH, get(health::health_handler))
        .layer(cors)
        .with_state(state)
}
