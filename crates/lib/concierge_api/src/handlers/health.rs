//! Health endpoint.

use std::collections::BTreeMap;

use axum::Json;
use axum::extract::State;
use concierge_core::credentials::{CredentialKey, CredentialSource};
use concierge_core::oauth::GOOGLE;
use serde::Serialize;

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    /// Tier holding a credential per OAuth provider. Any stored credential
    /// counts, even one that may no longer refresh.
    pub credentials: BTreeMap<&'static str, CredentialSource>,
    pub integrations: BTreeMap<&'static str, bool>,
    pub commands: Vec<&'static str>,
}

/// `GET /health`: credential location and configured integrations. Never
/// echoes secrets.
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let google = state
        .tokens
        .status(&CredentialKey::new(state.config.tenant.clone(), GOOGLE))
        .await;

    Json(HealthResponse {
        status: "ok",
        credentials: BTreeMap::from([(GOOGLE, google)]),
        integrations: (*state.integrations).clone(),
        commands: state.dispatcher.commands(),
    })
}
