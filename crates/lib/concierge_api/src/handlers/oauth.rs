//! Authorization handshake: consent redirect and callback.

use axum::extract::{Query, State};
use axum::response::{Html, Redirect};
use concierge_core::credentials::{CredentialError, CredentialKey};
use concierge_core::oauth::GOOGLE;
use serde::Deserialize;
use tracing::{info, warn};

use crate::AppState;
use crate::error::{AppError, AppResult};

const CONNECTED_PAGE: &str = r#"<!doctype html>
<html>
  <head><meta charset="utf-8"><title>Connected</title></head>
  <body>
    <h1>Google account connected</h1>
    <p>You can close this window.</p>
  </body>
</html>
"#;

/// Query parameters for the OAuth callback.
#[derive(Debug, Deserialize)]
pub struct OAuthCallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// `GET /auth/google`: send the user to Google's consent screen.
pub async fn google_start_handler(State(state): State<AppState>) -> AppResult<Redirect> {
    let provider = state.tokens.provider(GOOGLE)?;
    let key = CredentialKey::new(state.config.tenant.clone(), GOOGLE);
    let auth_state = state.oauth_state.begin(key);
    info!(provider = GOOGLE, tenant = %state.config.tenant, "redirecting to consent screen");
    Ok(Redirect::to(&provider.authorization_url(&auth_state)))
}

/// `GET /auth/google/callback`: exchange the authorization code and store
/// the resulting credential.
pub async fn google_callback_handler(
    State(state): State<AppState>,
    Query(params): Query<OAuthCallbackParams>,
) -> AppResult<Html<&'static str>> {
    // Consume the state up front so it is single-use whatever happens next.
    let key = params
        .state
        .as_deref()
        .and_then(|s| state.oauth_state.redeem(s));

    if let Some(error) = params.error {
        warn!(provider = GOOGLE, %error, "provider reported an authorization error");
        return Err(AppError::Validation(match params.error_description {
            Some(d) => format!("Authorization failed at the provider: {error} ({d})"),
            None => format!("Authorization failed at the provider: {error}"),
        }));
    }

    let code = params
        .code
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| AppError::Validation("Missing authorization code".to_string()))?;

    let key = key.ok_or(CredentialError::InvalidState)?;
    state.tokens.complete_handshake(&key, &code).await?;

    Ok(Html(CONNECTED_PAGE))
}
