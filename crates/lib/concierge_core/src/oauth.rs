//! OAuth provider clients and pending-authorization state.
//!
//! Provides the [`OAuthProvider`] seam the token manager talks to, the Google
//! implementation (consent URL, code exchange, refresh), and the in-memory
//! store that binds a consent redirect to its callback via the `state`
//! parameter.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use rand::RngCore;
use reqwest::Client;
use serde::Deserialize;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use crate::config::GoogleOAuthConfig;
use crate::credentials::{CredentialError, CredentialKey, ExchangeFailure, TokenBundle};

/// How long a consent redirect stays redeemable.
pub const STATE_TTL: Duration = Duration::from_secs(600);

/// Default period of the expired-state sweeper.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Random bytes per state parameter (32 base64url characters).
const STATE_BYTES: usize = 24;

/// Provider identifier for Google-backed integrations.
pub const GOOGLE: &str = "google";

// =============================================================================
// Provider seam
// =============================================================================

/// An OAuth 2.0 authorization-code provider.
#[async_trait]
pub trait OAuthProvider: Send + Sync {
    /// Provider identifier, e.g. `"google"`.
    fn id(&self) -> &str;

    /// Consent screen URL carrying `state`.
    fn authorization_url(&self, state: &str) -> String;

    /// Exchange a one-time authorization code for an initial token bundle.
    async fn exchange_code(&self, code: &str) -> Result<TokenBundle, ExchangeFailure>;

    /// Use a refresh token to obtain a fresh (possibly partial) bundle.
    async fn refresh(&self, refresh_token: &str) -> Result<TokenBundle, CredentialError>;
}

// =============================================================================
// Google
// =============================================================================

/// Response from Google's token endpoint.
#[derive(Debug, Deserialize)]
pub struct GoogleTokenResponse {
    pub access_token: String,
    pub token_type: Option<String>,
    pub expires_in: Option<i64>,
    pub refresh_token: Option<String>,
    pub id_token: Option<String>,
    pub scope: Option<String>,
}

impl GoogleTokenResponse {
    /// Convert to a bundle, anchoring `expires_in` at `now_ms`.
    pub fn into_bundle(self, now_ms: i64) -> TokenBundle {
        TokenBundle {
            access_token: Some(self.access_token),
            refresh_token: self.refresh_token,
            expiry_date: self
                .expires_in
                .map(|secs| now_ms.saturating_add(secs.saturating_mul(1000))),
            scope: self.scope,
            token_type: self.token_type,
            id_token: self.id_token,
            ..Default::default()
        }
    }
}

/// Error body returned by OAuth token endpoints.
#[derive(Debug, Deserialize)]
struct TokenErrorBody {
    error: String,
    error_description: Option<String>,
}

/// Classify a failed token-endpoint response. A 4xx is the provider refusing
/// the grant; anything else means the provider itself is at fault.
pub fn classify_token_error(status: u16, body: &str) -> ExchangeFailure {
    if (400..500).contains(&status) {
        let parsed: Option<TokenErrorBody> = serde_json::from_str(body).ok();
        let (error, description) = match parsed {
            Some(b) => (b.error, b.error_description),
            None => (format!("http_{status}"), None),
        };
        return ExchangeFailure::Rejected {
            status,
            error,
            description,
        };
    }
    ExchangeFailure::Unreachable(format!("token endpoint returned HTTP {status}"))
}

/// Google OAuth web-server flow.
pub struct GoogleOAuth {
    http: Client,
    config: GoogleOAuthConfig,
}

impl GoogleOAuth {
    pub fn new(config: GoogleOAuthConfig, http: Client) -> Self {
        Self { http, config }
    }

    async fn token_request(
        &self,
        params: &[(&str, &str)],
    ) -> Result<GoogleTokenResponse, ExchangeFailure> {
        let resp = self
            .http
            .post(&self.config.token_url)
            .form(params)
            .send()
            .await
            .map_err(|e| {
                ExchangeFailure::Unreachable(format!("token request failed: {}", e.without_url()))
            })?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(classify_token_error(status, &body));
        }

        resp.json::<GoogleTokenResponse>()
            .await
            .map_err(|e| ExchangeFailure::Unreachable(format!("token response parse error: {e}")))
    }
}

#[async_trait]
impl OAuthProvider for GoogleOAuth {
    fn id(&self) -> &str {
        GOOGLE
    }

    fn authorization_url(&self, state: &str) -> String {
        let scope = self.config.scopes.join(" ");
        let mut url = match url::Url::parse(&self.config.auth_url) {
            Ok(url) => url,
            Err(_) => return self.config.auth_url.clone(),
        };
        url.query_pairs_mut()
            .append_pair("client_id", self.config.client_id.as_str())
            .append_pair("redirect_uri", self.config.redirect_uri.as_str())
            .append_pair("response_type", "code")
            .append_pair("scope", &scope)
            .append_pair("access_type", "offline")
            .append_pair("prompt", "consent")
            .append_pair("state", state);
        url.into()
    }

    async fn exchange_code(&self, code: &str) -> Result<TokenBundle, ExchangeFailure> {
        let resp = self
            .token_request(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("redirect_uri", self.config.redirect_uri.as_str()),
            ])
            .await?;
        debug!(has_refresh_token = resp.refresh_token.is_some(), "authorization code exchanged");
        Ok(resp.into_bundle(chrono::Utc::now().timestamp_millis()))
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenBundle, CredentialError> {
        let resp = self
            .token_request(&[
                ("grant_type", "refresh_token"),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("refresh_token", refresh_token),
            ])
            .await
            .map_err(refresh_failure)?;
        Ok(resp.into_bundle(chrono::Utc::now().timestamp_millis()))
    }
}

/// Word a token-endpoint failure for the refresh grant. A rejection here
/// means the stored refresh token was revoked or expired.
fn refresh_failure(failure: ExchangeFailure) -> CredentialError {
    CredentialError::RefreshFailed(match failure {
        ExchangeFailure::Rejected {
            error,
            description: Some(description),
            ..
        } => format!("refresh token rejected: {error} ({description})"),
        ExchangeFailure::Rejected { error, .. } => format!("refresh token rejected: {error}"),
        ExchangeFailure::Unreachable(message) => format!("provider unreachable: {message}"),
    })
}

// =============================================================================
// Pending authorization state
// =============================================================================

/// Authorization started by a consent redirect, awaiting its callback.
#[derive(Debug)]
struct PendingAuthorization {
    key: CredentialKey,
    expires_at: Instant,
}

impl PendingAuthorization {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Single-use `state` parameters mapped to the credential they authorize.
///
/// Entries are redeemable once, within the store's TTL. Expired entries that
/// are never redeemed are dropped by [`purge_expired`](Self::purge_expired),
/// which [`spawn_sweeper`](Self::spawn_sweeper) runs periodically.
pub struct OAuthStateStore {
    pending: DashMap<String, PendingAuthorization>,
    ttl: Duration,
}

impl OAuthStateStore {
    pub fn new() -> Self {
        Self::with_ttl(STATE_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            pending: DashMap::new(),
            ttl,
        }
    }

    /// Record a pending authorization for `key` and return its fresh state.
    pub fn begin(&self, key: CredentialKey) -> String {
        let expires_at = Instant::now() + self.ttl;
        loop {
            let state = random_state();
            if let Entry::Vacant(slot) = self.pending.entry(state.clone()) {
                slot.insert(PendingAuthorization { key, expires_at });
                return state;
            }
        }
    }

    /// Consume `state`, returning the key it was issued for. Unknown, reused
    /// and expired states all yield `None`; the entry is gone either way.
    pub fn redeem(&self, state: &str) -> Option<CredentialKey> {
        let (_, pending) = self.pending.remove(state)?;
        pending.is_live(Instant::now()).then_some(pending.key)
    }

    /// Drop expired entries and return how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.pending.len();
        self.pending.retain(|_, pending| pending.is_live(now));
        let evicted = before.saturating_sub(self.pending.len());
        if evicted > 0 {
            debug!(evicted, remaining = self.pending.len(), "expired oauth states purged");
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Purge expired entries every `period`. The task holds only a weak
    /// reference and ends once the store is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let store = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticks = tokio::time::interval(period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticks.tick().await;
            loop {
                ticks.tick().await;
                let Some(store) = store.upgrade() else {
                    break;
                };
                store.purge_expired();
            }
        })
    }
}

impl Default for OAuthStateStore {
    fn default() -> Self {
        Self::new()
    }
}

fn random_state() -> String {
    let mut bytes = [0u8; STATE_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
