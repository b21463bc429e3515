//! Token manager: acquire, persist, refresh and handshake for OAuth
//! credentials held in a [`TieredStore`].
//!
//! Per (tenant, provider) a credential is either unconnected or connected.
//! A successful handshake connects it; every refresh keeps it connected.
//! Nothing here disconnects: a revoked grant only shows up as a failed
//! refresh on the next use.
//!
//! Records are re-read from the stores on every acquire. There is no
//! in-memory credential cache.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::store::{CredentialSource, StoreTier, TieredStore};
use super::{CredentialError, CredentialKey, TokenBundle};
use crate::oauth::OAuthProvider;

/// Refresh access tokens this close to expiry (milliseconds).
const REFRESH_SKEW_MS: i64 = 60_000;

/// Default route prefix where authorization starts; the provider id is
/// appended (`/auth/google`).
pub const DEFAULT_AUTH_PREFIX: &str = "/auth";

struct Inner {
    store: TieredStore,
    providers: HashMap<String, Arc<dyn OAuthProvider>>,
    auth_prefix: String,
}

/// Produces authorized clients and keeps both credential tiers consistent.
#[derive(Clone)]
pub struct TokenManager {
    inner: Arc<Inner>,
}

impl TokenManager {
    pub fn new(store: TieredStore) -> Self {
        Self::with_providers(store, Vec::new(), DEFAULT_AUTH_PREFIX)
    }

    pub fn with_providers(
        store: TieredStore,
        providers: Vec<Arc<dyn OAuthProvider>>,
        auth_prefix: impl Into<String>,
    ) -> Self {
        let providers = providers
            .into_iter()
            .map(|p| (p.id().to_string(), p))
            .collect();
        Self {
            inner: Arc::new(Inner {
                store,
                providers,
                auth_prefix: auth_prefix.into(),
            }),
        }
    }

    /// The configured provider client for `provider`.
    pub fn provider(&self, provider: &str) -> Result<Arc<dyn OAuthProvider>, CredentialError> {
        self.inner
            .providers
            .get(provider)
            .cloned()
            .ok_or_else(|| CredentialError::NotConfigured(provider.to_string()))
    }

    /// Route where authorization for `provider` starts.
    pub fn auth_start(&self, provider: &str) -> String {
        format!("{}/{}", self.inner.auth_prefix.trim_end_matches('/'), provider)
    }

    /// Read the credential (durable tier first, local on failure or absence)
    /// and wrap it in a client handle.
    pub async fn acquire(&self, key: &CredentialKey) -> Result<AuthorizedClient, CredentialError> {
        match self.inner.store.read(key).await {
            Some((bundle, source)) => {
                debug!(key = %key, tier = source.as_str(), "credential acquired");
                Ok(AuthorizedClient {
                    manager: self.clone(),
                    key: key.clone(),
                    bundle,
                    source,
                })
            }
            None => {
                warn!(key = %key, "no credential in any store");
                Err(CredentialError::NotConnected {
                    tenant: key.tenant.clone(),
                    provider: key.provider.clone(),
                    auth_start: self.auth_start(&key.provider),
                })
            }
        }
    }

    /// Write `bundle` to the durable tier (merge semantics) and mirror it to
    /// the local tier. A durable failure does not stop the local write.
    /// Returns the record as now stored.
    pub async fn persist(
        &self,
        key: &CredentialKey,
        bundle: TokenBundle,
    ) -> Result<TokenBundle, CredentialError> {
        let outcome = self.inner.store.write(key, &bundle).await?;
        let path = match (outcome.durable, outcome.local) {
            (true, true) => "durable+local",
            (true, false) => "durable",
            (false, _) => "local",
        };
        info!(key = %key, path, "credential persisted");
        Ok(outcome.bundle)
    }

    /// Fold a refreshed (possibly partial) bundle into the last known good
    /// one and persist it. Safe to call concurrently for the same key:
    /// per-field last write wins, and an update with an older expiry never
    /// displaces a newer token.
    pub async fn on_refresh(
        &self,
        key: &CredentialKey,
        partial: TokenBundle,
    ) -> Result<TokenBundle, CredentialError> {
        let mut merged = self
            .inner
            .store
            .read(key)
            .await
            .map(|(bundle, _)| bundle)
            .unwrap_or_default();
        merged.merge(partial);
        debug!(key = %key, expiry = ?merged.expiry_date, "token refreshed");
        self.persist(key, merged).await
    }

    /// Exchange a one-time authorization code and persist the initial bundle.
    pub async fn complete_handshake(
        &self,
        key: &CredentialKey,
        code: &str,
    ) -> Result<TokenBundle, CredentialError> {
        let provider = self.provider(&key.provider)?;
        let bundle = match provider.exchange_code(code).await {
            Ok(bundle) => bundle,
            Err(e) => {
                warn!(key = %key, "authorization code exchange failed: {e}");
                return Err(e.into());
            }
        };
        if bundle.refresh_token.is_none() {
            warn!(key = %key, "provider issued no refresh token; existing one is kept if present");
        }
        let stored = self.persist(key, bundle).await?;
        info!(key = %key, "authorization handshake completed");
        Ok(stored)
    }

    /// Which tier currently holds a usable credential for `key`.
    pub async fn status(&self, key: &CredentialKey) -> CredentialSource {
        self.inner.store.locate(key).await
    }
}

/// A credential read from one of the tiers, ready to authorize requests.
pub struct AuthorizedClient {
    manager: TokenManager,
    key: CredentialKey,
    bundle: TokenBundle,
    source: StoreTier,
}

impl AuthorizedClient {
    pub fn key(&self) -> &CredentialKey {
        &self.key
    }

    pub fn bundle(&self) -> &TokenBundle {
        &self.bundle
    }

    /// Tier the credential was read from.
    pub fn source(&self) -> StoreTier {
        self.source
    }

    /// An access token for the `Authorization: Bearer` header.
    ///
    /// Refreshes first when the token is missing or within a minute of
    /// expiry and a refresh token is available, then records the refreshed
    /// bundle through [`TokenManager::on_refresh`] before handing it out.
    pub async fn bearer_token(&mut self) -> Result<String, CredentialError> {
        let now_ms = chrono::Utc::now().timestamp_millis();
        let stale = self.bundle.access_token.is_none()
            || self.bundle.expires_within(now_ms, REFRESH_SKEW_MS);

        if stale {
            if let Some(refresh_token) = self.bundle.refresh_token.clone() {
                let provider = self.manager.provider(&self.key.provider)?;
                let partial = provider.refresh(&refresh_token).await?;
                self.bundle = self.manager.on_refresh(&self.key, partial).await?;
            }
        }

        self.bundle.access_token.clone().ok_or_else(|| {
            CredentialError::RefreshFailed("credential has no access token".to_string())
        })
    }
}
