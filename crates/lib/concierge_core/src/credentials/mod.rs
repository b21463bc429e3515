//! OAuth credential records.
//!
//! A credential record is one tenant's token bundle for one provider. Records
//! live in two stores (a durable network store and a local file) behind
//! [`store::TieredStore`]; [`manager::TokenManager`] is the only writer.

pub mod file;
pub mod firestore;
pub mod manager;
pub mod store;

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

pub use manager::{AuthorizedClient, TokenManager};
pub use store::{CredentialSource, CredentialStore, StoreError, StoreTier, TieredStore};

/// Identifies one credential record: a tenant's grant for one provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CredentialKey {
    pub tenant: String,
    pub provider: String,
}

impl CredentialKey {
    pub fn new(tenant: impl Into<String>, provider: impl Into<String>) -> Self {
        Self {
            tenant: tenant.into(),
            provider: provider.into(),
        }
    }

    /// Document id used by the durable store (`tenant_provider`).
    pub fn document_id(&self) -> String {
        format!("{}_{}", self.tenant, self.provider)
    }
}

impl fmt::Display for CredentialKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.tenant, self.provider)
    }
}

/// Provider-issued token bundle.
///
/// Field names follow the shape Google's token endpoint and client libraries
/// use, so records written by other tooling stay readable. Unknown fields are
/// carried through untouched in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenBundle {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Expiry in milliseconds since the Unix epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TokenBundle {
    /// A bundle is usable when it carries something a client can authorize
    /// with, either directly or after a refresh.
    pub fn is_usable(&self) -> bool {
        self.access_token.is_some() || self.refresh_token.is_some()
    }

    /// Whether the access token expires within `skew_ms` of `now_ms`.
    /// Bundles without an expiry never report as expiring.
    pub fn expires_within(&self, now_ms: i64, skew_ms: i64) -> bool {
        self.expiry_date
            .is_some_and(|expiry| expiry <= now_ms.saturating_add(skew_ms))
    }

    /// Merge `update` into this bundle.
    ///
    /// Fields present in `update` overwrite, absent fields are retained. When
    /// both bundles carry an expiry and `update`'s is older, `update` is stale:
    /// it may only fill fields this bundle lacks. This makes concurrent
    /// refreshes converge on the newest token whatever order they land in.
    pub fn merge(&mut self, update: TokenBundle) {
        let stale = matches!(
            (self.expiry_date, update.expiry_date),
            (Some(current), Some(incoming)) if incoming < current
        );

        if stale {
            fill(&mut self.access_token, update.access_token);
            fill(&mut self.refresh_token, update.refresh_token);
            fill(&mut self.expiry_date, update.expiry_date);
            fill(&mut self.scope, update.scope);
            fill(&mut self.token_type, update.token_type);
            fill(&mut self.id_token, update.id_token);
            for (k, v) in update.extra {
                self.extra.entry(k).or_insert(v);
            }
            return;
        }

        overwrite(&mut self.access_token, update.access_token);
        overwrite(&mut self.refresh_token, update.refresh_token);
        overwrite(&mut self.expiry_date, update.expiry_date);
        overwrite(&mut self.scope, update.scope);
        overwrite(&mut self.token_type, update.token_type);
        overwrite(&mut self.id_token, update.id_token);
        self.extra.extend(update.extra);
    }
}

fn overwrite<T>(slot: &mut Option<T>, value: Option<T>) {
    if value.is_some() {
        *slot = value;
    }
}

fn fill<T>(slot: &mut Option<T>, value: Option<T>) {
    if slot.is_none() {
        *slot = value;
    }
}

/// Why an authorization-code exchange failed.
#[derive(Debug, Error)]
pub enum ExchangeFailure {
    /// The provider answered and refused the code (bad, expired or reused).
    #[error("provider rejected the authorization code: {error}")]
    Rejected {
        status: u16,
        error: String,
        description: Option<String>,
    },

    /// The provider could not be reached or failed on its side.
    #[error("provider unreachable: {0}")]
    Unreachable(String),
}

/// Credential lifecycle errors.
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("{provider} is not connected for tenant {tenant}; authorize at {auth_start}")]
    NotConnected {
        tenant: String,
        provider: String,
        auth_start: String,
    },

    #[error("Authorization code exchange failed: {0}")]
    ExchangeFailed(#[from] ExchangeFailure),

    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),

    #[error("No credential store accepted the write (durable: {durable}; local: {local})")]
    StoreUnavailable { durable: String, local: String },

    #[error("Invalid or expired authorization state")]
    InvalidState,

    #[error("OAuth provider not configured: {0}")]
    NotConfigured(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bundle(access: &str, expiry: i64) -> TokenBundle {
        TokenBundle {
            access_token: Some(access.into()),
            expiry_date: Some(expiry),
            ..Default::default()
        }
    }

    #[test]
    fn merge_overwrites_present_fields_and_keeps_absent_ones() {
        let mut current = TokenBundle {
            access_token: Some("old".into()),
            refresh_token: Some("refresh".into()),
            expiry_date: Some(1_000),
            scope: Some("mail".into()),
            ..Default::default()
        };
        current.merge(bundle("new", 2_000));

        assert_eq!(current.access_token.as_deref(), Some("new"));
        assert_eq!(current.expiry_date, Some(2_000));
        assert_eq!(current.refresh_token.as_deref(), Some("refresh"));
        assert_eq!(current.scope.as_deref(), Some("mail"));
    }

    #[test]
    fn merge_ignores_stale_token_but_fills_gaps() {
        let mut current = bundle("newest", 2_000);
        let mut stale = bundle("older", 1_000);
        stale.refresh_token = Some("refresh".into());

        current.merge(stale);

        assert_eq!(current.access_token.as_deref(), Some("newest"));
        assert_eq!(current.expiry_date, Some(2_000));
        assert_eq!(current.refresh_token.as_deref(), Some("refresh"));
    }

    #[test]
    fn merge_is_order_independent_for_expiry_ordered_updates() {
        let base = TokenBundle {
            refresh_token: Some("r".into()),
            ..Default::default()
        };

        let mut ab = base.clone();
        ab.merge(bundle("A", 100));
        ab.merge(bundle("B", 200));

        let mut ba = base;
        ba.merge(bundle("B", 200));
        ba.merge(bundle("A", 100));

        assert_eq!(ab, ba);
        assert_eq!(ab.access_token.as_deref(), Some("B"));
    }

    #[test]
    fn unknown_fields_survive_serde() {
        let json = serde_json::json!({
            "access_token": "a",
            "expiry_date": 5,
            "refresh_token_expires_in": 100
        });
        let bundle: TokenBundle = serde_json::from_value(json).unwrap();
        assert_eq!(bundle.extra["refresh_token_expires_in"], 100);

        let back = serde_json::to_value(&bundle).unwrap();
        assert_eq!(back["refresh_token_expires_in"], 100);
        assert!(back.get("id_token").is_none());
    }

    #[test]
    fn expiry_checks() {
        let b = bundle("a", 10_000);
        assert!(b.expires_within(9_500, 1_000));
        assert!(!b.expires_within(5_000, 1_000));
        assert!(!TokenBundle::default().expires_within(i64::MAX, 0));
    }

    #[test]
    fn not_connected_message_points_at_authorization_start() {
        let err = CredentialError::NotConnected {
            tenant: "default".into(),
            provider: "google".into(),
            auth_start: "/auth/google".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("not connected"));
        assert!(msg.contains("/auth/google"));
    }
}
