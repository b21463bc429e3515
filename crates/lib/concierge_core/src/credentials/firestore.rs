//! Durable credential store on Firestore (REST API).
//!
//! Each record is one document `{collection}/{tenant}_{provider}` with a
//! `tokens` map field. Requests are authorized with a service-account JWT
//! exchanged for a short-lived access token, cached until a minute before it
//! expires.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tokio::sync::RwLock;
use tracing::debug;

use super::store::{CredentialStore, StoreError};
use super::{CredentialKey, TokenBundle};
use crate::config::FirestoreConfig;

const DATASTORE_SCOPE: &str = "https://www.googleapis.com/auth/datastore";
const SERVICE_TOKEN_LIFETIME: Duration = Duration::from_secs(55 * 60);
const SERVICE_TOKEN_SKEW: Duration = Duration::from_secs(60);

// =============================================================================
// Service account authentication
// =============================================================================

/// JWT claims for the service-account grant.
#[derive(Debug, Serialize)]
struct JwtClaims {
    iss: String,
    scope: String,
    aud: String,
    iat: u64,
    exp: u64,
}

#[derive(Debug, Deserialize)]
struct ServiceTokenResponse {
    access_token: String,
}

struct CachedToken {
    token: String,
    expires_at: SystemTime,
}

/// Exchanges a signed service-account assertion for an access token.
pub struct ServiceAccountAuth {
    client_email: String,
    private_key: String,
    token_uri: String,
    http: Client,
    cached: RwLock<Option<CachedToken>>,
}

impl ServiceAccountAuth {
    pub fn new(config: &FirestoreConfig, http: Client) -> Self {
        Self {
            client_email: config.client_email.clone(),
            private_key: config.private_key.clone(),
            token_uri: config.token_uri.clone(),
            http,
            cached: RwLock::new(None),
        }
    }

    /// A valid access token, fetching a new one when the cache is stale.
    pub async fn access_token(&self) -> Result<String, StoreError> {
        {
            let cached = self.cached.read().await;
            if let Some(token) = cached.as_ref() {
                if token.expires_at > SystemTime::now() + SERVICE_TOKEN_SKEW {
                    return Ok(token.token.clone());
                }
            }
        }

        let token = self.fetch_token().await?;
        *self.cached.write().await = Some(CachedToken {
            token: token.clone(),
            expires_at: SystemTime::now() + SERVICE_TOKEN_LIFETIME,
        });
        Ok(token)
    }

    async fn fetch_token(&self) -> Result<String, StoreError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| StoreError::Backend(format!("system clock error: {e}")))?
            .as_secs();

        let claims = JwtClaims {
            iss: self.client_email.clone(),
            scope: DATASTORE_SCOPE.to_string(),
            aud: self.token_uri.clone(),
            iat: now,
            exp: now + 3600,
        };

        let key = EncodingKey::from_rsa_pem(self.private_key.as_bytes())
            .map_err(|e| StoreError::Backend(format!("invalid service account key: {e}")))?;
        let assertion = encode(&Header::new(Algorithm::RS256), &claims, &key)
            .map_err(|e| StoreError::Backend(format!("JWT signing failed: {e}")))?;

        let resp = self
            .http
            .post(&self.token_uri)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await
            .map_err(|e| StoreError::Unavailable(format!("service token request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(StoreError::Unavailable(format!(
                "service token HTTP {status}: {body}"
            )));
        }

        let token: ServiceTokenResponse = resp
            .json()
            .await
            .map_err(|e| StoreError::Backend(format!("service token parse error: {e}")))?;
        Ok(token.access_token)
    }
}

// =============================================================================
// Store
// =============================================================================

/// Firestore-backed durable store.
pub struct FirestoreStore {
    http: Client,
    auth: Arc<ServiceAccountAuth>,
    documents_url: String,
    collection: String,
}

impl FirestoreStore {
    pub fn new(config: &FirestoreConfig, http: Client) -> Self {
        let documents_url = format!(
            "{}/v1/projects/{}/databases/(default)/documents",
            config.base_url.trim_end_matches('/'),
            config.project_id
        );
        Self {
            auth: Arc::new(ServiceAccountAuth::new(config, http.clone())),
            http,
            documents_url,
            collection: config.collection.clone(),
        }
    }

    fn document_url(&self, key: &CredentialKey) -> String {
        format!(
            "{}/{}/{}",
            self.documents_url,
            self.collection,
            key.document_id()
        )
    }

    async fn fetch(&self, key: &CredentialKey) -> Result<Option<TokenBundle>, StoreError> {
        let token = self.auth.access_token().await?;
        let resp = self
            .http
            .get(self.document_url(key))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| StoreError::Unavailable(format!("firestore read failed: {e}")))?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(StoreError::Unavailable(format!(
                "firestore read HTTP {status}: {body}"
            )));
        }

        let doc: Value = resp
            .json()
            .await
            .map_err(|e| StoreError::Backend(format!("firestore response parse error: {e}")))?;
        match doc.pointer("/fields/tokens") {
            Some(tokens) => Ok(Some(serde_json::from_value(from_firestore(tokens))?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl CredentialStore for FirestoreStore {
    async fn read(&self, key: &CredentialKey) -> Result<Option<TokenBundle>, StoreError> {
        self.fetch(key).await
    }

    async fn write(
        &self,
        key: &CredentialKey,
        bundle: &TokenBundle,
    ) -> Result<TokenBundle, StoreError> {
        let mut stored = self.fetch(key).await?.unwrap_or_default();
        stored.merge(bundle.clone());

        let body = json!({
            "fields": {
                "tenant": { "stringValue": key.tenant },
                "provider": { "stringValue": key.provider },
                "tokens": to_firestore(&serde_json::to_value(&stored)?),
                "updatedAt": { "timestampValue": chrono::Utc::now().to_rfc3339() },
            }
        });

        let token = self.auth.access_token().await?;
        let resp = self
            .http
            .patch(self.document_url(key))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| StoreError::Unavailable(format!("firestore write failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(StoreError::Unavailable(format!(
                "firestore write HTTP {status}: {body}"
            )));
        }

        debug!(key = %key, "credential written to firestore");
        Ok(stored)
    }

    fn name(&self) -> &str {
        "firestore"
    }
}

// =============================================================================
// Value encoding
// =============================================================================

/// Encode plain JSON as a Firestore typed value.
pub fn to_firestore(value: &Value) -> Value {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Number(n) => match n.as_i64() {
            Some(i) => json!({ "integerValue": i.to_string() }),
            None => json!({ "doubleValue": n.as_f64() }),
        },
        Value::String(s) => json!({ "stringValue": s }),
        Value::Array(items) => json!({
            "arrayValue": { "values": items.iter().map(to_firestore).collect::<Vec<_>>() }
        }),
        Value::Object(map) => {
            let fields: Map<String, Value> = map
                .iter()
                .map(|(k, v)| (k.clone(), to_firestore(v)))
                .collect();
            json!({ "mapValue": { "fields": fields } })
        }
    }
}

/// Decode a Firestore typed value into plain JSON. Unknown kinds become null.
pub fn from_firestore(value: &Value) -> Value {
    let Some((kind, inner)) = value.as_object().and_then(|o| o.iter().next()) else {
        return Value::Null;
    };

    match kind.as_str() {
        "stringValue" | "timestampValue" | "referenceValue" | "booleanValue"
        | "doubleValue" => inner.clone(),
        "integerValue" => inner
            .as_str()
            .and_then(|s| s.parse::<i64>().ok())
            .map(Value::from)
            .unwrap_or_else(|| inner.clone()),
        "arrayValue" => Value::Array(
            inner
                .get("values")
                .and_then(Value::as_array)
                .map(|items| items.iter().map(from_firestore).collect())
                .unwrap_or_default(),
        ),
        "mapValue" => Value::Object(
            inner
                .get("fields")
                .and_then(Value::as_object)
                .map(|fields| {
                    fields
                        .iter()
                        .map(|(k, v)| (k.clone(), from_firestore(v)))
                        .collect()
                })
                .unwrap_or_default(),
        ),
        _ => Value::Null,
    }
}
