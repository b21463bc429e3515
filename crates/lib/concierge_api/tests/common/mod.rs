//! Shared harness: an in-memory app plus fake vendor endpoints.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response};
use concierge_api::config::ApiConfig;
use concierge_api::{AppState, router};
use concierge_core::config::ConciergeConfig;
use concierge_core::credentials::store::MemoryStore;
use concierge_core::credentials::{CredentialKey, TieredStore, TokenBundle, TokenManager};
use concierge_core::integrations::{build_dispatcher, http_client};
use concierge_core::oauth::{GOOGLE, GoogleOAuth, OAuthProvider, OAuthStateStore};
use serde_json::Value;
use tower::ServiceExt;

pub const TENANT: &str = "acme";

pub struct Harness {
    pub app: Router,
    pub durable: Arc<MemoryStore>,
    pub local: Arc<MemoryStore>,
}

impl Harness {
    /// App configured from `vars`, with both tiers in memory.
    pub fn new(vars: &[(&str, &str)]) -> Self {
        let mut vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        vars.entry("TENANT_ID".into()).or_insert_with(|| TENANT.into());
        let config = ConciergeConfig::from_lookup(|k| vars.get(k).cloned());

        let durable = Arc::new(MemoryStore::new());
        let local = Arc::new(MemoryStore::new());
        let http = http_client().unwrap();

        let mut providers: Vec<Arc<dyn OAuthProvider>> = Vec::new();
        if let Some(google) = config.google.clone() {
            providers.push(Arc::new(GoogleOAuth::new(google, http.clone())));
        }
        let tokens = TokenManager::with_providers(
            TieredStore::new(durable.clone(), local.clone()),
            providers,
            "/auth",
        );
        let dispatcher = build_dispatcher(&config, tokens.clone(), http).unwrap();

        let state = AppState {
            config: ApiConfig::new("127.0.0.1:0", config.tenant.clone()),
            tokens,
            dispatcher,
            integrations: Arc::new(config.configured()),
            oauth_state: Arc::new(OAuthStateStore::new()),
        };

        Self {
            app: router(state),
            durable,
            local,
        }
    }

    pub fn google_key() -> CredentialKey {
        CredentialKey::new(TENANT, GOOGLE)
    }

    /// Seed a fresh Google credential into the durable tier.
    pub fn seed_google(&self) {
        let expiry = now_ms() + 3_600_000;
        self.durable.seed(
            Self::google_key(),
            TokenBundle {
                access_token: Some("ya29.seeded".into()),
                refresh_token: Some("1//refresh".into()),
                expiry_date: Some(expiry),
                ..Default::default()
            },
        );
    }

    pub async fn send(&self, req: Request<Body>) -> Response<Body> {
        self.app.clone().oneshot(req).await.unwrap()
    }

    /// `POST /api/command` with `body`; returns status and decoded JSON.
    pub async fn command(&self, body: Value) -> (u16, Value) {
        let req = Request::builder()
            .method("POST")
            .uri("/api/command")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let resp = self.send(req).await;
        let status = resp.status().as_u16();
        (status, json_body(resp).await)
    }

    pub async fn get(&self, uri: &str) -> Response<Body> {
        self.send(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
    }
}

fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as i64
}

pub async fn text_body(resp: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub async fn json_body(resp: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Serve `router` on an ephemeral local port and return its base URL.
pub async fn spawn_fake(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

/// Query pairs of a URL as a map.
pub fn query_map(location: &str) -> BTreeMap<String, String> {
    url::Url::parse(location)
        .unwrap()
        .query_pairs()
        .into_owned()
        .collect()
}
