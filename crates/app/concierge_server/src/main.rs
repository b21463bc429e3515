//! Concierge API server binary.
//!
//! Reads configuration from the environment (a `.env` file is loaded first
//! when present), wires the credential tiers, OAuth providers and command
//! table, and serves the HTTP API until Ctrl-C.

use std::sync::Arc;

use clap::Parser;
use concierge_api::config::{ApiConfig, DEFAULT_BIND_ADDR};
use concierge_core::config::ConciergeConfig;
use concierge_core::credentials::file::FileStore;
use concierge_core::credentials::firestore::FirestoreStore;
use concierge_core::credentials::manager::DEFAULT_AUTH_PREFIX;
use concierge_core::credentials::store::DisabledStore;
use concierge_core::credentials::{CredentialStore, TieredStore, TokenManager};
use concierge_core::integrations::{build_dispatcher, http_client};
use concierge_core::oauth::{GoogleOAuth, OAuthProvider, OAuthStateStore, SWEEP_INTERVAL};
use tracing::{info, warn};

/// CLI arguments for the API server.
#[derive(Parser, Debug)]
#[command(name = "concierge_server", about = "Concierge API server")]
struct Args {
    /// Address to listen on.
    #[arg(long = "bind", env = "BIND_ADDR", default_value = DEFAULT_BIND_ADDR)]
    bind_addr: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .or_else(|_| {
                    tracing_subscriber::EnvFilter::try_new(
                        "info,concierge_api=debug,concierge_core=debug",
                    )
                })?,
        )
        .init();

    let args = Args::parse();
    let config = ConciergeConfig::from_env();
    info!(
        version = concierge_core::version(),
        tenant = %config.tenant,
        bind = %args.bind_addr,
        "starting concierge_server"
    );

    let http = http_client()?;

    let durable: Arc<dyn CredentialStore> = match &config.firestore {
        Some(firestore) => {
            info!(
                project = %firestore.project_id,
                collection = %firestore.collection,
                "durable store: firestore"
            );
            Arc::new(FirestoreStore::new(firestore, http.clone()))
        }
        None => {
            warn!("FIREBASE_* not set; running on the local token file only");
            Arc::new(DisabledStore::new("firestore is not configured"))
        }
    };
    info!(path = %config.local_token_path.display(), "local store: file");
    let local: Arc<dyn CredentialStore> = Arc::new(FileStore::new(&config.local_token_path));

    let mut providers: Vec<Arc<dyn OAuthProvider>> = Vec::new();
    match &config.google {
        Some(google) => providers.push(Arc::new(GoogleOAuth::new(google.clone(), http.clone()))),
        None => warn!("GOOGLE_* not set; Gmail and Sheets commands cannot authorize"),
    }

    let tokens = TokenManager::with_providers(
        TieredStore::new(durable, local),
        providers,
        DEFAULT_AUTH_PREFIX,
    );
    let dispatcher = build_dispatcher(&config, tokens.clone(), http)?;

    let integrations = config.configured();
    let enabled: Vec<_> = integrations
        .iter()
        .filter(|(_, on)| **on)
        .map(|(name, _)| *name)
        .collect();
    info!(?enabled, "integrations configured");

    let oauth_state = Arc::new(OAuthStateStore::new());
    oauth_state.spawn_sweeper(SWEEP_INTERVAL);

    let state = concierge_api::AppState {
        config: ApiConfig::new(args.bind_addr, config.tenant.clone()),
        tokens,
        dispatcher,
        integrations: Arc::new(integrations),
        oauth_state,
    };
    let bind_addr = state.config.bind_addr.clone();
    let app = concierge_api::router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %listener.local_addr()?, "REST API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
    info!("Ctrl-C received, shutting down");
}
