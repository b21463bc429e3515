//! Credential stores and the two-tier store in front of them.
//!
//! Reads go durable first, then local. Writes go to both tiers; a failed
//! durable write still lets the local write proceed, so the system degrades
//! to file-backed operation. The tiers converge after every successful write
//! to both; a crash between the two writes leaves them divergent until the
//! next one. There is no backfill of the durable tier once it recovers.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::{CredentialError, CredentialKey, TokenBundle};

/// Errors raised by an individual credential store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Backend error: {0}")]
    Backend(String),
}

/// One persistence backend for credential records.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Read the record for `key`. `Ok(None)` means the store is reachable and
    /// holds nothing for the key.
    async fn read(&self, key: &CredentialKey) -> Result<Option<TokenBundle>, StoreError>;

    /// Merge `bundle` into the stored record (see [`TokenBundle::merge`]) and
    /// return what is now stored.
    async fn write(&self, key: &CredentialKey, bundle: &TokenBundle)
    -> Result<TokenBundle, StoreError>;

    /// Store name for logging.
    fn name(&self) -> &str;
}

/// Which tier answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreTier {
    Durable,
    Local,
}

impl StoreTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreTier::Durable => "durable",
            StoreTier::Local => "local",
        }
    }
}

/// Where a usable credential currently lives, as reported by health checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialSource {
    Durable,
    Local,
    None,
}

impl From<Option<StoreTier>> for CredentialSource {
    fn from(tier: Option<StoreTier>) -> Self {
        match tier {
            Some(StoreTier::Durable) => CredentialSource::Durable,
            Some(StoreTier::Local) => CredentialSource::Local,
            None => CredentialSource::None,
        }
    }
}

/// Result of a two-tier write.
#[derive(Debug, Clone)]
pub struct WriteOutcome {
    /// Record as now stored (durable view when the durable write succeeded).
    pub bundle: TokenBundle,
    pub durable: bool,
    pub local: bool,
}

/// Durable store in front of a local fallback store.
#[derive(Clone)]
pub struct TieredStore {
    durable: Arc<dyn CredentialStore>,
    local: Arc<dyn CredentialStore>,
}

impl TieredStore {
    pub fn new(durable: Arc<dyn CredentialStore>, local: Arc<dyn CredentialStore>) -> Self {
        Self { durable, local }
    }

    /// Read a usable bundle, durable tier first. Store failures are logged and
    /// fall through to the next tier; this never errors.
    pub async fn read(&self, key: &CredentialKey) -> Option<(TokenBundle, StoreTier)> {
        match self.durable.read(key).await {
            Ok(Some(bundle)) if bundle.is_usable() => {
                debug!(
                    key = %key,
                    store = self.durable.name(),
                    "credential read from durable store"
                );
                return Some((bundle, StoreTier::Durable));
            }
            Ok(_) => {
                debug!(key = %key, "no credential in durable store, trying local");
            }
            Err(e) => {
                warn!(
                    key = %key,
                    store = self.durable.name(),
                    "durable store read failed, falling back to local: {e}"
                );
            }
        }

        match self.local.read(key).await {
            Ok(Some(bundle)) if bundle.is_usable() => {
                debug!(
                    key = %key,
                    store = self.local.name(),
                    "credential read from local store"
                );
                Some((bundle, StoreTier::Local))
            }
            Ok(_) => None,
            Err(e) => {
                warn!(key = %key, store = self.local.name(), "local store read failed: {e}");
                None
            }
        }
    }

    /// Write to both tiers. Fails only when neither tier accepted the write.
    pub async fn write(
        &self,
        key: &CredentialKey,
        bundle: &TokenBundle,
    ) -> Result<WriteOutcome, CredentialError> {
        let durable = self.durable.write(key, bundle).await;
        if let Err(e) = &durable {
            warn!(
                key = %key,
                store = self.durable.name(),
                "durable store write failed, continuing with local: {e}"
            );
        }

        let local = self.local.write(key, bundle).await;
        if let Err(e) = &local {
            warn!(key = %key, store = self.local.name(), "local store write failed: {e}");
        }

        match (durable, local) {
            (Ok(stored), local) => {
                let local_ok = local.is_ok();
                info!(key = %key, durable = true, local = local_ok, "credential persisted");
                Ok(WriteOutcome {
                    bundle: stored,
                    durable: true,
                    local: local_ok,
                })
            }
            (Err(_), Ok(stored)) => {
                info!(
                    key = %key,
                    durable = false,
                    local = true,
                    "credential persisted to local store only"
                );
                Ok(WriteOutcome {
                    bundle: stored,
                    durable: false,
                    local: true,
                })
            }
            (Err(durable), Err(local)) => Err(CredentialError::StoreUnavailable {
                durable: durable.to_string(),
                local: local.to_string(),
            }),
        }
    }

    /// Which tier would answer a read right now.
    pub async fn locate(&self, key: &CredentialKey) -> CredentialSource {
        self.read(key).await.map(|(_, tier)| tier).into()
    }
}

/// Stand-in durable store for deployments without one configured.
pub struct DisabledStore {
    reason: String,
}

impl DisabledStore {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl CredentialStore for DisabledStore {
    async fn read(&self, _key: &CredentialKey) -> Result<Option<TokenBundle>, StoreError> {
        Err(StoreError::Unavailable(self.reason.clone()))
    }

    async fn write(
        &self,
        _key: &CredentialKey,
        _bundle: &TokenBundle,
    ) -> Result<TokenBundle, StoreError> {
        Err(StoreError::Unavailable(self.reason.clone()))
    }

    fn name(&self) -> &str {
        "disabled"
    }
}

/// In-process store. Can be switched offline to simulate an outage.
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<CredentialKey, TokenBundle>>,
    offline: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-load a record without merge semantics.
    pub fn seed(&self, key: CredentialKey, bundle: TokenBundle) {
        self.lock().insert(key, bundle);
    }

    /// Snapshot of a record, ignoring the offline switch.
    pub fn get(&self, key: &CredentialKey) -> Option<TokenBundle> {
        self.lock().get(key).cloned()
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store offline".into()));
        }
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<CredentialKey, TokenBundle>> {
        // A poisoned map is still a valid map.
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn read(&self, key: &CredentialKey) -> Result<Option<TokenBundle>, StoreError> {
        self.check_online()?;
        Ok(self.lock().get(key).cloned())
    }

    async fn write(
        &self,
        key: &CredentialKey,
        bundle: &TokenBundle,
    ) -> Result<TokenBundle, StoreError> {
        self.check_online()?;
        let mut records = self.lock();
        let record = records.entry(key.clone()).or_default();
        record.merge(bundle.clone());
        Ok(record.clone())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
