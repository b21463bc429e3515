//! Local file-backed credential store.
//!
//! One JSON file holds every record, keyed by `tenant:provider`, each record
//! shaped like the durable document: `{ "tokens": { ... } }`. Writes go to a
//! sibling temp file and are renamed into place.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use super::store::{CredentialStore, StoreError};
use super::{CredentialKey, TokenBundle};

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredRecord {
    tokens: TokenBundle,
}

type FileContents = BTreeMap<String, StoredRecord>;

/// Fallback credential store backed by a single JSON file.
pub struct FileStore {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process.
    write_lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<FileContents, StoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(FileContents::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(FileContents::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, contents: &FileContents) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_vec_pretty(contents)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for FileStore {
    async fn read(&self, key: &CredentialKey) -> Result<Option<TokenBundle>, StoreError> {
        let mut contents = self.load().await?;
        Ok(contents.remove(&key.to_string()).map(|r| r.tokens))
    }

    async fn write(
        &self,
        key: &CredentialKey,
        bundle: &TokenBundle,
    ) -> Result<TokenBundle, StoreError> {
        let _guard = self.write_lock.lock().await;

        let mut contents = self.load().await?;
        let record = contents.entry(key.to_string()).or_default();
        record.tokens.merge(bundle.clone());
        let stored = record.tokens.clone();

        self.save(&contents).await?;
        debug!(key = %key, path = %self.path.display(), "credential written to file store");
        Ok(stored)
    }

    fn name(&self) -> &str {
        "file"
    }
}
