//! On-disk form of [`CacheStorage`]: one json file per store, bodies base64.

use super::{CacheStorage, CacheStore, ResponseSnapshot};
use crate::error::StorageError;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use serde::{Deserialize, Serialize};
use serde_with::{base64::Base64, serde_as};
use std::path::Path;
use tokio::fs;
use tracing::{info, warn};

const EXTENSION: &str = "json";

#[serde_as]
#[derive(Deserialize, Serialize)]
struct StoredEntry {
    url: String,
    status: u16,
    /// Values are raw bytes: header values need not be utf-8.
    #[serde_as(as = "Vec<(_, Base64)>")]
    headers: Vec<(String, Vec<u8>)>,
    #[serde_as(as = "Base64")]
    body: Vec<u8>,
}

#[derive(Deserialize, Serialize)]
struct StoredCache {
    name: String,
    entries: Vec<StoredEntry>,
}

impl From<(String, ResponseSnapshot)> for StoredEntry {
    fn from((url, snapshot): (String, ResponseSnapshot)) -> Self {
        let headers = snapshot
            .headers
            .iter()
            .map(|(name, value)| (name.to_string(), value.as_bytes().to_vec()))
            .collect();
        Self {
            url,
            status: snapshot.status.as_u16(),
            headers,
            body: snapshot.body.to_vec(),
        }
    }
}

impl StoredEntry {
    fn into_snapshot(self) -> Option<(String, ResponseSnapshot)> {
        let status = match StatusCode::from_u16(self.status) {
            Ok(status) => status,
            Err(_) => {
                warn!("[Storage]: Skipping {} with status {}", self.url, self.status);
                return None;
            }
        };
        let mut headers = HeaderMap::with_capacity(self.headers.len());
        for (name, value) in self.headers {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_bytes(&value),
            ) {
                (Ok(name), Ok(value)) => {
                    headers.append(name, value);
                }
                _ => warn!("[Storage]: Dropping header {name:?} of {}", self.url),
            }
        }
        Some((self.url, ResponseSnapshot::new(status, headers, self.body)))
    }
}

impl CacheStorage {
    /// Restore every store previously written to `dir`. A missing directory
    /// yields empty storage.
    pub async fn load(dir: &Path) -> Result<Self, StorageError> {
        let storage = Self::new();
        if !dir.exists() {
            info!("[Storage]: Nothing to restore at {dir:?}");
            return Ok(storage);
        }

        let mut files = fs::read_dir(dir).await?;
        while let Some(file) = files.next_entry().await? {
            let path = file.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(EXTENSION) {
                continue;
            }
            let stored: StoredCache = serde_json::from_slice(&fs::read(&path).await?)?;
            let store = CacheStore::new(&stored.name);
            store.put_all(
                stored
                    .entries
                    .into_iter()
                    .filter_map(StoredEntry::into_snapshot),
            );
            info!(
                "[Storage]: Restored store {} with {} entries",
                store.name(),
                store.len()
            );
            storage.insert_store(store).await;
        }
        Ok(storage)
    }

    /// Write every store to `dir` and remove files of stores that no longer
    /// exist. Returns the number of stores written.
    pub async fn persist(&self, dir: &Path) -> Result<usize, StorageError> {
        fs::create_dir_all(dir).await?;

        let stores: Vec<CacheStore> = self.stores.read().await.values().cloned().collect();
        let mut written = Vec::with_capacity(stores.len());
        for store in stores {
            let stored = StoredCache {
                name: store.name().to_string(),
                entries: store.entries().into_iter().map(StoredEntry::from).collect(),
            };
            let file_name = format!("{}.{EXTENSION}", store.name());
            fs::write(dir.join(&file_name), serde_json::to_vec(&stored)?).await?;
            written.push(file_name);
        }

        let mut files = fs::read_dir(dir).await?;
        while let Some(file) = files.next_entry().await? {
            let path = file.path();
            let stale = path.extension().and_then(|ext| ext.to_str()) == Some(EXTENSION)
                && !written
                    .iter()
                    .any(|name| file.file_name().to_str() == Some(name.as_str()));
            if stale {
                info!("[Storage]: Removing stale store file {path:?}");
                fs::remove_file(&path).await?;
            }
        }

        info!("[Storage]: Persisted {} store(s) to {dir:?}", written.len());
        Ok(written.len())
    }
}
