//! Named response stores.
//!
//! [`CacheStorage`] owns every store by name, [`CacheStore`] maps a request
//! url to a full [`ResponseSnapshot`]. Stores have no capacity bound and no
//! expiry: entries only leave when the whole store is deleted or purged.

mod persist;

use axum::http::{header, HeaderMap, Response, StatusCode};
use bytes::Bytes;
use hyper::Body;
use moka::sync::Cache as Moka;
use std::{collections::BTreeMap, sync::Arc};
use tokio::sync::RwLock;
use tracing::info;

/// A fully buffered response.
///
/// Cloning shares the body buffer, so handing one copy to the caller and
/// persisting another never reads the upstream body twice.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResponseSnapshot {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ResponseSnapshot {
    pub fn new(status: StatusCode, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers,
            body: body.into(),
        }
    }

    /// Buffer `response`, dropping hop-by-hop headers that no longer apply
    /// once the body is held in memory.
    pub async fn from_response(response: Response<Body>) -> Result<Self, hyper::Error> {
        let (mut parts, body) = response.into_parts();
        let body = hyper::body::to_bytes(body).await?;
        parts.headers.remove(header::TRANSFER_ENCODING);
        parts.headers.remove(header::CONNECTION);
        Ok(Self {
            status: parts.status,
            headers: parts.headers,
            body,
        })
    }

    pub fn is_ok(&self) -> bool {
        self.status == StatusCode::OK
    }

    pub fn into_response(self) -> Response<Body> {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

/// One named url -> response mapping.
#[derive(Clone, Debug)]
pub struct CacheStore {
    name: Arc<str>,
    entries: Moka<String, ResponseSnapshot>,
}

impl CacheStore {
    fn new(name: &str) -> Self {
        Self {
            name: Arc::from(name),
            entries: Moka::builder().build(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Exact url lookup.
    pub fn get(&self, url: &str) -> Option<ResponseSnapshot> {
        self.entries.get(url)
    }

    pub fn contains(&self, url: &str) -> bool {
        self.entries.contains_key(url)
    }

    pub fn put(&self, url: impl Into<String>, snapshot: ResponseSnapshot) {
        self.entries.insert(url.into(), snapshot);
    }

    /// Insert a batch that has already been fetched in full.
    pub fn put_all(&self, entries: impl IntoIterator<Item = (String, ResponseSnapshot)>) {
        for (url, snapshot) in entries {
            self.entries.insert(url, snapshot);
        }
    }

    pub fn delete(&self, url: &str) -> bool {
        let existed = self.entries.contains_key(url);
        self.entries.invalidate(url);
        existed
    }

    /// Every stored url, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .entries
            .iter()
            .map(|(url, _)| url.to_string())
            .collect();
        keys.sort();
        keys
    }

    pub fn entries(&self) -> Vec<(String, ResponseSnapshot)> {
        let mut entries: Vec<(String, ResponseSnapshot)> = self
            .entries
            .iter()
            .map(|(url, snapshot)| (url.to_string(), snapshot))
            .collect();
        entries.sort_by(|(a, _), (b, _)| a.cmp(b));
        entries
    }

    pub fn len(&self) -> usize {
        self.entries.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry but keep the store itself.
    pub fn clear(&self) {
        for url in self.keys() {
            self.entries.invalidate(&url);
        }
    }
}

/// All named stores of a gateway.
#[derive(Clone, Default)]
pub struct CacheStorage {
    stores: Arc<RwLock<BTreeMap<String, CacheStore>>>,
}

impl CacheStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the store called `name`, creating it when absent.
    pub async fn open(&self, name: &str) -> CacheStore {
        if let Some(store) = self.stores.read().await.get(name) {
            return store.clone();
        }
        self.stores
            .write()
            .await
            .entry(name.to_string())
            .or_insert_with(|| {
                info!("[Storage]: Created store {name}");
                CacheStore::new(name)
            })
            .clone()
    }

    pub async fn get(&self, name: &str) -> Option<CacheStore> {
        self.stores.read().await.get(name).cloned()
    }

    pub async fn has(&self, name: &str) -> bool {
        self.stores.read().await.contains_key(name)
    }

    /// Store names in lexical order.
    pub async fn keys(&self) -> Vec<String> {
        self.stores.read().await.keys().cloned().collect()
    }

    pub async fn delete(&self, name: &str) -> bool {
        self.stores.write().await.remove(name).is_some()
    }

    /// Look `url` up in every store, in name order.
    pub async fn match_url(&self, url: &str) -> Option<ResponseSnapshot> {
        self.stores
            .read()
            .await
            .values()
            .find_map(|store| store.get(url))
    }

    async fn insert_store(&self, store: CacheStore) {
        self.stores
            .write()
            .await
            .insert(store.name().to_string(), store);
    }
}
