//! The offline cache gateway.
//!
//! A [`Gateway`] goes through the same lifecycle as a browser service worker:
//! [`Gateway::install`] fills the versioned store from the static manifest,
//! [`Gateway::activate`] deletes every other store and takes control, and from
//! then on [`Gateway::intercept`] answers each request from the mock table,
//! the store or the network according to the configured [`Policy`].

pub mod event;
pub mod observer;
mod policy;

pub use event::{FetchOutcome, Source, SOURCE_HEADER};
pub use observer::{FetchLog, FetchMetrics, FetchObserver, FetchStats, StatsSnapshot};
pub use policy::Policy;

use crate::{
    error::{FetchError, GatewayError},
    mock::MockTable,
    storage::{CacheStorage, CacheStore, ResponseSnapshot},
    upstream::Upstream,
};
use axum::http::{HeaderValue, Method, Request, Response, StatusCode};
use haven_utils::{ReadyError, Readiness};
use hyper::Body;
use serde::Serialize;
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::{Mutex, RwLock},
    time::Instant,
};
use tracing::{error, info, warn};

pub const DEFAULT_CACHE_PREFIX: &str = "haven";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum State {
    Parsed,
    Installing,
    Installed,
    Activating,
    Activated,
    Redundant,
}

pub struct GatewayBuilder<U> {
    upstream: U,
    storage: CacheStorage,
    prefix: String,
    version: String,
    manifest: Vec<String>,
    mocks: MockTable,
    policy: Policy,
    offline_page: Option<String>,
    observers: Vec<Arc<dyn FetchObserver>>,
}

impl<U: Upstream> GatewayBuilder<U> {
    pub fn new(upstream: U) -> Self {
        Self {
            upstream,
            storage: CacheStorage::new(),
            prefix: DEFAULT_CACHE_PREFIX.to_string(),
            version: "v1".to_string(),
            manifest: Vec::new(),
            mocks: MockTable::with_defaults(),
            policy: Policy::CacheFirst,
            offline_page: None,
            observers: Vec::new(),
        }
    }

    pub fn storage(mut self, storage: CacheStorage) -> Self {
        self.storage = storage;
        self
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn manifest<I, S>(mut self, manifest: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.manifest = manifest
            .into_iter()
            .map(|url| normalize_url(url.as_ref()))
            .collect();
        self
    }

    pub fn mocks(mut self, mocks: MockTable) -> Self {
        self.mocks = mocks;
        self
    }

    pub fn policy(mut self, policy: Policy) -> Self {
        self.policy = policy;
        self
    }

    pub fn offline_page(mut self, offline_page: Option<String>) -> Self {
        self.offline_page = offline_page.map(|url| normalize_url(&url));
        self
    }

    pub fn observer(mut self, observer: Arc<dyn FetchObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn build(self) -> Gateway<U> {
        Gateway(Arc::new(Inner {
            upstream: self.upstream,
            storage: self.storage,
            prefix: self.prefix,
            version: RwLock::new(self.version),
            state: RwLock::new(State::Parsed),
            active: RwLock::new(None),
            manifest: self.manifest,
            mocks: self.mocks,
            policy: self.policy,
            offline_page: self.offline_page,
            observers: self.observers,
            control: Readiness::new(),
            updating: Mutex::new(()),
        }))
    }
}

struct Inner<U> {
    upstream: U,
    storage: CacheStorage,
    prefix: String,
    version: RwLock<String>,
    state: RwLock<State>,
    active: RwLock<Option<CacheStore>>,
    manifest: Vec<String>,
    mocks: MockTable,
    policy: Policy,
    offline_page: Option<String>,
    observers: Vec<Arc<dyn FetchObserver>>,
    control: Readiness<()>,
    updating: Mutex<()>,
}

pub struct Gateway<U>(Arc<Inner<U>>);

impl<U> Clone for Gateway<U> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<U: Upstream> Gateway<U> {
    pub fn builder(upstream: U) -> GatewayBuilder<U> {
        GatewayBuilder::new(upstream)
    }

    pub fn storage(&self) -> &CacheStorage {
        &self.0.storage
    }

    pub fn policy(&self) -> Policy {
        self.0.policy
    }

    pub fn manifest(&self) -> &[String] {
        &self.0.manifest
    }

    pub async fn state(&self) -> State {
        *self.0.state.read().await
    }

    pub async fn version(&self) -> String {
        self.0.version.read().await.clone()
    }

    /// `<prefix>-<version>` of the current version.
    pub async fn store_name(&self) -> String {
        self.name_for(&self.0.version.read().await)
    }

    fn name_for(&self, version: &str) -> String {
        format!("{}-{}", self.0.prefix, version)
    }

    /// The store requests are served from, once activated.
    pub async fn active_store(&self) -> Option<CacheStore> {
        self.0.active.read().await.clone()
    }

    pub fn is_controlling(&self) -> bool {
        self.0.control.is_resolved()
    }

    /// Wait until the gateway has been activated for the first time.
    pub async fn wait_for_control(&self, timeout: Duration) -> Result<(), ReadyError> {
        self.0.control.wait_timeout(timeout).await
    }

    /// Open the current version's store and fill it with the manifest.
    ///
    /// All manifest entries are fetched before anything is written, so a
    /// single failure leaves the store untouched and the gateway redundant.
    pub async fn install(&self) -> Result<CacheStore, GatewayError> {
        {
            let mut state = self.0.state.write().await;
            if *state != State::Parsed {
                return Err(GatewayError::InvalidState {
                    action: "install",
                    state: *state,
                });
            }
            *state = State::Installing;
        }

        let name = self.store_name().await;
        let e = match self.populate(&name).await {
            Ok(store) => {
                *self.0.state.write().await = State::Installed;
                info!("[Gateway]: Installed {name} with {} entries", store.len());
                return Ok(store);
            }
            Err(e) => e,
        };
        // A store restored from disk that still covers the manifest outlives
        // an unreachable origin.
        if self.is_complete(&name).await {
            *self.0.state.write().await = State::Installed;
            warn!("[Gateway]: Refresh of {name} failed, keeping restored entries: {e}");
            return Ok(self.0.storage.open(&name).await);
        }
        *self.0.state.write().await = State::Redundant;
        error!("[Gateway]: Install of {name} failed: {e}");
        Err(e)
    }

    /// Whether the store called `name` already holds every manifest entry.
    async fn is_complete(&self, name: &str) -> bool {
        match self.0.storage.get(name).await {
            Some(store) => self.0.manifest.iter().all(|url| store.contains(url)),
            None => false,
        }
    }

    /// Delete every store but the current one and take control.
    pub async fn activate(&self) -> Result<(), GatewayError> {
        {
            let mut state = self.0.state.write().await;
            if *state != State::Installed {
                return Err(GatewayError::InvalidState {
                    action: "activate",
                    state: *state,
                });
            }
            *state = State::Activating;
        }

        let current = self.store_name().await;
        for name in self.0.storage.keys().await {
            if name != current {
                info!("[Gateway]: Deleting old store {name}");
                self.0.storage.delete(&name).await;
            }
        }
        let store = self.0.storage.open(&current).await;
        *self.0.active.write().await = Some(store);
        *self.0.state.write().await = State::Activated;
        // Already resolved when this is a version update.
        let _ = self.0.control.resolve(());
        info!("[Gateway]: Activated {current}");
        Ok(())
    }

    /// Install `version` next to the active store, then switch to it.
    ///
    /// When the install fails the previous version keeps serving. Updates are
    /// serialized.
    pub async fn update(&self, version: &str) -> Result<(), GatewayError> {
        check_version(version)?;
        let _updating = self.0.updating.lock().await;
        let state = self.state().await;
        if state != State::Activated {
            return Err(GatewayError::InvalidState {
                action: "update",
                state,
            });
        }

        let name = self.name_for(version);
        if let Err(e) = self.populate(&name).await {
            warn!("[Gateway]: Update to {name} is redundant: {e}");
            if self.active_store().await.map(|store| store.name() != name).unwrap_or(true) {
                self.0.storage.delete(&name).await;
            }
            return Err(e);
        }

        *self.0.version.write().await = version.to_string();
        *self.0.state.write().await = State::Installed;
        self.activate().await
    }

    /// Empty the active store. Returns the number of dropped entries.
    pub async fn purge(&self) -> usize {
        match self.active_store().await {
            Some(store) => {
                let count = store.len();
                store.clear();
                info!("[Gateway]: Purged {count} entries from {}", store.name());
                count
            }
            None => 0,
        }
    }

    async fn populate(&self, name: &str) -> Result<CacheStore, GatewayError> {
        let store = self.0.storage.open(name).await;
        let mut entries = Vec::with_capacity(self.0.manifest.len());
        for url in &self.0.manifest {
            let request = Request::get(url.as_str())
                .body(Body::empty())
                .map_err(FetchError::from)
                .map_err(|source| GatewayError::ManifestFetch {
                    url: url.clone(),
                    source,
                })?;
            let response = self.0.upstream.fetch(request).await.map_err(|source| {
                GatewayError::ManifestFetch {
                    url: url.clone(),
                    source,
                }
            })?;
            let snapshot = ResponseSnapshot::from_response(response)
                .await
                .map_err(|e| GatewayError::ManifestFetch {
                    url: url.clone(),
                    source: e.into(),
                })?;
            if !snapshot.is_ok() {
                return Err(GatewayError::ManifestStatus {
                    url: url.clone(),
                    status: snapshot.status,
                });
            }
            entries.push((url.clone(), snapshot));
        }
        store.put_all(entries);
        Ok(store)
    }

    /// Whether `request` is answered by the mock table, which needs neither
    /// the network nor an active store.
    pub fn is_mocked<B>(&self, request: &Request<B>) -> bool {
        request.method() == Method::GET && self.0.mocks.lookup(request.uri().path()).is_some()
    }

    /// Answer `request` and tag the response with its [`Source`].
    pub async fn intercept(&self, request: Request<Body>) -> Result<Response<Body>, GatewayError> {
        let method = request.method().clone();
        let uri = request.uri().clone();
        for observer in &self.0.observers {
            observer.on_request(&method, &uri);
        }

        let started = Instant::now();
        let (source, result) = self.dispatch(request).await;

        let outcome = FetchOutcome {
            method: &method,
            uri: &uri,
            source,
            status: result.as_ref().ok().map(|response| response.status()),
            elapsed: started.elapsed(),
        };
        for observer in &self.0.observers {
            observer.on_response(&outcome);
        }

        result.map(|mut response| {
            response
                .headers_mut()
                .insert(SOURCE_HEADER, HeaderValue::from_static(source.as_str()));
            response
        })
    }

    async fn dispatch(
        &self,
        request: Request<Body>,
    ) -> (Source, Result<Response<Body>, GatewayError>) {
        if request.method() != Method::GET {
            return (Source::Passthrough, self.passthrough(request).await);
        }
        if let Some(mock) = self.0.mocks.lookup(request.uri().path()) {
            return (Source::Mock, Ok(mock.respond()));
        }
        let store = match self.active_store().await {
            Some(store) => store,
            // Not controlling yet: behave as if there were no gateway.
            None => return (Source::Passthrough, self.passthrough(request).await),
        };
        let key = request_key(&request);
        match self.0.policy {
            Policy::CacheFirst => self.cache_first(&store, key, request).await,
            Policy::NetworkFirst => self.network_first(&store, key, request).await,
        }
    }

    async fn passthrough(&self, request: Request<Body>) -> Result<Response<Body>, GatewayError> {
        Ok(self.0.upstream.fetch(request).await?)
    }

    async fn cache_first(
        &self,
        store: &CacheStore,
        key: String,
        request: Request<Body>,
    ) -> (Source, Result<Response<Body>, GatewayError>) {
        if let Some(hit) = store.get(&key) {
            return (Source::Cache, Ok(hit.into_response()));
        }
        match self.fetch_and_store(store, key, request).await {
            Ok(response) => (Source::Network, Ok(response)),
            Err(e) => (Source::Network, Err(e.into())),
        }
    }

    async fn network_first(
        &self,
        store: &CacheStore,
        key: String,
        request: Request<Body>,
    ) -> (Source, Result<Response<Body>, GatewayError>) {
        let error = match self.fetch_and_store(store, key.clone(), request).await {
            Ok(response) => return (Source::Network, Ok(response)),
            Err(e) => e,
        };
        warn!("[Gateway]: Network failed for {key}, falling back: {error}");
        if let Some(hit) = store.get(&key) {
            return (Source::Cache, Ok(hit.into_response()));
        }
        let offline = self
            .0
            .offline_page
            .as_deref()
            .and_then(|page| store.get(page));
        match offline {
            Some(page) => (Source::Offline, Ok(page.into_response())),
            None => (Source::Offline, Ok(offline_response())),
        }
    }

    /// Fetch from the network and keep a copy of a 200 answer under `key`.
    /// Other statuses are streamed back untouched.
    async fn fetch_and_store(
        &self,
        store: &CacheStore,
        key: String,
        request: Request<Body>,
    ) -> Result<Response<Body>, FetchError> {
        let response = self.0.upstream.fetch(request).await?;
        if response.status() != StatusCode::OK {
            return Ok(response);
        }
        let snapshot = ResponseSnapshot::from_response(response).await?;
        store.put(key, snapshot.clone());
        Ok(snapshot.into_response())
    }
}

/// Store key of a request: its path and query.
pub fn request_key<B>(request: &Request<B>) -> String {
    request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string())
}

/// Versions end up in store names and file names, so only a plain token is
/// accepted.
pub fn check_version(version: &str) -> Result<(), GatewayError> {
    let valid = !version.is_empty()
        && version != "."
        && version != ".."
        && version
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'));
    if valid {
        Ok(())
    } else {
        Err(GatewayError::InvalidVersion(version.to_string()))
    }
}

fn normalize_url(url: &str) -> String {
    let url = url.trim().trim_start_matches('.');
    if url.starts_with('/') {
        url.to_string()
    } else {
        format!("/{url}")
    }
}

fn offline_response() -> Response<Body> {
    let mut response = Response::new(Body::from("offline"));
    *response.status_mut() = StatusCode::SERVICE_UNAVAILABLE;
    response
}
