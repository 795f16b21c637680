mod server_tests;

use crate::{
    error::FetchError,
    gateway::{Gateway, Policy},
    upstream::Upstream,
};
use async_trait::async_trait;
use axum::http::{Request, Response, StatusCode};
use bytes::Bytes;
use hyper::Body;
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
};
use tracing::{warn, Level};

pub fn setup_logger() {
    if let Err(err) = tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .with_test_writer()
        .try_init()
    {
        warn!("Logger already set {:?}:", err)
    }
}

#[derive(Default)]
struct Origin {
    routes: Mutex<HashMap<String, (StatusCode, Bytes)>>,
    offline: AtomicBool,
    calls: AtomicUsize,
}

/// In-memory origin that counts every fetch and can be switched offline.
#[derive(Clone, Default)]
pub struct TestUpstream(Arc<Origin>);

impl TestUpstream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(self, path: &str, status: StatusCode, body: &'static str) -> Self {
        self.set_route(path, status, body);
        self
    }

    pub fn set_route(&self, path: &str, status: StatusCode, body: &'static str) {
        self.0
            .routes
            .lock()
            .unwrap()
            .insert(path.to_string(), (status, Bytes::from_static(body.as_bytes())));
    }

    pub fn set_offline(&self, offline: bool) {
        self.0.offline.store(offline, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.0.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Upstream for TestUpstream {
    async fn fetch(&self, request: Request<Body>) -> Result<Response<Body>, FetchError> {
        self.0.calls.fetch_add(1, Ordering::SeqCst);
        if self.0.offline.load(Ordering::SeqCst) {
            return Err(FetchError::Unreachable(request.uri().to_string()));
        }
        let key = crate::gateway::request_key(&request);
        let (status, body) = self
            .0
            .routes
            .lock()
            .unwrap()
            .get(&key)
            .cloned()
            .unwrap_or((StatusCode::NOT_FOUND, Bytes::from_static(b"not found")));
        let mut response = Response::new(Body::from(body));
        *response.status_mut() = status;
        Ok(response)
    }
}

/// An origin serving the default manifest.
pub fn site() -> TestUpstream {
    TestUpstream::new()
        .route("/", StatusCode::OK, "<html>home</html>")
        .route("/offline.html", StatusCode::OK, "<html>offline</html>")
        .route("/app.js", StatusCode::OK, "console.log('forge')")
}

pub fn gateway(upstream: &TestUpstream, policy: Policy) -> Gateway<TestUpstream> {
    Gateway::builder(upstream.clone())
        .version("v1")
        .manifest(["/", "/offline.html"])
        .policy(policy)
        .offline_page(Some("/offline.html".to_string()))
        .build()
}

/// Install and activate, then forget the manifest fetches.
pub async fn controlling_gateway(
    upstream: &TestUpstream,
    policy: Policy,
) -> Gateway<TestUpstream> {
    let gateway = gateway(upstream, policy);
    gateway.install().await.unwrap();
    gateway.activate().await.unwrap();
    gateway
}

pub fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Bytes {
    hyper::body::to_bytes(response.into_body()).await.unwrap()
}
