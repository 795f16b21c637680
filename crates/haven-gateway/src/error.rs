use axum::http::{uri::InvalidUri, StatusCode};
use thiserror::Error;

use crate::gateway::State;

/// Failure to get a response out of the origin.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid upstream uri: {0}")]
    InvalidUri(#[from] InvalidUri),
    #[error("failed to build upstream request: {0}")]
    Request(#[from] axum::http::Error),
    #[error("network request failed: {0}")]
    Network(#[from] hyper::Error),
    #[error("upstream unreachable: {0}")]
    Unreachable(String),
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("failed to fetch manifest entry {url}: {source}")]
    ManifestFetch {
        url: String,
        #[source]
        source: FetchError,
    },
    #[error("manifest entry {url} answered with {status}")]
    ManifestStatus { url: String, status: StatusCode },
    #[error("invalid store version {0:?}: use letters, digits, '.', '-' or '_'")]
    InvalidVersion(String),
    #[error("cannot {action} while {state:?}")]
    InvalidState { action: &'static str, state: State },
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed cache file: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum MockError {
    #[error("mock {path}: body is not valid json: {source}")]
    InvalidBody {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("mock {path}: invalid status code {status}")]
    InvalidStatus { path: String, status: u16 },
    #[error("mock path must not be empty")]
    EmptyPath,
}
