//! Canned JSON answers for selected API paths, served without touching the
//! network so pages keep working offline.

use crate::{config::MockConfig, error::MockError};
use axum::http::{header, HeaderValue, Response, StatusCode};
use chrono::{SecondsFormat, Utc};
use hyper::Body;
use serde_json::{json, Value};

pub const PING_PATH: &str = "/api/ping";

#[derive(Clone, Debug, PartialEq)]
pub enum MockBody {
    Json(Value),
    /// `{"status": "online", "timestamp": <now, ISO-8601>}`
    Heartbeat,
}

impl MockBody {
    pub fn render(&self) -> Value {
        match self {
            MockBody::Json(value) => value.clone(),
            MockBody::Heartbeat => json!({
                "status": "online",
                "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            }),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct MockEntry {
    pub suffix: String,
    pub status: StatusCode,
    pub body: MockBody,
}

impl MockEntry {
    pub fn new(suffix: impl Into<String>, status: StatusCode, body: MockBody) -> Self {
        Self {
            suffix: suffix.into(),
            status,
            body,
        }
    }

    pub fn respond(&self) -> Response<Body> {
        let body = self.body.render().to_string();
        let mut response = Response::new(Body::from(body));
        *response.status_mut() = self.status;
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        response
    }
}

impl TryFrom<&MockConfig> for MockEntry {
    type Error = MockError;

    fn try_from(config: &MockConfig) -> Result<Self, Self::Error> {
        if config.path.is_empty() {
            return Err(MockError::EmptyPath);
        }
        let status = StatusCode::from_u16(config.status).map_err(|_| MockError::InvalidStatus {
            path: config.path.clone(),
            status: config.status,
        })?;
        let body = serde_json::from_str(&config.body).map_err(|source| MockError::InvalidBody {
            path: config.path.clone(),
            source,
        })?;
        Ok(Self::new(config.path.clone(), status, MockBody::Json(body)))
    }
}

/// Url path suffix -> canned response. Fixed once the gateway is built.
#[derive(Clone, Debug, Default)]
pub struct MockTable {
    entries: Vec<MockEntry>,
}

impl MockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The heartbeat endpoint every deployment answers offline.
    pub fn with_defaults() -> Self {
        let mut table = Self::new();
        table.insert(MockEntry::new(PING_PATH, StatusCode::OK, MockBody::Heartbeat));
        table
    }

    /// Built-in entries extended (or overridden) by configured ones.
    pub fn from_config(mocks: &[MockConfig]) -> Result<Self, MockError> {
        let mut table = Self::with_defaults();
        for mock in mocks {
            table.insert(MockEntry::try_from(mock)?);
        }
        Ok(table)
    }

    /// Add `entry`, replacing one with the same suffix.
    pub fn insert(&mut self, entry: MockEntry) {
        match self.entries.iter_mut().find(|e| e.suffix == entry.suffix) {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
    }

    /// Entry whose suffix ends `path`. The longest suffix wins.
    pub fn lookup(&self, path: &str) -> Option<&MockEntry> {
        self.entries
            .iter()
            .filter(|entry| path.ends_with(entry.suffix.as_str()))
            .max_by_key(|entry| entry.suffix.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
