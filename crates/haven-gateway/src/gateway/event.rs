use axum::http::{Method, StatusCode, Uri};
use serde::{Deserialize, Serialize};
use std::{fmt, time::Duration};

/// Response header naming where a gateway answer came from.
pub const SOURCE_HEADER: &str = "x-haven-source";

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Mock,
    Cache,
    Network,
    Offline,
    Passthrough,
}

impl Source {
    pub const ALL: [Source; 5] = [
        Source::Mock,
        Source::Cache,
        Source::Network,
        Source::Offline,
        Source::Passthrough,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Mock => "mock",
            Source::Cache => "cache",
            Source::Network => "network",
            Source::Offline => "offline",
            Source::Passthrough => "passthrough",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What observers see once a request has been answered.
#[derive(Debug)]
pub struct FetchOutcome<'a> {
    pub method: &'a Method,
    pub uri: &'a Uri,
    pub source: Source,
    /// `None` when the request failed without a response.
    pub status: Option<StatusCode>,
    pub elapsed: Duration,
}
