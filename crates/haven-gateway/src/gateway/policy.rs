use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// How a GET request outside the mock table is answered. One per deployment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Policy {
    /// Serve the stored entry when present, otherwise fetch and store.
    /// A failed fetch after a miss is returned to the caller.
    CacheFirst,
    /// Fetch and store; on network failure fall back to the stored entry,
    /// then to the offline page.
    NetworkFirst,
}

impl Default for Policy {
    fn default() -> Self {
        Policy::CacheFirst
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Policy::CacheFirst => f.write_str("cache-first"),
            Policy::NetworkFirst => f.write_str("network-first"),
        }
    }
}

impl FromStr for Policy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cache-first" => Ok(Policy::CacheFirst),
            "network-first" => Ok(Policy::NetworkFirst),
            other => Err(format!(
                "unknown policy {other:?}, expected cache-first or network-first"
            )),
        }
    }
}
