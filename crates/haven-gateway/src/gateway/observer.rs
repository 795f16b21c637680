//! Hooks registered on the gateway to watch every intercepted request.

use super::event::{FetchOutcome, Source};
use axum::http::{Method, Uri};
use metrics::{describe_counter, describe_histogram, histogram, increment_counter};
use serde::Serialize;
use std::{
    collections::BTreeMap,
    sync::atomic::{AtomicU64, Ordering},
};
use tracing::{info, warn};

pub trait FetchObserver: Send + Sync + 'static {
    fn on_request(&self, _method: &Method, _uri: &Uri) {}

    fn on_response(&self, outcome: &FetchOutcome<'_>);
}

/// Logs one line per request.
#[derive(Clone, Copy, Debug, Default)]
pub struct FetchLog;

impl FetchObserver for FetchLog {
    fn on_response(&self, outcome: &FetchOutcome<'_>) {
        let FetchOutcome {
            method,
            uri,
            source,
            status,
            elapsed,
        } = outcome;
        match status {
            Some(status) => info!("{method} {uri} -> {status} from {source} in {elapsed:?}"),
            None => warn!("{method} {uri} failed via {source} after {elapsed:?}"),
        }
    }
}

/// Per-source request counters.
#[derive(Debug, Default)]
pub struct FetchStats {
    mock: AtomicU64,
    cache: AtomicU64,
    network: AtomicU64,
    offline: AtomicU64,
    passthrough: AtomicU64,
    failed: AtomicU64,
}

#[derive(Debug, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub total: u64,
    pub failed: u64,
    pub sources: BTreeMap<Source, u64>,
}

impl FetchStats {
    pub fn new() -> Self {
        Self::default()
    }

    fn counter(&self, source: Source) -> &AtomicU64 {
        match source {
            Source::Mock => &self.mock,
            Source::Cache => &self.cache,
            Source::Network => &self.network,
            Source::Offline => &self.offline,
            Source::Passthrough => &self.passthrough,
        }
    }

    pub fn count(&self, source: Source) -> u64 {
        self.counter(source).load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let sources: BTreeMap<Source, u64> = Source::ALL
            .iter()
            .map(|source| (*source, self.count(*source)))
            .collect();
        StatsSnapshot {
            total: sources.values().sum(),
            failed: self.failed.load(Ordering::Relaxed),
            sources,
        }
    }
}

impl FetchObserver for FetchStats {
    fn on_response(&self, outcome: &FetchOutcome<'_>) {
        self.counter(outcome.source).fetch_add(1, Ordering::Relaxed);
        if outcome.status.is_none() {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
    }
}

pub const FETCH_TOTAL: &str = "haven_fetch_total";
pub const FETCH_FAILED: &str = "haven_fetch_failed";
pub const FETCH_LATENCY: &str = "haven_fetch_latency_seconds";

/// Feeds the installed `metrics` recorder.
#[derive(Clone, Copy, Debug, Default)]
pub struct FetchMetrics;

impl FetchMetrics {
    pub fn describe() {
        describe_counter!(FETCH_TOTAL, "Requests answered by the gateway");
        describe_counter!(FETCH_FAILED, "Requests that ended without a response");
        describe_histogram!(FETCH_LATENCY, "Time to answer a request");
    }
}

impl FetchObserver for FetchMetrics {
    fn on_response(&self, outcome: &FetchOutcome<'_>) {
        let source = outcome.source.as_str();
        increment_counter!(FETCH_TOTAL, "source" => source);
        if outcome.status.is_none() {
            increment_counter!(FETCH_FAILED, "source" => source);
        }
        histogram!(FETCH_LATENCY, outcome.elapsed.as_secs_f64(), "source" => source);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use std::time::Duration;

    #[test]
    fn stats_count_by_source_and_failures() {
        let stats = FetchStats::new();
        let method = &Method::GET;
        let uri = &Uri::from_static("/index.html");
        let outcome = |source, status| FetchOutcome {
            method,
            uri,
            source,
            status,
            elapsed: Duration::from_millis(1),
        };

        stats.on_response(&outcome(Source::Cache, Some(StatusCode::OK)));
        stats.on_response(&outcome(Source::Cache, Some(StatusCode::OK)));
        stats.on_response(&outcome(Source::Network, None));

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.total, 3);
        assert_eq!(snapshot.failed, 1);
        assert_eq!(snapshot.sources[&Source::Cache], 2);
        assert_eq!(snapshot.sources[&Source::Mock], 0);
    }
}
