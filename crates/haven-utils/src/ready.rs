//! A value that becomes available exactly once.
//!
//! The producer calls [`Readiness::resolve`] when its work is done; consumers
//! await it with an explicit deadline instead of polling shared state.

use std::{future, sync::Arc, time::Duration};
use thiserror::Error;
use tokio::sync::watch;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReadyError {
    #[error("not ready after {0:?}")]
    Timeout(Duration),
    #[error("already resolved")]
    AlreadyResolved,
}

#[derive(Clone)]
pub struct Readiness<T> {
    tx: Arc<watch::Sender<Option<T>>>,
}

impl<T: Clone> Default for Readiness<T> {
    fn default() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }
}

impl<T: Clone> Readiness<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve with `value`. Only the first call wins; later calls keep the
    /// original value and return [`ReadyError::AlreadyResolved`].
    pub fn resolve(&self, value: T) -> Result<(), ReadyError> {
        let mut resolved = false;
        self.tx.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(value);
            resolved = true;
            true
        });
        if resolved {
            Ok(())
        } else {
            Err(ReadyError::AlreadyResolved)
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.tx.borrow().is_some()
    }

    pub fn get(&self) -> Option<T> {
        self.tx.borrow().clone()
    }

    /// Wait until resolved, however long that takes.
    pub async fn wait(&self) -> T {
        let mut rx = self.tx.subscribe();
        loop {
            if let Some(value) = rx.borrow_and_update().clone() {
                return value;
            }
            if rx.changed().await.is_err() {
                // The sender lives as long as `self`, this is unreachable in practice.
                future::pending::<()>().await;
            }
        }
    }

    pub async fn wait_timeout(&self, timeout: Duration) -> Result<T, ReadyError> {
        tokio::time::timeout(timeout, self.wait())
            .await
            .map_err(|_| ReadyError::Timeout(timeout))
    }
}
