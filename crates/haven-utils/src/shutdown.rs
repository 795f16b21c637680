//! One source for the shutdown signal, shared by the gateway server, the admin
//! server and the storage flush so they all wind down together.

use std::sync::Arc;
use tokio::sync::Notify;

/// Cloneable handle that delivers a single, process wide shutdown signal.
#[derive(Clone, Default)]
pub struct ShutdownController {
    pub notify: Arc<Notify>,
}

impl ShutdownController {
    /// Install a task that triggers this controller on SIGINT, SIGTERM or SIGQUIT.
    pub fn install_ctrl_c_handler(&self) {
        tracing::debug!("install_ctrl_c_handler");

        let notify = self.notify.clone();
        tokio::task::spawn(async move {
            shutdown_stream().await;
            notify.notify_waiters();
        });
    }

    /// Manually send the shutdown signal.
    pub fn shutdown(&self) {
        tracing::info!("Shutting down haven.");
        self.notify.notify_waiters();
    }

    /// Wait for the shutdown signal to be sent.
    pub async fn wait_for_shutdown(self) {
        tracing::info!("waiting for shutdown...");
        let future = self.notify.notified();
        tokio::pin!(future);
        future.as_mut().await;
    }
}

#[cfg(unix)]
async fn shutdown_stream() {
    use tokio::signal::unix::{signal, SignalKind};

    let (mut interrupt, mut terminate, mut quit) = match (
        signal(SignalKind::interrupt()),
        signal(SignalKind::terminate()),
        signal(SignalKind::quit()),
    ) {
        (Ok(interrupt), Ok(terminate), Ok(quit)) => (interrupt, terminate, quit),
        _ => {
            tracing::error!("Failed to install signal handlers, falling back to ctrl-c");
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for ctrl-c: {e:?}");
            }
            return;
        }
    };

    tokio::select! {
        _ = interrupt.recv() => {
            tracing::info!("Received ctrl-c signal.");
        }
        _ = terminate.recv() => {
            tracing::info!("Received SIGTERM signal.");
        }
        _ = quit.recv() => {
            tracing::info!("Received SIGQUIT signal.");
        }
    }
}

#[cfg(windows)]
async fn shutdown_stream() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for ctrl-c: {e:?}");
        return;
    }
    tracing::info!("Received ctrl-c signal.");
}
