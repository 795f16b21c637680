mod admin;
mod handler;

pub use handler::ControlTimeout;

use crate::{
    config::{GatewayConfig, StorageConfig},
    gateway::{check_version, FetchLog, FetchMetrics, FetchStats, Gateway},
    storage::CacheStorage,
    upstream::{HttpUpstream, Upstream},
};
use admin::{
    get_cache_handler, get_config_handler, list_caches_handler, metrics_handler,
    purge_cache_handler, stats_handler, status_handler, update_handler,
};
use anyhow::{Context, Result};
use axum::{
    routing::{get, post},
    Extension, Router,
};
use axum_server::{tls_rustls::RustlsConfig, Handle};
use handler::intercept_handler;
use haven_utils::ShutdownController;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::{
    net::{IpAddr, SocketAddr},
    sync::Arc,
    time::Duration,
};
use tokio::{select, task::JoinSet};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Every request, whatever its method or path, goes through the gateway.
pub fn gateway_app<U: Upstream>(gateway: Gateway<U>, control_timeout: Duration) -> Router {
    Router::new()
        .fallback(intercept_handler::<U>)
        .layer(Extension(gateway))
        .layer(Extension(ControlTimeout(control_timeout)))
        .layer(TraceLayer::new_for_http())
}

pub fn admin_app<U: Upstream>(
    gateway: Gateway<U>,
    config: Arc<GatewayConfig>,
    stats: Arc<FetchStats>,
    metrics: Option<Arc<PrometheusHandle>>,
) -> Router {
    let mut app = Router::new()
        .route("/config", get(get_config_handler))
        .route("/status", get(status_handler::<U>))
        .route("/caches", get(list_caches_handler::<U>))
        .route("/caches/:name", get(get_cache_handler::<U>))
        .route("/purge", post(purge_cache_handler::<U>))
        .route("/update", post(update_handler::<U>))
        .route("/stats", get(stats_handler));
    if let Some(handle) = metrics {
        app = app
            .route("/metrics", get(metrics_handler))
            .layer(Extension(handle));
    }
    app.layer(Extension(gateway))
        .layer(Extension(config))
        .layer(Extension(stats))
}

/// Build the gateway described by `config` on top of `storage`.
pub fn build_gateway(
    config: &GatewayConfig,
    storage: CacheStorage,
    stats: Arc<FetchStats>,
) -> Result<Gateway<HttpUpstream>> {
    check_version(&config.cache.prefix).context("Invalid cache.prefix")?;
    check_version(&config.cache.version).context("Invalid cache.version")?;
    let upstream = HttpUpstream::new(&config.origin.url)
        .with_context(|| format!("Invalid origin: {}", config.origin.url))?;
    Ok(Gateway::builder(upstream)
        .storage(storage)
        .prefix(config.cache.prefix.clone())
        .version(config.cache.version.clone())
        .manifest(&config.cache.manifest)
        .mocks(config.mock_table()?)
        .policy(config.cache.policy)
        .offline_page(config.cache.offline_page.clone())
        .observer(Arc::new(FetchLog))
        .observer(Arc::new(FetchMetrics))
        .observer(stats)
        .build())
}

fn bind_addr(addr: &str, port: u16) -> Result<SocketAddr> {
    Ok(SocketAddr::from((
        addr.parse::<IpAddr>()
            .with_context(|| format!("Invalid binding address: {addr}"))?,
        port,
    )))
}

/// Storage restored from `storage.path`, or empty in-memory storage.
pub async fn open_storage(config: &StorageConfig) -> Result<CacheStorage> {
    match &config.path {
        Some(path) => CacheStorage::load(path)
            .await
            .with_context(|| format!("Failed to restore caches from {path:?}")),
        None => Ok(CacheStorage::new()),
    }
}

/// Write `storage` back to `storage.path`. Returns the number of stores written.
pub async fn flush_storage(config: &StorageConfig, storage: &CacheStorage) -> Result<usize> {
    match &config.path {
        Some(path) => storage
            .persist(path)
            .await
            .with_context(|| format!("Failed to persist caches to {path:?}")),
        None => Ok(0),
    }
}

/// Run the gateway and admin servers until shutdown, then flush storage.
pub async fn start(config: GatewayConfig, shutdown: ShutdownController) -> Result<()> {
    let storage = open_storage(&config.storage).await?;
    let stats = Arc::new(FetchStats::new());
    let gateway = build_gateway(&config, storage.clone(), stats.clone())?;

    let metrics = PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install metrics recorder")?;
    FetchMetrics::describe();

    let config = Arc::new(config);
    let handle = Handle::new();
    let mut workers: JoinSet<Result<()>> = JoinSet::new();

    let lifecycle = gateway.clone();
    workers.spawn(async move {
        lifecycle.install().await.context("Install failed")?;
        lifecycle.activate().await.context("Activate failed")?;
        // Lifecycle done, keep the worker alive so it does not trigger shutdown.
        std::future::pending::<()>().await;
        Ok(())
    });

    let admin_addr = bind_addr(&config.admin_server.addr, config.admin_server.port)?;
    let admin = admin_app(
        gateway.clone(),
        config.clone(),
        stats,
        Some(Arc::new(metrics)),
    );
    let admin_handle = handle.clone();
    info!("admin server listening on {admin_addr}");
    workers.spawn(async move {
        axum_server::bind(admin_addr)
            .handle(admin_handle)
            .serve(admin.into_make_service())
            .await
            .context("admin server stopped")
    });

    let addr = bind_addr(&config.server.addr, config.server.port)?;
    let app = gateway_app(
        gateway.clone(),
        Duration::from_millis(config.cache.control_timeout),
    );
    let server_handle = handle.clone();
    match config.tls_paths() {
        Some((cert_path, key_path)) => {
            let rustls_config = RustlsConfig::from_pem_file(&cert_path, &key_path)
                .await
                .with_context(|| {
                    format!("failed to init tls from:\ncert: {cert_path:?}:\npath:{key_path:?}")
                })?;
            info!("gateway listening on https://{addr}");
            workers.spawn(async move {
                axum_server::bind_rustls(addr, rustls_config)
                    .handle(server_handle)
                    .serve(app.into_make_service())
                    .await
                    .context("gateway server stopped")
            });
        }
        None => {
            info!("gateway listening on http://{addr}");
            workers.spawn(async move {
                axum_server::bind(addr)
                    .handle(server_handle)
                    .serve(app.into_make_service())
                    .await
                    .context("gateway server stopped")
            });
        }
    }

    let result = select! {
        Some(joined) = workers.join_next() => match joined {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e),
            Err(e) => Err(e).context("worker panicked"),
        },
        _ = shutdown.wait_for_shutdown() => Ok(()),
    };
    graceful_shutdown(workers, handle).await;

    if let Err(e) = flush_storage(&config.storage, &storage).await {
        error!("{e:#}");
    }
    result
}

async fn graceful_shutdown(mut workers: JoinSet<Result<()>>, handle: Handle) {
    info!("Shutting down servers");
    handle.graceful_shutdown(Some(Duration::from_secs(30)));
    workers.shutdown().await;
}
