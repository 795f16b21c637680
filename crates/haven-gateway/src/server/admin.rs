use crate::{
    config::GatewayConfig,
    error::GatewayError,
    gateway::{FetchStats, Gateway},
    upstream::Upstream,
};
use axum::{
    extract::Path,
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

pub async fn get_config_handler(Extension(config): Extension<Arc<GatewayConfig>>) -> Json<Value> {
    Json(json!(config.as_ref()))
}

pub async fn status_handler<U: Upstream>(
    Extension(gateway): Extension<Gateway<U>>,
) -> Json<Value> {
    Json(json!({
        "state": gateway.state().await,
        "version": gateway.version().await,
        "store": gateway.store_name().await,
        "policy": gateway.policy(),
        "controlling": gateway.is_controlling(),
    }))
}

pub async fn list_caches_handler<U: Upstream>(
    Extension(gateway): Extension<Gateway<U>>,
) -> Json<Vec<String>> {
    Json(gateway.storage().keys().await)
}

pub async fn get_cache_handler<U: Upstream>(
    Path(name): Path<String>,
    Extension(gateway): Extension<Gateway<U>>,
) -> Response {
    match gateway.storage().get(&name).await {
        Some(store) => Json(store.keys()).into_response(),
        None => (StatusCode::NOT_FOUND, format!("no cache named {name}")).into_response(),
    }
}

pub async fn purge_cache_handler<U: Upstream>(
    Extension(gateway): Extension<Gateway<U>>,
) -> Json<Value> {
    Json(json!({ "purged": gateway.purge().await }))
}

#[derive(Deserialize)]
pub struct UpdateRequest {
    pub version: String,
}

pub async fn update_handler<U: Upstream>(
    Extension(gateway): Extension<Gateway<U>>,
    Json(UpdateRequest { version }): Json<UpdateRequest>,
) -> Response {
    match gateway.update(&version).await {
        Ok(()) => Json(json!({ "store": gateway.store_name().await })).into_response(),
        Err(e @ GatewayError::InvalidVersion(_)) => {
            (StatusCode::BAD_REQUEST, e.to_string()).into_response()
        }
        Err(e @ GatewayError::InvalidState { .. }) => {
            (StatusCode::CONFLICT, e.to_string()).into_response()
        }
        Err(e) => (StatusCode::BAD_GATEWAY, e.to_string()).into_response(),
    }
}

pub async fn stats_handler(Extension(stats): Extension<Arc<FetchStats>>) -> Response {
    Json(stats.snapshot()).into_response()
}

pub async fn metrics_handler(Extension(handle): Extension<Arc<PrometheusHandle>>) -> String {
    handle.render()
}
