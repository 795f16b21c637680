use crate::{gateway::Gateway, upstream::Upstream};
use axum::{
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    Extension,
};
use hyper::Body;
use std::time::Duration;
use tracing::{error, warn};

/// How long a request waits for the gateway to take control.
#[derive(Clone, Copy, Debug)]
pub struct ControlTimeout(pub Duration);

pub async fn intercept_handler<U: Upstream>(
    Extension(gateway): Extension<Gateway<U>>,
    Extension(ControlTimeout(timeout)): Extension<ControlTimeout>,
    // NOTE: Make sure to put the request extractor last because once the request
    // is extracted, extensions can't be extracted anymore.
    request: Request<Body>,
) -> Response {
    // Mocks are answered whether or not the gateway is in control yet.
    if !gateway.is_mocked(&request) {
        if let Err(e) = gateway.wait_for_control(timeout).await {
            warn!("Gateway not in control ({e}), bypassing for {}", request.uri());
        }
    }
    match gateway.intercept(request).await {
        Ok(response) => response.into_response(),
        Err(e) => {
            error!("Failed to answer request: {e}");
            (StatusCode::BAD_GATEWAY, e.to_string()).into_response()
        }
    }
}
