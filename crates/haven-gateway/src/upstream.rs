use crate::error::FetchError;
use async_trait::async_trait;
use axum::http::{header, Request, Response, Uri};
use hyper::{client::HttpConnector, Body, Client};
use hyper_tls::HttpsConnector;
use tracing::debug;

/// The network side of the gateway.
#[async_trait]
pub trait Upstream: Send + Sync + 'static {
    async fn fetch(&self, request: Request<Body>) -> Result<Response<Body>, FetchError>;
}

/// Forwards requests to a fixed origin over http or https.
pub struct HttpUpstream {
    origin: String,
    client: Client<HttpsConnector<HttpConnector>, Body>,
}

impl HttpUpstream {
    pub fn new(origin: &str) -> Result<Self, FetchError> {
        // Validate once so every request only needs to append its path.
        origin.parse::<Uri>()?;
        Ok(Self {
            origin: origin.trim_end_matches('/').to_string(),
            client: Client::builder().build::<_, Body>(HttpsConnector::new()),
        })
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    fn endpoint(&self, uri: &Uri) -> Result<Uri, FetchError> {
        let path = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
        Ok(format!("{}{}", self.origin, path).parse::<Uri>()?)
    }
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn fetch(&self, mut request: Request<Body>) -> Result<Response<Body>, FetchError> {
        let endpoint = self.endpoint(request.uri())?;
        debug!("Sending {} request to {endpoint}", request.method());
        *request.uri_mut() = endpoint;
        // The client derives Host from the origin.
        request.headers_mut().remove(header::HOST);
        Ok(self.client.request(request).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_keeps_path_and_query() {
        let upstream = HttpUpstream::new("http://127.0.0.1:8080/").unwrap();
        assert_eq!(upstream.origin(), "http://127.0.0.1:8080");

        let uri: Uri = "/forge/models?id=7".parse().unwrap();
        assert_eq!(
            upstream.endpoint(&uri).unwrap(),
            "http://127.0.0.1:8080/forge/models?id=7"
        );
    }

    #[test]
    fn rejects_invalid_origin() {
        assert!(matches!(
            HttpUpstream::new("http://bad host"),
            Err(FetchError::InvalidUri(_))
        ));
    }
}
