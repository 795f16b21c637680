#[cfg(test)]
mod tests {
    use crate::{
        config::{GatewayConfig, StorageConfig},
        gateway::{FetchStats, Gateway, Policy, State, SOURCE_HEADER},
        server::{admin_app, build_gateway, flush_storage, gateway_app, open_storage},
        storage::CacheStorage,
        tests::{controlling_gateway, gateway, setup_logger, site},
    };
    use anyhow::Result;
    use axum::{
        body::Body,
        http::{self, Request, StatusCode},
    };
    use chrono::DateTime;
    use serde_json::{json, Value};
    use std::{sync::Arc, time::Duration};
    use tower::ServiceExt;

    async fn json_body(response: axum::response::Response) -> Value {
        let body = hyper::body::to_bytes(response.into_body()).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn ping_is_answered_offline() -> Result<()> {
        setup_logger();
        let upstream = site();
        let gateway = controlling_gateway(&upstream, Policy::NetworkFirst).await;
        let calls = upstream.calls();
        upstream.set_offline(true);

        let response = gateway_app(gateway, Duration::from_millis(100))
            .oneshot(Request::builder().uri("/api/ping").body(Body::empty())?)
            .await?;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get(SOURCE_HEADER).unwrap(), "mock");
        let body = json_body(response).await;
        assert_eq!(body["status"], "online");
        assert!(DateTime::parse_from_rfc3339(body["timestamp"].as_str().unwrap()).is_ok());
        assert_eq!(upstream.calls(), calls);
        Ok(())
    }

    #[tokio::test]
    async fn network_failure_under_cache_first_is_bad_gateway() -> Result<()> {
        let upstream = site();
        let gateway = controlling_gateway(&upstream, Policy::CacheFirst).await;
        upstream.set_offline(true);

        let app = gateway_app(gateway, Duration::from_millis(100));
        let response = app
            .clone()
            .oneshot(Request::builder().uri("/").body(Body::empty())?)
            .await?;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get(SOURCE_HEADER).unwrap(), "cache");

        let response = app
            .oneshot(Request::builder().uri("/not-cached").body(Body::empty())?)
            .await?;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        Ok(())
    }

    #[tokio::test]
    async fn requests_bypass_gateway_until_it_takes_control() -> Result<()> {
        setup_logger();
        let upstream = site();
        let gateway = gateway(&upstream, Policy::CacheFirst);

        let response = gateway_app(gateway.clone(), Duration::from_millis(20))
            .oneshot(Request::builder().uri("/app.js").body(Body::empty())?)
            .await?;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get(SOURCE_HEADER).unwrap(), "passthrough");

        // A request that arrives during install waits for activation.
        let app = gateway_app(gateway.clone(), Duration::from_secs(5));
        let pending = tokio::spawn(
            app.oneshot(Request::builder().uri("/app.js").body(Body::empty())?),
        );
        gateway.install().await?;
        gateway.activate().await?;
        let response = pending.await??;
        assert_eq!(response.headers().get(SOURCE_HEADER).unwrap(), "network");
        assert!(gateway.active_store().await.unwrap().contains("/app.js"));
        Ok(())
    }

    #[tokio::test]
    async fn mocks_answer_without_waiting_for_control() -> Result<()> {
        setup_logger();
        let upstream = site();
        upstream.set_offline(true);
        let gateway = gateway(&upstream, Policy::CacheFirst);

        let app = gateway_app(gateway.clone(), Duration::from_secs(5));
        let response = tokio::time::timeout(
            Duration::from_millis(500),
            app.oneshot(Request::builder().uri("/api/ping").body(Body::empty())?),
        )
        .await
        .expect("mock waited for activation")?;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get(SOURCE_HEADER).unwrap(), "mock");
        assert!(!gateway.is_controlling());
        assert_eq!(upstream.calls(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn storage_round_trips_through_startup_and_shutdown() -> Result<()> {
        setup_logger();
        let dir = tempfile::tempdir()?;
        let config = StorageConfig {
            path: Some(dir.path().join("caches")),
        };

        let storage = open_storage(&config).await?;
        assert!(storage.keys().await.is_empty());
        let upstream = site();
        let first = Gateway::builder(upstream.clone())
            .storage(storage.clone())
            .manifest(["/", "/offline.html"])
            .build();
        first.install().await?;
        first.activate().await?;
        assert_eq!(flush_storage(&config, &storage).await?, 1);

        // Restart with the origin gone.
        upstream.set_offline(true);
        let second = Gateway::builder(upstream.clone())
            .storage(open_storage(&config).await?)
            .manifest(["/", "/offline.html"])
            .build();
        second.install().await?;
        second.activate().await?;
        assert_eq!(second.state().await, State::Activated);

        let response = gateway_app(second, Duration::from_millis(100))
            .oneshot(Request::builder().uri("/").body(Body::empty())?)
            .await?;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get(SOURCE_HEADER).unwrap(), "cache");
        let body = hyper::body::to_bytes(response.into_body()).await?;
        assert_eq!(body, "<html>home</html>");

        let memory_only = StorageConfig::default();
        assert_eq!(flush_storage(&memory_only, &storage).await?, 0);
        Ok(())
    }

    fn admin(gateway: &Gateway<crate::tests::TestUpstream>) -> (axum::Router, Arc<FetchStats>) {
        let stats = Arc::new(FetchStats::new());
        let app = admin_app(
            gateway.clone(),
            Arc::new(GatewayConfig::default()),
            stats.clone(),
            None,
        );
        (app, stats)
    }

    #[tokio::test]
    async fn admin_lists_caches_and_entries() -> Result<()> {
        setup_logger();
        let upstream = site();
        let gateway = controlling_gateway(&upstream, Policy::CacheFirst).await;
        let (app, _) = admin(&gateway);

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/caches").body(Body::empty())?)
            .await?;
        assert_eq!(json_body(response).await, json!(["haven-v1"]));

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/caches/haven-v1").body(Body::empty())?)
            .await?;
        assert_eq!(json_body(response).await, json!(["/", "/offline.html"]));

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/caches/haven-v0").body(Body::empty())?)
            .await?;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app
            .oneshot(Request::builder().uri("/status").body(Body::empty())?)
            .await?;
        let status = json_body(response).await;
        assert_eq!(status["state"], "activated");
        assert_eq!(status["policy"], "cache-first");
        assert_eq!(status["controlling"], true);
        Ok(())
    }

    #[tokio::test]
    async fn admin_update_and_purge() -> Result<()> {
        setup_logger();
        let upstream = site();
        let gateway = controlling_gateway(&upstream, Policy::CacheFirst).await;
        let (app, _) = admin(&gateway);

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method(http::Method::POST)
                    .uri("/update")
                    .header(http::header::CONTENT_TYPE, "application/json")
                    .body(Body::from(serde_json::to_vec(&json!({"version": "v2"}))?))?,
            )
            .await?;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, json!({"store": "haven-v2"}));
        assert_eq!(gateway.storage().keys().await, vec!["haven-v2".to_string()]);

        let response = app
            .oneshot(
                Request::builder()
                    .method(http::Method::POST)
                    .uri("/purge")
                    .body(Body::empty())?,
            )
            .await?;
        assert_eq!(json_body(response).await, json!({"purged": 2}));
        assert!(gateway.active_store().await.unwrap().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn admin_update_rejects_path_like_version() -> Result<()> {
        let upstream = site();
        let gateway = controlling_gateway(&upstream, Policy::CacheFirst).await;
        let (app, _) = admin(&gateway);

        let response = app
            .oneshot(
                Request::builder()
                    .method(http::Method::POST)
                    .uri("/update")
                    .header(http::header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"version":"2024/10"}"#))?,
            )
            .await?;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(gateway.store_name().await, "haven-v1");
        assert_eq!(gateway.storage().keys().await, vec!["haven-v1".to_string()]);
        Ok(())
    }

    #[test]
    fn startup_rejects_path_like_configured_version() {
        let mut config = GatewayConfig::default();
        config.cache.version = "../v1".into();
        let err = build_gateway(&config, CacheStorage::new(), Arc::new(FetchStats::new()))
            .err()
            .expect("version accepted");
        assert!(err.to_string().contains("cache.version"));
    }

    #[tokio::test]
    async fn admin_update_before_activation_conflicts() -> Result<()> {
        let upstream = site();
        let gateway = gateway(&upstream, Policy::CacheFirst);
        let (app, _) = admin(&gateway);

        let response = app
            .oneshot(
                Request::builder()
                    .method(http::Method::POST)
                    .uri("/update")
                    .header(http::header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"version":"v2"}"#))?,
            )
            .await?;
        assert_eq!(response.status(), StatusCode::CONFLICT);
        Ok(())
    }

    #[tokio::test]
    async fn admin_reports_stats() -> Result<()> {
        let upstream = site();
        let gateway = controlling_gateway(&upstream, Policy::CacheFirst).await;
        let (app, stats) = admin(&gateway);
        use crate::gateway::FetchObserver;
        stats.on_response(&crate::gateway::FetchOutcome {
            method: &http::Method::GET,
            uri: &http::Uri::from_static("/"),
            source: crate::gateway::Source::Cache,
            status: Some(StatusCode::OK),
            elapsed: Duration::from_millis(3),
        });

        let response = app
            .oneshot(Request::builder().uri("/stats").body(Body::empty())?)
            .await?;
        let body = json_body(response).await;
        assert_eq!(body["total"], 1);
        assert_eq!(body["sources"]["cache"], 1);
        assert_eq!(body["sources"]["network"], 0);
        Ok(())
    }
}
