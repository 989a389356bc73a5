#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, Response, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use delaywatch_api::config::ServerConfig;
use delaywatch_api::router::build_app_router;
use delaywatch_api::state::AppState;
use delaywatch_monitor::fakes::{FakeCollaborators, ScriptedTraffic};
use delaywatch_monitor::retry::RetryPolicy;
use delaywatch_monitor::{MonitorRegistry, MonitorSettings};

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 30,
    }
}

/// A router wired to fake collaborators, plus handles to inspect them.
pub struct TestApp {
    pub router: Router,
    pub registry: Arc<MonitorRegistry>,
    pub fakes: FakeCollaborators,
}

/// Build the full application router with every instance reading `delays`
/// from a scripted traffic source and sleeping 30 minutes between cycles.
pub fn build_test_app(delays: impl IntoIterator<Item = i64>) -> TestApp {
    let config = test_config();
    let fakes = FakeCollaborators::new(ScriptedTraffic::delays(delays));
    let registry = Arc::new(MonitorRegistry::new(
        fakes.collaborators(),
        MonitorSettings {
            poll_interval: Duration::from_secs(1800),
            retry: RetryPolicy::default(),
        },
    ));

    let state = AppState {
        config: Arc::new(config.clone()),
        registry: Arc::clone(&registry),
    };

    TestApp {
        router: build_app_router(state, &config),
        registry,
        fakes,
    }
}

pub fn monitor_body(delivery_id: &str) -> Value {
    serde_json::json!({
        "delivery_id": delivery_id,
        "origin": "Warehouse 7, Leeds",
        "destination": "12 High Street, York",
        "recipient_email": "dispatch@example.com",
        "threshold_minutes": 30,
        "notify_delta_minutes": 10
    })
}

pub async fn get(app: &Router, uri: &str) -> Response<Body> {
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.clone().oneshot(request).await.unwrap()
}

pub async fn post_json(app: &Router, uri: &str, body: Value) -> Response<Body> {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    app.clone().oneshot(request).await.unwrap()
}

pub async fn post_empty(app: &Router, uri: &str) -> Response<Body> {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.clone().oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Start a monitor through the API and return its instance id.
pub async fn start(app: &Router, delivery_id: &str) -> String {
    let response = post_json(app, "/api/v1/monitors", monitor_body(delivery_id)).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let json = body_json(response).await;
    json["data"]["instance_id"].as_str().unwrap().to_string()
}

/// Poll `GET /api/v1/monitors/{id}` until `cond` holds or two seconds pass.
pub async fn wait_for_status(app: &Router, id: &str, cond: impl Fn(&Value) -> bool) -> Value {
    let uri = format!("/api/v1/monitors/{id}");
    for _ in 0..200 {
        let json = body_json(get(app, &uri).await).await;
        if cond(&json["data"]) {
            return json["data"].clone();
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("monitor {id} never reached the expected state");
}
