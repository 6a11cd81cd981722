//! Metrics emitted by the HTTP layer and the inference pool.
//!
//! Blocking inference runs on other threads, so these tests install a
//! process-wide Prometheus recorder. Keep them in their own test binary.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use textgen_service::config::TextgenConfig;
use textgen_service::services::inference_pool::IN_FLIGHT_GAUGE;
use textgen_service::services::{InferencePool, MockTextGenerator};
use textgen_service::{build_router, AppState};
use tower::util::ServiceExt;

fn recorder() -> &'static PrometheusHandle {
    static HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();
    HANDLE.get_or_init(|| {
        PrometheusBuilder::new()
            .install_recorder()
            .expect("Failed to install Prometheus recorder")
    })
}

/// Value of an unlabelled sample, e.g. `name 3`.
fn unlabelled_sample(rendered: &str, name: &str) -> Option<f64> {
    rendered
        .lines()
        .filter_map(|line| line.strip_prefix(name))
        .find_map(|rest| rest.strip_prefix(' '))
        .and_then(|value| value.trim().parse().ok())
}

fn labelled_lines<'a>(rendered: &'a str, name: &str) -> Vec<&'a str> {
    let prefix = format!("{}{{", name);
    rendered
        .lines()
        .filter(|line| line.starts_with(&prefix))
        .collect()
}

async fn status_of(app: Router, uri: &str) -> StatusCode {
    app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
        .status()
}

#[tokio::test]
async fn http_metrics_are_labelled_by_route_template() {
    let handle = recorder();
    let state = AppState::new(
        TextgenConfig::for_tests(),
        Arc::new(MockTextGenerator::new()),
    );
    let app = build_router(state);

    assert_eq!(status_of(app.clone(), "/generate?text=x").await, StatusCode::OK);
    assert_eq!(status_of(app.clone(), "/nope").await, StatusCode::NOT_FOUND);

    let rendered = handle.render();
    let requests = labelled_lines(&rendered, "http_requests_total");

    assert!(
        requests
            .iter()
            .any(|l| l.contains(r#"path="/generate""#) && l.contains(r#"status="200""#)),
        "no /generate sample in:\n{}",
        rendered
    );
    assert!(
        requests
            .iter()
            .any(|l| l.contains(r#"path="unmatched""#) && l.contains(r#"status="404""#)),
        "no unmatched sample in:\n{}",
        rendered
    );
    assert!(
        requests.iter().all(|l| !l.contains("text=") && !l.contains("/nope")),
        "raw paths leaked into labels:\n{}",
        rendered
    );
    assert!(rendered
        .lines()
        .any(|l| l.starts_with("http_request_duration_seconds") && l.contains(r#"path="/generate""#)));
}

#[tokio::test]
async fn metrics_are_not_served_on_service_routes() {
    recorder();
    let state = AppState::new(
        TextgenConfig::for_tests(),
        Arc::new(MockTextGenerator::new()),
    );

    assert_eq!(
        status_of(build_router(state), "/metrics").await,
        StatusCode::NOT_FOUND
    );
}

#[tokio::test]
async fn in_flight_gauge_settles_after_abandoned_call() {
    let handle = recorder();
    let generator = MockTextGenerator::new().with_delay(Duration::from_millis(300));
    let pool = InferencePool::new(Arc::new(generator), 1, 4);

    let call = tokio::spawn({
        let pool = pool.clone();
        async move { pool.generate("abandoned".to_string()).await }
    });
    for _ in 0..400 {
        if pool.in_flight() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(pool.in_flight(), 1);

    // Same as axum dropping the handler future on client disconnect.
    call.abort();

    for _ in 0..400 {
        if pool.admitted() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(pool.admitted(), 0);
    assert_eq!(pool.in_flight(), 0);

    // Other tests in this binary may briefly hold the gauge above zero.
    let mut gauge = None;
    for _ in 0..400 {
        gauge = unlabelled_sample(&handle.render(), IN_FLIGHT_GAUGE);
        if gauge == Some(0.0) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(gauge, Some(0.0));
}
