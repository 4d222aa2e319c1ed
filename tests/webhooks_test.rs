//! Integration tests for post-commit webhook fan-out
//!
//! Uses wiremock targets to check ordering, timeouts and failure isolation.

use std::time::{Duration, Instant};

use serde_json::json;
use wiremock::{
    matchers::{body_partial_json, method, path},
    Mock, MockServer, ResponseTemplate,
};

use care_quality_engine::config::WebhookConfig;
use care_quality_engine::webhooks::WebhookDispatcher;

fn create_dispatcher(urls: Vec<String>, timeout_ms: u64) -> WebhookDispatcher {
    let config = WebhookConfig {
        urls,
        timeout_ms,
        max_concurrency: 4,
    };
    WebhookDispatcher::new(&config).expect("Failed to create dispatcher")
}

#[tokio::test]
async fn test_results_follow_configured_order() {
    let fast = MockServer::start().await;
    let failing = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/hook"))
        .and(body_partial_json(json!({"visit_id": "visit-1"})))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&fast)
        .await;

    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&failing)
        .await;

    let urls = vec![
        format!("{}/hook", failing.uri()),
        format!("{}/hook", fast.uri()),
    ];
    let dispatcher = create_dispatcher(urls.clone(), 2000);

    let response = dispatcher.trigger("visit-1").await;

    assert_eq!(response.status, "triggered");
    assert_eq!(response.visit_id, "visit-1");
    assert_eq!(response.results.len(), 2);
    assert_eq!(response.results[0].url, urls[0]);
    assert_eq!(response.results[0].status, Some(500));
    assert!(!response.results[0].is_success());
    assert_eq!(response.results[1].url, urls[1]);
    assert_eq!(response.results[1].status, Some(204));
    assert_eq!(response.succeeded(), 1);
}

#[tokio::test]
async fn test_slow_target_times_out_without_blocking_others() {
    let slow = MockServer::start().await;
    let fast = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
        .mount(&slow)
        .await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&fast)
        .await;

    let dispatcher = create_dispatcher(vec![slow.uri(), fast.uri()], 200);

    let start = Instant::now();
    let response = dispatcher.trigger("visit-2").await;

    assert!(start.elapsed() < Duration::from_secs(3));
    assert_eq!(response.results.len(), 2);
    assert_eq!(response.results[0].status, None);
    assert!(response.results[0].error.is_some());
    assert!(response.results[1].is_success());
}

#[tokio::test]
async fn test_unreachable_target_reports_error() {
    let dispatcher = create_dispatcher(vec!["http://127.0.0.1:1/hook".to_string()], 500);

    let response = dispatcher.trigger("visit-3").await;

    assert_eq!(response.results.len(), 1);
    assert!(response.results[0].status.is_none());
    assert!(response.results[0].error.is_some());
    assert_eq!(response.succeeded(), 0);
}
