//! HTTP-level tests for the proxy probe and the alert webhook
//!
//! These tests use wiremock to stand in for a forward proxy and for the
//! alert receiver.

use shelf_harvester::harvest::{HttpProxyProbe, ProxyPool, ProxyProbe, ProxyStatus};
use shelf_harvester::monitoring::{AlertSink, WebhookAlerts};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PROBE_TARGET: &str = "http://probe.invalid/ip";

#[tokio::test]
async fn test_probe_succeeds_through_working_proxy() {
    let proxy = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"origin": "10.0.0.1"}"#))
        .mount(&proxy)
        .await;

    let probe = HttpProxyProbe::new(PROBE_TARGET);
    assert!(probe.probe(&proxy.uri(), Duration::from_secs(5)).await);
}

#[tokio::test]
async fn test_probe_fails_on_error_status() {
    let proxy = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&proxy)
        .await;

    let probe = HttpProxyProbe::new(PROBE_TARGET);
    assert!(!probe.probe(&proxy.uri(), Duration::from_secs(5)).await);
}

#[tokio::test]
async fn test_probe_fails_on_unreachable_proxy() {
    let probe = HttpProxyProbe::new(PROBE_TARGET);
    assert!(!probe.probe("http://127.0.0.1:1", Duration::from_secs(2)).await);
}

#[tokio::test]
async fn test_probe_fails_when_proxy_is_too_slow() {
    let proxy = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .mount(&proxy)
        .await;

    let probe = HttpProxyProbe::new(PROBE_TARGET);
    assert!(!probe.probe(&proxy.uri(), Duration::from_millis(200)).await);
}

#[tokio::test]
async fn test_pool_selects_the_live_proxy() {
    let live = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&live)
        .await;

    let dead = "http://127.0.0.1:1".to_string();
    let mut pool = ProxyPool::new(
        vec![dead.clone(), live.uri()],
        Arc::new(HttpProxyProbe::new(PROBE_TARGET)),
        Duration::from_secs(2),
    );

    let selected = pool.select().await.unwrap();
    assert_eq!(selected.address, live.uri());
    assert_ne!(pool.status_of(&dead), Some(ProxyStatus::Healthy));
}

#[tokio::test]
async fn test_webhook_alert_posts_json() {
    let receiver = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hooks/alerts"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&receiver)
        .await;

    let alerts = WebhookAlerts::new(format!("{}/hooks/alerts", receiver.uri())).unwrap();
    alerts
        .notify("Harvest failed: tea", "No records were harvested.")
        .await;

    let requests = receiver.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["subject"], "[Shelf Harvester Alert] Harvest failed: tea");
    assert!(body["body"]
        .as_str()
        .unwrap()
        .contains("No records were harvested."));
}

#[tokio::test]
async fn test_webhook_failure_is_swallowed() {
    let receiver = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&receiver)
        .await;

    let alerts = WebhookAlerts::new(receiver.uri()).unwrap();
    // Must return normally even though delivery failed
    alerts.notify("Subject", "Body").await;

    let unreachable = WebhookAlerts::new("http://127.0.0.1:1/alerts").unwrap();
    unreachable.notify("Subject", "Body").await;
}
