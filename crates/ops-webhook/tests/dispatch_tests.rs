//! Dispatcher integration tests against a mock HTTP receiver.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use ops_common::{EndpointRegistration, WebhookEndpoint};
use ops_webhook::{
    verify_signature, EndpointStore, InMemoryEndpointStore, WebhookDispatcher,
    WebhookDispatcherConfig,
};

fn registration(url: String, events: &[&str]) -> EndpointRegistration {
    EndpointRegistration {
        url,
        events: events.iter().map(|e| e.to_string()).collect(),
        description: None,
        headers: None,
    }
}

fn dispatcher(store: &Arc<InMemoryEndpointStore>) -> WebhookDispatcher {
    WebhookDispatcher::new(store.clone(), WebhookDispatcherConfig::default()).unwrap()
}

fn header_value(request: &wiremock::Request, name: &str) -> String {
    request
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

#[tokio::test]
async fn delivers_signed_event_to_subscribed_endpoint() {
    let server = MockServer::start().await;
    let store = Arc::new(InMemoryEndpointStore::new());
    let endpoint = store
        .create(registration(
            format!("{}/hook", server.uri()),
            &["order.created"],
        ))
        .await
        .unwrap();

    Mock::given(method("POST"))
        .and(path("/hook"))
        .and(header("Content-Type", "application/json"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let summary = dispatcher(&store)
        .dispatch("order.created", json!({"orderId": "O-1"}))
        .await
        .unwrap();
    assert_eq!(summary.attempted, 1);

    let requests = server.received_requests().await.unwrap();
    let request = &requests[0];

    assert_eq!(header_value(request, "X-Webhook-Id"), summary.event_id);
    assert_eq!(header_value(request, "X-Webhook-Type"), "order.created");

    // The signature verifies over the exact received bytes.
    let signature = header_value(request, "X-Webhook-Signature");
    assert!(verify_signature(&endpoint.secret, &request.body, &signature));
}

#[tokio::test]
async fn unsubscribed_endpoint_is_left_untouched() {
    let server = MockServer::start().await;
    let store = Arc::new(InMemoryEndpointStore::new());

    store
        .create(registration(
            format!("{}/subscribed", server.uri()),
            &["order.created"],
        ))
        .await
        .unwrap();
    let bystander = store
        .create(registration(
            format!("{}/bystander", server.uri()),
            &["coupon.created"],
        ))
        .await
        .unwrap();

    Mock::given(method("POST"))
        .and(path("/subscribed"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/bystander"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let summary = dispatcher(&store)
        .dispatch("order.created", json!({"orderId": "O-1"}))
        .await
        .unwrap();
    assert_eq!(summary.attempted, 1);

    let untouched = store.get(&bystander.id).await.unwrap().unwrap();
    assert!(untouched.last_delivery_at.is_none());
    assert!(untouched.last_status.is_none());
}

#[tokio::test]
async fn inactive_endpoint_receives_no_attempt() {
    let server = MockServer::start().await;
    let store = Arc::new(InMemoryEndpointStore::new());
    let endpoint = store
        .create(registration(
            format!("{}/hook", server.uri()),
            &["order.created"],
        ))
        .await
        .unwrap();
    store.set_active(&endpoint.id, false).await.unwrap();

    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let summary = dispatcher(&store)
        .dispatch("order.created", json!({"orderId": "O-1"}))
        .await
        .unwrap();

    assert_eq!(summary.attempted, 0);
    let stored = store.get(&endpoint.id).await.unwrap().unwrap();
    assert!(stored.last_delivery_at.is_none());
}

#[tokio::test]
async fn server_error_is_a_completed_attempt_with_recorded_status() {
    let server = MockServer::start().await;
    let store = Arc::new(InMemoryEndpointStore::new());
    let endpoint = store
        .create(registration(
            format!("{}/hook", server.uri()),
            &["order.created"],
        ))
        .await
        .unwrap();

    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let summary = dispatcher(&store)
        .dispatch("order.created", json!({"orderId": "O-1"}))
        .await
        .unwrap();
    assert_eq!(summary.attempted, 1);

    let stored = store.get(&endpoint.id).await.unwrap().unwrap();
    assert_eq!(stored.last_status.as_deref(), Some("500"));
    assert!(stored.last_delivery_at.is_some());
}

#[tokio::test]
async fn network_failure_records_a_failure_marker() {
    let store = Arc::new(InMemoryEndpointStore::new());
    // Nothing listens here; connections are refused.
    let endpoint = store
        .create(registration(
            "http://127.0.0.1:9".to_string(),
            &["order.created"],
        ))
        .await
        .unwrap();

    let dispatcher = WebhookDispatcher::new(
        store.clone(),
        WebhookDispatcherConfig {
            connect_timeout: Duration::from_millis(500),
            request_timeout: Duration::from_millis(500),
        },
    )
    .unwrap();

    let summary = dispatcher
        .dispatch("order.created", json!({"orderId": "O-1"}))
        .await
        .unwrap();
    assert_eq!(summary.attempted, 1);

    let stored = store.get(&endpoint.id).await.unwrap().unwrap();
    assert_eq!(stored.last_status.as_deref(), Some("failed"));
    assert!(stored.last_delivery_at.is_some());
}

#[tokio::test]
async fn one_failing_endpoint_does_not_affect_the_other() {
    let server = MockServer::start().await;
    let store = Arc::new(InMemoryEndpointStore::new());

    store
        .create(registration(
            "http://127.0.0.1:9".to_string(),
            &["order.created"],
        ))
        .await
        .unwrap();
    let healthy = store
        .create(registration(
            format!("{}/hook", server.uri()),
            &["order.created"],
        ))
        .await
        .unwrap();

    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let dispatcher = WebhookDispatcher::new(
        store.clone(),
        WebhookDispatcherConfig {
            connect_timeout: Duration::from_millis(500),
            request_timeout: Duration::from_millis(500),
        },
    )
    .unwrap();

    let summary = dispatcher
        .dispatch("order.created", json!({"orderId": "O-1"}))
        .await
        .unwrap();

    assert_eq!(summary.attempted, 2);
    let stored = store.get(&healthy.id).await.unwrap().unwrap();
    assert_eq!(stored.last_status.as_deref(), Some("200"));
}

#[tokio::test]
async fn custom_headers_are_forwarded() {
    let server = MockServer::start().await;
    let store = Arc::new(InMemoryEndpointStore::new());

    let mut headers = HashMap::new();
    headers.insert("X-Tenant".to_string(), "storefront-7".to_string());
    store
        .create(EndpointRegistration {
            url: format!("{}/hook", server.uri()),
            events: vec!["order.created".to_string()],
            description: Some("tenant hook".to_string()),
            headers: Some(headers),
        })
        .await
        .unwrap();

    Mock::given(method("POST"))
        .and(path("/hook"))
        .and(header("X-Tenant", "storefront-7"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let summary = dispatcher(&store)
        .dispatch("order.created", json!({}))
        .await
        .unwrap();
    assert_eq!(summary.attempted, 1);
}

/// End-to-end scenario: known secret, delivered body round-trips, signature
/// verifies, status is recorded.
#[tokio::test]
async fn order_created_scenario_with_known_secret() {
    let server = MockServer::start().await;
    let store = Arc::new(InMemoryEndpointStore::new());

    let endpoint = WebhookEndpoint {
        id: "ep-scenario".to_string(),
        url: format!("{}/hook", server.uri()),
        description: None,
        events: vec!["order.created".to_string()],
        headers: None,
        secret: "s3cr3t".to_string(),
        is_active: true,
        created_at: Utc::now(),
        last_delivery_at: None,
        last_status: None,
    };
    store.insert(endpoint);

    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let summary = dispatcher(&store)
        .dispatch("order.created", json!({"orderId": "O-1"}))
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    let request = &requests[0];

    let envelope: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
    assert_eq!(envelope["id"], summary.event_id.as_str());
    assert_eq!(envelope["type"], "order.created");
    assert_eq!(envelope["data"]["orderId"], "O-1");

    let signature = header_value(request, "X-Webhook-Signature");
    assert!(verify_signature("s3cr3t", &request.body, &signature));

    let stored = store.get("ep-scenario").await.unwrap().unwrap();
    assert_eq!(stored.last_status.as_deref(), Some("200"));
}
