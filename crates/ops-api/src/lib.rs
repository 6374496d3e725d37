//! HTTP surface of the admin operational backbone.
//!
//! Exposes the notification history/stream and the webhook registry under
//! `/admin`, gated by [`middleware::AdminGate`]. All stateful collaborators
//! are process-wide singletons constructed once at startup and shared through
//! [`AppState`].

use std::sync::Arc;

use axum::routing::{get, post};
use axum::{Json, Router};
use utoipa::OpenApi;

use ops_cache::TtlCache;
use ops_limit::TokenBucketLimiter;
use ops_notify::NotificationBus;
use ops_webhook::{EndpointStore, WebhookDispatcher};

pub mod common;
pub mod middleware;
pub mod notifications;
pub mod webhooks;

pub use middleware::{AdminGate, StaticTokenGate};

/// Shared handles for every request handler.
#[derive(Clone)]
pub struct AppState {
    pub notifications: Arc<NotificationBus>,
    pub endpoints: Arc<dyn EndpointStore>,
    pub dispatcher: WebhookDispatcher,
    pub cache: Arc<TtlCache<serde_json::Value>>,
    pub limiter: Arc<TokenBucketLimiter>,
    pub gate: Arc<dyn AdminGate>,
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Admin Operations API",
        description = "Notification bus, webhook registry and dispatch for the admin surface"
    ),
    components(schemas(
        ops_common::AdminNotification,
        ops_common::Severity,
        ops_common::WebhookEndpoint,
        ops_common::EndpointRegistration,
        ops_webhook::DispatchSummary,
        common::ApiErrorBody,
        common::SuccessResponse,
        notifications::CreateNotificationRequest,
        notifications::MarkReadRequest,
        webhooks::TestDispatchRequest,
    ))
)]
struct ApiDoc;

/// Builds the full route tree over the shared state.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/openapi.json", get(openapi_spec))
        .route(
            "/admin/notifications",
            get(notifications::list_notifications)
                .post(notifications::create_notification)
                .patch(notifications::mark_notification_read),
        )
        .route(
            "/admin/notifications/stream",
            get(notifications::stream_notifications),
        )
        .route(
            "/admin/webhooks",
            get(webhooks::list_endpoints)
                .post(webhooks::create_endpoint)
                .delete(webhooks::delete_endpoint),
        )
        .route("/admin/webhooks/test", post(webhooks::test_dispatch))
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "UP",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn openapi_spec() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
