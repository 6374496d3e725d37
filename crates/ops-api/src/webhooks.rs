//! Webhook registry routes and the rate-limited test dispatch.

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::Deserialize;
use tracing::info;

use ops_common::{EndpointRegistration, WebhookEndpoint};
use ops_webhook::DispatchSummary;

use crate::common::{ApiError, SuccessResponse};
use crate::middleware::{bearer_token, require_admin};
use crate::AppState;

/// Cache key for the memoized endpoint listing.
const ENDPOINT_LIST_CACHE_KEY: &str = "webhook-endpoints";

#[derive(Debug, Deserialize)]
pub struct DeleteParams {
    pub id: Option<String>,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct TestDispatchRequest {
    #[serde(rename = "type")]
    pub event_type: Option<String>,
    pub data: Option<serde_json::Value>,
}

/// GET /admin/webhooks — every registered endpoint, newest first.
///
/// The listing is memoized through the TTL cache; writes invalidate it.
pub async fn list_endpoints(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<WebhookEndpoint>>, ApiError> {
    require_admin(&state, &headers, "admin:security:read").await?;

    if let Some(cached) = state.cache.get(ENDPOINT_LIST_CACHE_KEY) {
        if let Ok(endpoints) = serde_json::from_value::<Vec<WebhookEndpoint>>(cached) {
            return Ok(Json(endpoints));
        }
    }

    let endpoints = state
        .endpoints
        .list()
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;

    if let Ok(value) = serde_json::to_value(&endpoints) {
        state.cache.set(ENDPOINT_LIST_CACHE_KEY, value, None);
    }
    Ok(Json(endpoints))
}

/// POST /admin/webhooks — register an endpoint.
///
/// The signing secret is generated here and returned exactly once, in this
/// response.
pub async fn create_endpoint(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(registration): Json<EndpointRegistration>,
) -> Result<(StatusCode, Json<WebhookEndpoint>), ApiError> {
    require_admin(&state, &headers, "admin:security:write").await?;

    if registration.url.trim().is_empty() || registration.events.is_empty() {
        return Err(ApiError::bad_request(
            "url and at least one event are required",
        ));
    }

    let endpoint = state
        .endpoints
        .create(registration)
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;

    state.cache.remove(ENDPOINT_LIST_CACHE_KEY);
    info!(endpoint_id = %endpoint.id, url = %endpoint.url, "Webhook endpoint registered");
    Ok((StatusCode::CREATED, Json(endpoint)))
}

/// DELETE /admin/webhooks?id= — remove an endpoint.
pub async fn delete_endpoint(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<DeleteParams>,
) -> Result<Json<SuccessResponse>, ApiError> {
    require_admin(&state, &headers, "admin:security:write").await?;

    let id = params
        .id
        .ok_or_else(|| ApiError::bad_request("id is required"))?;

    let removed = state
        .endpoints
        .delete(&id)
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;

    state.cache.remove(ENDPOINT_LIST_CACHE_KEY);
    if removed {
        info!(endpoint_id = %id, "Webhook endpoint removed");
    }
    Ok(SuccessResponse::ok())
}

/// POST /admin/webhooks/test — dispatch a test event to subscribed endpoints.
///
/// Guarded by the token bucket per caller identity; rejections carry both a
/// `Retry-After` header and a `retryAfterMs` detail.
pub async fn test_dispatch(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<TestDispatchRequest>,
) -> Result<Json<DispatchSummary>, ApiError> {
    require_admin(&state, &headers, "admin:security:write").await?;

    let caller = bearer_token(&headers).unwrap_or("anonymous");
    let decision = state.limiter.consume_one(&format!("webhook-test:{}", caller));
    if !decision.allowed {
        return Err(ApiError::rate_limited(
            decision.retry_after_ms.unwrap_or(1000),
        ));
    }

    let event_type = request
        .event_type
        .unwrap_or_else(|| "test.webhook".to_string());
    let data = request
        .data
        .unwrap_or_else(|| serde_json::json!({ "test": true }));

    let summary = state
        .dispatcher
        .dispatch(&event_type, data)
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;

    Ok(Json(summary))
}
