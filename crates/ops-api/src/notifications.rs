//! Admin notification routes: history, publishing, read flags, live stream.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::sse::{Event, Sse};
use axum::Json;
use futures::stream::{self, Stream};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::time::{Instant, Interval};
use tracing::{debug, warn};

use ops_common::{AdminNotification, NotificationInput, Severity};
use ops_notify::Subscription;

use crate::common::{ApiError, SuccessResponse};
use crate::middleware::require_admin;
use crate::AppState;

/// Reconnect delay hint sent to EventSource clients.
const RETRY_HINT: Duration = Duration::from_millis(5000);

/// Interval between keepalive data frames on an idle stream.
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(25);

const DEFAULT_LIST_LIMIT: usize = 50;

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct CreateNotificationRequest {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub message: Option<String>,
    pub severity: Option<Severity>,
    pub data: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct MarkReadRequest {
    pub id: Option<String>,
}

/// GET /admin/notifications — newest-first history.
pub async fn list_notifications(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<AdminNotification>>, ApiError> {
    require_admin(&state, &headers, "admin:access").await?;

    let limit = params.limit.unwrap_or(DEFAULT_LIST_LIMIT);
    Ok(Json(state.notifications.list(limit)))
}

/// POST /admin/notifications — publish a notification.
pub async fn create_notification(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateNotificationRequest>,
) -> Result<Json<AdminNotification>, ApiError> {
    require_admin(&state, &headers, "admin:security:write").await?;

    let mut input = NotificationInput::new(
        request.kind.unwrap_or_else(|| "generic".to_string()),
        request.message.unwrap_or_else(|| "Notification".to_string()),
    );
    if let Some(severity) = request.severity {
        input = input.with_severity(severity);
    }
    if let Some(data) = request.data {
        input = input.with_data(data);
    }

    Ok(Json(state.notifications.publish(input)))
}

/// PATCH /admin/notifications — mark one notification read.
///
/// Unknown ids still acknowledge; only a missing id is a client error.
pub async fn mark_notification_read(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<MarkReadRequest>,
) -> Result<Json<SuccessResponse>, ApiError> {
    require_admin(&state, &headers, "admin:access").await?;

    let id = request
        .id
        .ok_or_else(|| ApiError::bad_request("id is required"))?;

    if !state.notifications.mark_read(&id) {
        debug!(notification_id = %id, "Mark-read for unknown notification id");
    }
    Ok(SuccessResponse::ok())
}

struct StreamState {
    rx: mpsc::UnboundedReceiver<AdminNotification>,
    keepalive: Interval,
    sent_retry_hint: bool,
    // Dropping the state deregisters the bus subscriber.
    _subscription: Subscription,
}

/// GET /admin/notifications/stream — live notification feed over SSE.
///
/// Emits a reconnect hint up front, then one data frame per publish and a
/// keepalive frame on idle. Everything the stream holds (bus subscription,
/// keepalive timer, channel) is released when the client disconnects.
pub async fn stream_notifications(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>, ApiError> {
    require_admin(&state, &headers, "admin:access").await?;

    let (tx, rx) = mpsc::unbounded_channel();
    let subscription = state.notifications.subscribe(move |notification| {
        // The receiver disappears on disconnect; a failed send is fine.
        let _ = tx.send(notification.clone());
    });

    let keepalive = tokio::time::interval_at(
        Instant::now() + KEEPALIVE_INTERVAL,
        KEEPALIVE_INTERVAL,
    );

    let initial = StreamState {
        rx,
        keepalive,
        sent_retry_hint: false,
        _subscription: subscription,
    };

    let stream = stream::unfold(initial, |mut state| async move {
        if !state.sent_retry_hint {
            state.sent_retry_hint = true;
            return Some((Ok(Event::default().retry(RETRY_HINT)), state));
        }

        tokio::select! {
            received = state.rx.recv() => match received {
                Some(notification) => Some((Ok(notification_event(&notification)), state)),
                None => None,
            },
            _ = state.keepalive.tick() => Some((Ok(keepalive_event()), state)),
        }
    });

    Ok(Sse::new(stream))
}

fn notification_event(notification: &AdminNotification) -> Event {
    let payload = match serde_json::to_string(notification) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(notification_id = %notification.id, error = %e, "Failed to encode notification frame");
            "{}".to_string()
        }
    };
    Event::default().data(payload)
}

fn keepalive_event() -> Event {
    let frame = serde_json::json!({
        "type": "keepalive",
        "ts": chrono::Utc::now().timestamp_millis(),
    });
    Event::default().data(frame.to_string())
}
