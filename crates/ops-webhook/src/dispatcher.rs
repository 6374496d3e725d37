//! Webhook dispatcher.
//!
//! Fans a domain event out to every active endpoint subscribed to its type.
//! Each endpoint gets its own spawned delivery task; outcomes are joined and
//! one endpoint's failure never affects another's delivery.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, error, warn};
use utoipa::ToSchema;

use ops_common::{OpsError, Result, WebhookEndpoint, WebhookEvent};

use crate::signature::sign_payload;
use crate::store::EndpointStore;

/// HTTP client configuration for deliveries
#[derive(Debug, Clone)]
pub struct WebhookDispatcherConfig {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for WebhookDispatcherConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Result of a dispatch: the event id and how many endpoints were attempted.
///
/// Per-endpoint success/failure is not aggregated here; it lands on each
/// endpoint's delivery metadata instead.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DispatchSummary {
    pub event_id: String,
    pub attempted: usize,
}

/// Outcome of a single endpoint delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The request completed with this HTTP status; 4xx/5xx is still a
    /// completed delivery attempt.
    Delivered(u16),
    /// Network-level failure before a response was received.
    Failed(String),
    /// No request was attempted (inactive endpoint or unusable signing key).
    Skipped,
}

impl DeliveryOutcome {
    /// Status string recorded on the endpoint, if a delivery was attempted.
    fn status_label(&self) -> Option<String> {
        match self {
            DeliveryOutcome::Delivered(status) => Some(status.to_string()),
            DeliveryOutcome::Failed(_) => Some("failed".to_string()),
            DeliveryOutcome::Skipped => None,
        }
    }
}

/// Signs and forwards domain events to externally registered HTTP endpoints.
#[derive(Clone)]
pub struct WebhookDispatcher {
    store: Arc<dyn EndpointStore>,
    client: reqwest::Client,
}

impl WebhookDispatcher {
    pub fn new(store: Arc<dyn EndpointStore>, config: WebhookDispatcherConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| OpsError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { store, client })
    }

    /// Builds the event envelope and delivers it to every active subscribed
    /// endpoint concurrently, joining all outcomes.
    pub async fn dispatch(
        &self,
        event_type: &str,
        data: serde_json::Value,
    ) -> Result<DispatchSummary> {
        let event = WebhookEvent::new(event_type, data);
        let endpoints = self.store.list_active_for_event(event_type).await?;
        let attempted = endpoints.len();

        debug!(
            event_id = %event.id,
            event_type = %event.event_type,
            endpoints = attempted,
            "Dispatching webhook event"
        );

        let mut tasks = Vec::with_capacity(endpoints.len());
        for endpoint in endpoints {
            let dispatcher = self.clone();
            let event = event.clone();
            tasks.push(tokio::spawn(async move {
                dispatcher.deliver(&endpoint, &event).await
            }));
        }

        for task in tasks {
            match task.await {
                Ok(DeliveryOutcome::Failed(reason)) => {
                    warn!(event_id = %event.id, reason = %reason, "Webhook delivery failed");
                }
                Ok(_) => {}
                Err(e) => {
                    error!(event_id = %event.id, error = %e, "Webhook delivery task panicked");
                }
            }
        }

        Ok(DispatchSummary {
            event_id: event.id,
            attempted,
        })
    }

    /// Delivers one event to one endpoint and records the outcome.
    ///
    /// The envelope is serialized once; the signature covers exactly the
    /// transmitted bytes. The delivery metadata is updated for any HTTP
    /// response and for network failures; inactive endpoints and signing
    /// errors short-circuit before a request is made.
    pub async fn deliver(&self, endpoint: &WebhookEndpoint, event: &WebhookEvent) -> DeliveryOutcome {
        if !endpoint.is_active {
            debug!(endpoint_id = %endpoint.id, "Endpoint inactive, skipping delivery");
            return DeliveryOutcome::Skipped;
        }

        let body = match serde_json::to_vec(event) {
            Ok(body) => body,
            Err(e) => {
                error!(event_id = %event.id, error = %e, "Failed to encode webhook envelope");
                return DeliveryOutcome::Skipped;
            }
        };

        let signature = match sign_payload(&endpoint.secret, &body) {
            Ok(signature) => signature,
            Err(e) => {
                error!(
                    endpoint_id = %endpoint.id,
                    error = %e,
                    "Cannot sign webhook payload, delivery aborted"
                );
                return DeliveryOutcome::Skipped;
            }
        };

        let mut request = self
            .client
            .post(&endpoint.url)
            .header("Content-Type", "application/json")
            .header("X-Webhook-Id", &event.id)
            .header("X-Webhook-Type", &event.event_type)
            .header("X-Webhook-Signature", signature)
            .body(body);

        if let Some(headers) = &endpoint.headers {
            for (name, value) in headers {
                request = request.header(name, value);
            }
        }

        let outcome = match request.send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                debug!(endpoint_id = %endpoint.id, status = status, "Webhook delivered");
                DeliveryOutcome::Delivered(status)
            }
            Err(e) => DeliveryOutcome::Failed(e.to_string()),
        };

        if let Some(status) = outcome.status_label() {
            if let Err(e) = self
                .store
                .record_delivery(&endpoint.id, Utc::now(), &status)
                .await
            {
                warn!(endpoint_id = %endpoint.id, error = %e, "Failed to record delivery status");
            }
        }

        outcome
    }
}
