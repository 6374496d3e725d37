//! Webhook dispatch for the admin backbone.
//!
//! Forwards domain events to externally registered HTTP endpoints:
//! - HMAC-SHA256 payload signing over the exact transmitted bytes
//! - Concurrent per-endpoint fan-out that never short-circuits
//! - Per-endpoint delivery bookkeeping (last delivery time + status)
//!
//! There is no retry, backoff, or dead-letter: a failed delivery is recorded
//! on the endpoint and nothing more. This is a documented limitation of the
//! dispatcher, not an omission.

pub mod dispatcher;
pub mod signature;
pub mod store;

pub use dispatcher::{DeliveryOutcome, DispatchSummary, WebhookDispatcher, WebhookDispatcherConfig};
pub use signature::{sign_payload, verify_signature};
pub use store::{EndpointStore, InMemoryEndpointStore};
