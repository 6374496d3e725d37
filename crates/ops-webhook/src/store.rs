//! Endpoint registry interface.
//!
//! Persistence of webhook endpoint rows belongs to an external collaborator;
//! the dispatcher and the admin API only see this trait. The in-memory
//! implementation backs the dev server and tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rand::RngCore;
use tracing::debug;
use uuid::Uuid;

use ops_common::{EndpointRegistration, Result, WebhookEndpoint};

/// Registry of externally registered webhook endpoints.
#[async_trait]
pub trait EndpointStore: Send + Sync {
    /// All endpoints, newest first.
    async fn list(&self) -> Result<Vec<WebhookEndpoint>>;

    async fn get(&self, id: &str) -> Result<Option<WebhookEndpoint>>;

    /// Active endpoints whose subscription set contains `event_type`.
    async fn list_active_for_event(&self, event_type: &str) -> Result<Vec<WebhookEndpoint>>;

    /// Registers an endpoint, generating its id and signing secret.
    /// The secret is generated exactly once and never reissued.
    async fn create(&self, registration: EndpointRegistration) -> Result<WebhookEndpoint>;

    /// Removes an endpoint; `false` if the id was unknown.
    async fn delete(&self, id: &str) -> Result<bool>;

    async fn set_active(&self, id: &str, active: bool) -> Result<bool>;

    /// Records the outcome of a delivery attempt (last-writer-wins).
    /// Unknown ids are a benign no-op.
    async fn record_delivery(&self, id: &str, at: DateTime<Utc>, status: &str) -> Result<()>;
}

/// 32 random bytes, hex encoded.
fn generate_secret() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// In-memory endpoint registry for the dev server and tests.
#[derive(Default)]
pub struct InMemoryEndpointStore {
    endpoints: RwLock<Vec<WebhookEndpoint>>,
}

impl InMemoryEndpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a fully formed endpoint, bypassing secret generation.
    /// Test-oriented; `create` is the registration path.
    pub fn insert(&self, endpoint: WebhookEndpoint) {
        self.endpoints.write().push(endpoint);
    }
}

#[async_trait]
impl EndpointStore for InMemoryEndpointStore {
    async fn list(&self) -> Result<Vec<WebhookEndpoint>> {
        let mut endpoints = self.endpoints.read().clone();
        endpoints.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(endpoints)
    }

    async fn get(&self, id: &str) -> Result<Option<WebhookEndpoint>> {
        Ok(self.endpoints.read().iter().find(|e| e.id == id).cloned())
    }

    async fn list_active_for_event(&self, event_type: &str) -> Result<Vec<WebhookEndpoint>> {
        Ok(self
            .endpoints
            .read()
            .iter()
            .filter(|e| e.is_active && e.subscribes_to(event_type))
            .cloned()
            .collect())
    }

    async fn create(&self, registration: EndpointRegistration) -> Result<WebhookEndpoint> {
        let endpoint = WebhookEndpoint {
            id: Uuid::new_v4().to_string(),
            url: registration.url,
            description: registration.description,
            events: registration.events,
            headers: registration.headers,
            secret: generate_secret(),
            is_active: true,
            created_at: Utc::now(),
            last_delivery_at: None,
            last_status: None,
        };
        debug!(endpoint_id = %endpoint.id, url = %endpoint.url, "Registered webhook endpoint");
        self.endpoints.write().push(endpoint.clone());
        Ok(endpoint)
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let mut endpoints = self.endpoints.write();
        let before = endpoints.len();
        endpoints.retain(|e| e.id != id);
        Ok(endpoints.len() < before)
    }

    async fn set_active(&self, id: &str, active: bool) -> Result<bool> {
        let mut endpoints = self.endpoints.write();
        match endpoints.iter_mut().find(|e| e.id == id) {
            Some(endpoint) => {
                endpoint.is_active = active;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn record_delivery(&self, id: &str, at: DateTime<Utc>, status: &str) -> Result<()> {
        let mut endpoints = self.endpoints.write();
        if let Some(endpoint) = endpoints.iter_mut().find(|e| e.id == id) {
            endpoint.last_delivery_at = Some(at);
            endpoint.last_status = Some(status.to_string());
        }
        Ok(())
    }
}
