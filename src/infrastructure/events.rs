//! Publishes domain events to NATS after the write that produced them has committed.

use tracing::{debug, warn};
use crate::domain::events::DomainEvent;

#[derive(Clone, Default)]
pub struct EventBus {
    nats: Option<async_nats::Client>,
}

impl EventBus {
    /// Bus that only traces events.
    pub fn disabled() -> Self { Self { nats: None } }

    pub fn with_client(client: async_nats::Client) -> Self { Self { nats: Some(client) } }

    /// Connects when a URL is given; a failed connection degrades to a tracing-only bus.
    pub async fn connect(url: Option<&str>) -> Self {
        let Some(url) = url else { return Self::disabled() };
        match async_nats::connect(url).await {
            Ok(client) => Self::with_client(client),
            Err(e) => {
                warn!(error = %e, url, "NATS unavailable, domain events will only be logged");
                Self::disabled()
            }
        }
    }

    pub fn is_connected(&self) -> bool { self.nats.is_some() }

    /// Never fails the caller; delivery problems are logged.
    pub async fn publish_all(&self, events: Vec<DomainEvent>) {
        for event in events {
            let subject = event.subject();
            debug!(%subject, ?event, "domain event");
            let Some(client) = &self.nats else { continue };
            let payload = match serde_json::to_vec(&event) {
                Ok(p) => p,
                Err(e) => { warn!(error = %e, %subject, "could not encode domain event"); continue; }
            };
            if let Err(e) = client.publish(subject.clone(), payload.into()).await {
                warn!(error = %e, %subject, "failed to publish domain event");
            }
        }
    }
}
