//! In-process discovery registry.
//!
//! Publishing and browsing happen against shared memory instead of the
//! network, which is enough for peers living in one process and for tests.
//! Browsers see every matching service already published when they start,
//! then live publications and withdrawals.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;

use crate::discovery::service::{DiscoveryEvent, ServiceBrowser, ServiceDescriptor, ServicePublisher};
use crate::error::DiscoveryError;

struct Published {
    service: ServiceDescriptor,
    owner: mpsc::UnboundedSender<DiscoveryEvent>,
}

struct Browser {
    service_type: String,
    domain: String,
    tx: mpsc::UnboundedSender<DiscoveryEvent>,
}

#[derive(Default)]
struct RegistryState {
    services: Vec<Published>,
    browsers: Vec<Browser>,
}

impl RegistryState {
    /// Deliver to every live browser interested in `service`.
    fn broadcast(&mut self, service: &ServiceDescriptor, event: impl Fn(ServiceDescriptor) -> DiscoveryEvent) {
        self.browsers.retain(|browser| !browser.tx.is_closed());
        for browser in &self.browsers {
            if service.matches(&browser.service_type, &browser.domain) {
                let _ = browser.tx.send(event(service.clone()));
            }
        }
    }
}

/// Shared in-memory publisher and browser. Clones share state.
#[derive(Clone, Default)]
pub struct LocalRegistry {
    state: Arc<Mutex<RegistryState>>,
}

impl LocalRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        // Registry state stays consistent between statements, so a poisoned
        // lock is still usable.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of services currently advertised.
    pub fn published_count(&self) -> usize {
        self.lock().services.len()
    }
}

impl ServicePublisher for LocalRegistry {
    fn publish(
        &self,
        service: ServiceDescriptor,
    ) -> Result<mpsc::UnboundedReceiver<DiscoveryEvent>, DiscoveryError> {
        if service.endpoint.is_none() {
            return Err(DiscoveryError::MissingEndpoint(service.name));
        }

        let mut state = self.lock();
        if state
            .services
            .iter()
            .any(|published| published.service.same_instance(&service))
        {
            return Err(DiscoveryError::NameConflict(service.name));
        }

        let (owner, events) = mpsc::unbounded_channel();
        let _ = owner.send(DiscoveryEvent::Published(service.clone()));
        state.broadcast(&service, DiscoveryEvent::Resolved);
        tracing::info!(
            name = %service.name,
            service_type = %service.service_type,
            domain = %service.domain,
            "Service published"
        );
        state.services.push(Published { service, owner });

        Ok(events)
    }

    fn unpublish(&self, service: &ServiceDescriptor) -> Result<(), DiscoveryError> {
        let mut state = self.lock();
        let index = state
            .services
            .iter()
            .position(|published| published.service.same_instance(service))
            .ok_or_else(|| DiscoveryError::NotPublished(service.name.clone()))?;

        let published = state.services.remove(index);
        let _ = published
            .owner
            .send(DiscoveryEvent::Unpublished(published.service.clone()));
        state.broadcast(&published.service, DiscoveryEvent::Removed);
        tracing::info!(name = %published.service.name, "Service unpublished");
        Ok(())
    }
}

impl ServiceBrowser for LocalRegistry {
    fn browse(&self, service_type: &str, domain: &str) -> mpsc::UnboundedReceiver<DiscoveryEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.lock();

        for published in &state.services {
            if published.service.matches(service_type, domain) {
                let _ = tx.send(DiscoveryEvent::Resolved(published.service.clone()));
            }
        }
        state.browsers.push(Browser {
            service_type: service_type.to_string(),
            domain: domain.to_string(),
            tx,
        });

        tracing::debug!(service_type, domain, "Browsing started");
        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::{DEFAULT_DOMAIN, DEFAULT_SERVICE_TYPE};
    use crate::net::Endpoint;

    fn chat_service(name: &str, port: u16) -> ServiceDescriptor {
        ServiceDescriptor::new(name).with_endpoint(Endpoint::new("127.0.0.1", port))
    }

    #[test]
    fn browser_sees_existing_and_new_services() {
        let registry = LocalRegistry::new();
        let _alice = registry.publish(chat_service("alice", 5001)).unwrap();

        let mut browser = registry.browse(DEFAULT_SERVICE_TYPE, DEFAULT_DOMAIN);
        let _bob = registry.publish(chat_service("bob", 5002)).unwrap();

        assert_eq!(
            browser.try_recv().unwrap(),
            DiscoveryEvent::Resolved(chat_service("alice", 5001))
        );
        assert_eq!(
            browser.try_recv().unwrap(),
            DiscoveryEvent::Resolved(chat_service("bob", 5002))
        );
        assert!(browser.try_recv().is_err());
    }

    #[test]
    fn other_types_are_not_delivered() {
        let registry = LocalRegistry::new();
        let mut browser = registry.browse("_http._tcp.", DEFAULT_DOMAIN);
        let _alice = registry.publish(chat_service("alice", 5001)).unwrap();
        assert!(browser.try_recv().is_err());
    }

    #[test]
    fn duplicate_names_conflict() {
        let registry = LocalRegistry::new();
        let _first = registry.publish(chat_service("alice", 5001)).unwrap();
        let err = registry.publish(chat_service("alice", 6001)).unwrap_err();
        assert_eq!(err, DiscoveryError::NameConflict("alice".into()));

        let other_domain = chat_service("alice", 6001).with_type(DEFAULT_SERVICE_TYPE, "example.org.");
        assert!(registry.publish(other_domain).is_ok());
    }

    #[test]
    fn unpublish_notifies_owner_and_browsers() {
        let registry = LocalRegistry::new();
        let service = chat_service("alice", 5001);
        let mut owner = registry.publish(service.clone()).unwrap();
        let mut browser = registry.browse(DEFAULT_SERVICE_TYPE, DEFAULT_DOMAIN);
        let _ = browser.try_recv();

        registry.unpublish(&service).unwrap();

        assert_eq!(owner.try_recv().unwrap(), DiscoveryEvent::Published(service.clone()));
        assert_eq!(owner.try_recv().unwrap(), DiscoveryEvent::Unpublished(service.clone()));
        assert_eq!(browser.try_recv().unwrap(), DiscoveryEvent::Removed(service.clone()));
        assert_eq!(registry.published_count(), 0);
        assert_eq!(
            registry.unpublish(&service),
            Err(DiscoveryError::NotPublished("alice".into()))
        );
    }

    #[test]
    fn unresolved_services_cannot_be_published() {
        let registry = LocalRegistry::new();
        let err = registry.publish(ServiceDescriptor::new("ghost")).unwrap_err();
        assert_eq!(err, DiscoveryError::MissingEndpoint("ghost".into()));
    }
}
