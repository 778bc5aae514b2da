//! Discovery data types and collaborator traits.

use tokio::sync::mpsc;

use crate::config::DiscoveryConfig;
use crate::discovery::{DEFAULT_DOMAIN, DEFAULT_SERVICE_TYPE};
use crate::error::DiscoveryError;
use crate::net::endpoint::Endpoint;

/// A named service instance. Never mutated by the connection core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDescriptor {
    /// Instance name, unique per type and domain.
    pub name: String,
    pub service_type: String,
    pub domain: String,
    /// Set once the service has been resolved to a host and port.
    pub endpoint: Option<Endpoint>,
}

impl ServiceDescriptor {
    /// A chat service in the default type and domain, not yet resolved.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            service_type: DEFAULT_SERVICE_TYPE.to_string(),
            domain: DEFAULT_DOMAIN.to_string(),
            endpoint: None,
        }
    }

    /// Descriptor for this peer as configured, advertised on `port`.
    pub fn from_config(config: &DiscoveryConfig, host: impl Into<String>, port: u16) -> Self {
        Self {
            name: config.service_name.clone(),
            service_type: config.service_type.clone(),
            domain: config.domain.clone(),
            endpoint: Some(Endpoint::new(host, port)),
        }
    }

    /// Move the service to another type and domain.
    pub fn with_type(mut self, service_type: impl Into<String>, domain: impl Into<String>) -> Self {
        self.service_type = service_type.into();
        self.domain = domain.into();
        self
    }

    /// Attach the resolved endpoint.
    pub fn with_endpoint(mut self, endpoint: Endpoint) -> Self {
        self.endpoint = Some(endpoint);
        self
    }

    /// Whether this service belongs to the given type and domain. Comparison
    /// ignores ASCII case and a trailing dot.
    pub fn matches(&self, service_type: &str, domain: &str) -> bool {
        same_label(&self.service_type, service_type) && same_label(&self.domain, domain)
    }

    pub(crate) fn same_instance(&self, other: &ServiceDescriptor) -> bool {
        self.name == other.name && self.matches(&other.service_type, &other.domain)
    }
}

fn same_label(a: &str, b: &str) -> bool {
    let trim = |s: &str| s.strip_suffix('.').unwrap_or(s).to_string();
    trim(a).eq_ignore_ascii_case(&trim(b))
}

/// Notification from a discovery collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryEvent {
    /// Our own service is now advertised.
    Published(ServiceDescriptor),
    /// Our own service is no longer advertised.
    Unpublished(ServiceDescriptor),
    /// A browsed service resolved to an endpoint.
    Resolved(ServiceDescriptor),
    /// A browsed service went away.
    Removed(ServiceDescriptor),
}

impl DiscoveryEvent {
    /// The descriptor, if this event yields a connectable endpoint.
    pub fn into_resolved(self) -> Option<ServiceDescriptor> {
        match self {
            DiscoveryEvent::Resolved(service) if service.endpoint.is_some() => Some(service),
            _ => None,
        }
    }
}

/// Advertises services on the network.
pub trait ServicePublisher {
    /// Advertise `service`. The receiver reports publication state changes.
    fn publish(
        &self,
        service: ServiceDescriptor,
    ) -> Result<mpsc::UnboundedReceiver<DiscoveryEvent>, DiscoveryError>;

    /// Withdraw a previously published service.
    fn unpublish(&self, service: &ServiceDescriptor) -> Result<(), DiscoveryError>;
}

/// Finds services of a given type and domain.
pub trait ServiceBrowser {
    /// Start browsing. Dropping the receiver stops it.
    fn browse(&self, service_type: &str, domain: &str) -> mpsc::UnboundedReceiver<DiscoveryEvent>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_ignores_case_and_trailing_dot() {
        let service = ServiceDescriptor::new("alice");
        assert!(service.matches("_chat._tcp", "LOCAL."));
        assert!(!service.matches("_http._tcp.", "local."));
    }

    #[test]
    fn only_resolved_services_are_connectable() {
        let unresolved = ServiceDescriptor::new("alice");
        assert_eq!(DiscoveryEvent::Resolved(unresolved.clone()).into_resolved(), None);

        let resolved = unresolved.with_endpoint(Endpoint::new("127.0.0.1", 5000));
        assert_eq!(
            DiscoveryEvent::Resolved(resolved.clone()).into_resolved(),
            Some(resolved.clone())
        );
        assert_eq!(DiscoveryEvent::Removed(resolved).into_resolved(), None);
    }
}
