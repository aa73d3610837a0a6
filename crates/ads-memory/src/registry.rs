//! Service registry backed by `DashMap`.

use dashmap::DashMap;
use tracing::debug;

use ads_core::ConfigKey;

/// A service known to the mesh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Service {
    /// Fully qualified hostname.
    pub hostname: String,
    /// Namespace the service is declared in.
    pub namespace: String,
    /// Service ports.
    pub ports: Vec<u16>,
}

impl Service {
    /// Create a service.
    pub fn new(
        hostname: impl Into<String>,
        namespace: impl Into<String>,
        ports: impl IntoIterator<Item = u16>,
    ) -> Self {
        Self {
            hostname: hostname.into(),
            namespace: namespace.into(),
            ports: ports.into_iter().collect(),
        }
    }

    /// The config key identifying this service.
    pub fn key(&self) -> ConfigKey {
        ConfigKey::service(self.hostname.clone(), self.namespace.clone())
    }
}

/// One endpoint of a service.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceInstance {
    /// Endpoint address.
    pub address: String,
    /// Endpoint port.
    pub port: u16,
}

impl ServiceInstance {
    /// Create an instance.
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
        }
    }
}

/// Concurrent in-memory service registry.
///
/// Services are keyed by their [`ConfigKey`]; instances by hostname, so
/// instances may be registered before or after their service.
#[derive(Debug, Default)]
pub struct MemServiceRegistry {
    services: DashMap<ConfigKey, Service>,
    instances: DashMap<String, Vec<ServiceInstance>>,
}

impl MemServiceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a service. Returns its key.
    pub fn add_service(&self, service: Service) -> ConfigKey {
        let key = service.key();
        debug!(service = %key, ports = ?service.ports, "add service");
        self.services.insert(key.clone(), service);
        key
    }

    /// Remove a service and its instances.
    pub fn remove_service(&self, key: &ConfigKey) -> Option<Service> {
        let removed = self.services.remove(key).map(|(_, service)| service);
        if removed.is_some() {
            self.instances.remove(&key.name);
            debug!(service = %key, "removed service");
        }
        removed
    }

    /// Look up a service.
    pub fn get(&self, key: &ConfigKey) -> Option<Service> {
        self.services.get(key).map(|r| r.value().clone())
    }

    /// Snapshot of every service.
    pub fn services(&self) -> Vec<Service> {
        self.services.iter().map(|r| r.value().clone()).collect()
    }

    /// Register one more instance for a hostname.
    pub fn add_instance(&self, hostname: &str, instance: ServiceInstance) {
        debug!(hostname, address = %instance.address, port = instance.port, "add instance");
        self.instances
            .entry(hostname.to_string())
            .or_default()
            .push(instance);
    }

    /// Replace every instance of a hostname.
    pub fn set_instances(&self, hostname: &str, instances: Vec<ServiceInstance>) {
        if instances.is_empty() {
            self.instances.remove(hostname);
        } else {
            self.instances.insert(hostname.to_string(), instances);
        }
    }

    /// Instances of a hostname.
    pub fn instances(&self, hostname: &str) -> Vec<ServiceInstance> {
        self.instances
            .get(hostname)
            .map(|r| r.value().clone())
            .unwrap_or_default()
    }

    /// Number of services.
    pub fn len(&self) -> usize {
        self.services.len()
    }

    /// Whether no services are registered.
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}
