//! In-memory environment implementing the ADS collaborators.

use std::collections::BTreeSet;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, trace};

use ads_core::{
    AdsError, BoxResource, ConfigKey, ConfigKind, ConnectionContext, ResourceGenerator,
    ResourceKind, ScopeResolver, ServiceDirectory, ServiceSummary,
};

use crate::config_store::{ConfigSpec, MemConfigStore};
use crate::registry::{MemServiceRegistry, Service};
use crate::resource::MemResource;
use crate::scope::EgressScope;
use crate::stats::GenerationStats;

/// Default namespace whose Sidecar applies to proxies without their own.
pub const DEFAULT_ROOT_NAMESPACE: &str = "istio-system";

/// Service registry plus config store, exposed through the collaborator
/// traits of the ADS core.
///
/// Generated resource names follow the sidecar conventions:
///
/// | Kind | Name |
/// |------|------|
/// | Cluster, Endpoint | `outbound\|<port>\|\|<hostname>` |
/// | Listener | `0.0.0.0_<port>` |
/// | Route | `<port>` |
///
/// Only services inside the proxy's egress scope are rendered.
#[derive(Debug)]
pub struct MemEnvironment {
    registry: MemServiceRegistry,
    configs: MemConfigStore,
    root_namespace: String,
    stats: GenerationStats,
    injected_failures: DashMap<ResourceKind, usize>,
}

impl Default for MemEnvironment {
    fn default() -> Self {
        Self::new()
    }
}

impl MemEnvironment {
    /// Create an empty environment.
    pub fn new() -> Self {
        Self::with_root_namespace(DEFAULT_ROOT_NAMESPACE)
    }

    /// Create an empty environment with a custom root namespace.
    pub fn with_root_namespace(root_namespace: impl Into<String>) -> Self {
        Self {
            registry: MemServiceRegistry::new(),
            configs: MemConfigStore::new(),
            root_namespace: root_namespace.into(),
            stats: GenerationStats::new(),
            injected_failures: DashMap::new(),
        }
    }

    /// Wrap in an `Arc` for sharing with a server.
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// The service registry.
    #[inline]
    pub fn registry(&self) -> &MemServiceRegistry {
        &self.registry
    }

    /// The config store.
    #[inline]
    pub fn configs(&self) -> &MemConfigStore {
        &self.configs
    }

    /// Generation statistics.
    #[inline]
    pub fn stats(&self) -> &GenerationStats {
        &self.stats
    }

    /// Make the next `count` generate calls for `kind` fail.
    pub fn fail_next(&self, kind: ResourceKind, count: usize) {
        *self.injected_failures.entry(kind).or_default() += count;
    }

    /// The egress scope that applies to a proxy.
    pub fn scope_for(&self, ctx: &ConnectionContext) -> EgressScope {
        let own = ctx
            .namespace()
            .map(|ns| self.configs.list(ConfigKind::Sidecar, ns))
            .unwrap_or_default();
        let sidecars = if own.is_empty() {
            self.configs.list(ConfigKind::Sidecar, &self.root_namespace)
        } else {
            own
        };

        let Some((key, spec)) = sidecars.into_iter().next() else {
            return EgressScope::unrestricted();
        };
        match spec {
            ConfigSpec::Sidecar { egress } => {
                trace!(node = ctx.node_id(), sidecar = %key, "applying sidecar scope");
                EgressScope::from_egress(egress.iter().map(String::as_str))
            }
            _ => EgressScope::unrestricted(),
        }
    }

    fn visible_services(&self, ctx: &ConnectionContext) -> Vec<Service> {
        let scope = self.scope_for(ctx);
        let proxy_namespace = ctx.namespace();
        let mut services: Vec<Service> = self
            .registry
            .services()
            .into_iter()
            .filter(|s| scope.contains(proxy_namespace, &s.namespace, &s.hostname))
            .collect();
        services.sort_by(|a, b| a.hostname.cmp(&b.hostname));
        services
    }

    fn take_injected_failure(&self, kind: ResourceKind) -> bool {
        match self.injected_failures.get_mut(&kind) {
            Some(mut remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }

    fn render(kind: ResourceKind, services: &[Service]) -> Vec<String> {
        let mut names = BTreeSet::new();
        for service in services {
            for port in &service.ports {
                let name = match kind {
                    ResourceKind::Cluster | ResourceKind::Endpoint => {
                        format!("outbound|{port}||{}", service.hostname)
                    }
                    ResourceKind::Listener => format!("0.0.0.0_{port}"),
                    ResourceKind::Route => port.to_string(),
                };
                names.insert(name);
            }
        }
        names.into_iter().collect()
    }
}

impl ResourceGenerator for MemEnvironment {
    fn generate(
        &self,
        kind: ResourceKind,
        names: &BTreeSet<String>,
        ctx: &ConnectionContext,
    ) -> Result<Vec<BoxResource>, AdsError> {
        if self.take_injected_failure(kind) {
            self.stats.record_failure();
            return Err(AdsError::generation(kind, "injected failure"));
        }

        let services = self.visible_services(ctx);
        let resources: Vec<BoxResource> = Self::render(kind, &services)
            .into_iter()
            .filter(|name| names.is_empty() || names.contains(name))
            .map(|name| Arc::new(MemResource::new(kind, name)) as BoxResource)
            .collect();

        debug!(
            node = ctx.node_id(),
            kind = %kind,
            requested = names.len(),
            generated = resources.len(),
            "generated resources"
        );
        self.stats.record_generation(resources.len());
        Ok(resources)
    }
}

impl ScopeResolver for MemEnvironment {
    fn in_scope(&self, ctx: &ConnectionContext, key: &ConfigKey) -> bool {
        let proxy_namespace = ctx.namespace();
        match key.kind {
            ConfigKind::ServiceEntry => {
                self.scope_for(ctx)
                    .contains(proxy_namespace, &key.namespace, &key.name)
            }
            ConfigKind::VirtualService | ConfigKind::DestinationRule => {
                let scope = self.scope_for(ctx);
                if scope.is_unrestricted() {
                    return true;
                }
                match self.configs.last_known(key) {
                    Some(spec) => spec
                        .hosts()
                        .iter()
                        .any(|host| scope.contains(proxy_namespace, &key.namespace, host)),
                    None => true,
                }
            }
            ConfigKind::Sidecar => {
                proxy_namespace == Some(key.namespace.as_str())
                    || key.namespace == self.root_namespace
            }
            ConfigKind::Gateway => true,
        }
    }
}

impl ServiceDirectory for MemEnvironment {
    fn service(&self, key: &ConfigKey) -> Option<ServiceSummary> {
        self.registry.get(key).map(|service| ServiceSummary {
            instances: self.registry.instances(&service.hostname).len(),
            hostname: service.hostname,
        })
    }

    fn services(&self) -> Vec<ConfigKey> {
        self.registry.services().iter().map(Service::key).collect()
    }
}
