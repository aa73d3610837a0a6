//! Interfaces the synchronization core consumes.
//!
//! Generating listener/route/cluster payloads, deciding which proxies a
//! configuration change affects and knowing which services exist all live
//! outside the core. Implementations must be thread-safe: they are called
//! concurrently from every connection task and from the push scheduler.

use std::collections::BTreeSet;

use crate::{AdsError, BoxResource, ConfigKey, ConnectionContext, ResourceKind};

/// Renders resources for one connection.
pub trait ResourceGenerator: Send + Sync + 'static {
    /// Generate resources of `kind` for the proxy described by `ctx`.
    ///
    /// An empty `names` set is a wildcard subscription. Requested names that
    /// do not exist are simply absent from the result.
    fn generate(
        &self,
        kind: ResourceKind,
        names: &BTreeSet<String>,
        ctx: &ConnectionContext,
    ) -> Result<Vec<BoxResource>, AdsError>;
}

/// Decides whether a configuration change is visible to a proxy.
pub trait ScopeResolver: Send + Sync + 'static {
    /// Whether `key` is within the configuration scope of `ctx`.
    fn in_scope(&self, ctx: &ConnectionContext, key: &ConfigKey) -> bool;
}

/// Current view of a service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSummary {
    /// Service hostname.
    pub hostname: String,
    /// Number of instances currently registered.
    pub instances: usize,
}

/// Read access to the service registry.
pub trait ServiceDirectory: Send + Sync + 'static {
    /// Look up a service by key. `None` if it does not exist (anymore).
    fn service(&self, key: &ConfigKey) -> Option<ServiceSummary>;

    /// Keys of every service that currently exists.
    fn services(&self) -> Vec<ConfigKey>;
}
