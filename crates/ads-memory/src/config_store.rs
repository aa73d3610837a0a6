//! Config store for routing and scoping objects.

use dashmap::DashMap;
use tracing::debug;

use ads_core::{ConfigKey, ConfigKind};

/// Content of a stored configuration object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSpec {
    /// Routing rules for a set of hosts.
    VirtualService {
        /// Hosts the rules apply to.
        hosts: Vec<String>,
    },
    /// Traffic policy for one host.
    DestinationRule {
        /// The host the policy applies to.
        host: String,
    },
    /// Egress scope of the proxies in a namespace.
    Sidecar {
        /// Egress hosts in `namespace/host` form.
        egress: Vec<String>,
    },
    /// Gateway servers.
    Gateway {
        /// Hosts exposed by the gateway.
        hosts: Vec<String>,
    },
}

impl ConfigSpec {
    /// The config kind this spec is stored under.
    pub fn kind(&self) -> ConfigKind {
        match self {
            Self::VirtualService { .. } => ConfigKind::VirtualService,
            Self::DestinationRule { .. } => ConfigKind::DestinationRule,
            Self::Sidecar { .. } => ConfigKind::Sidecar,
            Self::Gateway { .. } => ConfigKind::Gateway,
        }
    }

    /// Hosts this object talks about.
    pub fn hosts(&self) -> Vec<&str> {
        match self {
            Self::VirtualService { hosts } | Self::Gateway { hosts } => {
                hosts.iter().map(String::as_str).collect()
            }
            Self::DestinationRule { host } => vec![host.as_str()],
            Self::Sidecar { .. } => Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
struct StoredConfig {
    spec: ConfigSpec,
    deleted: bool,
}

/// Concurrent in-memory config store.
///
/// Deleting an object leaves a tombstone: [`get`](Self::get) no longer
/// returns it, but [`last_known`](Self::last_known) does, so a push for the
/// deletion can still be scoped to the proxies that saw the object.
#[derive(Debug, Default)]
pub struct MemConfigStore {
    entries: DashMap<ConfigKey, StoredConfig>,
}

impl MemConfigStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or replace an object. Returns its key.
    pub fn create(
        &self,
        name: impl Into<String>,
        namespace: impl Into<String>,
        spec: ConfigSpec,
    ) -> ConfigKey {
        let key = ConfigKey::new(spec.kind(), name, namespace);
        debug!(config = %key, "create config");
        self.entries.insert(
            key.clone(),
            StoredConfig {
                spec,
                deleted: false,
            },
        );
        key
    }

    /// Delete an object. Returns whether it was live.
    pub fn delete(&self, key: &ConfigKey) -> bool {
        match self.entries.get_mut(key) {
            Some(mut entry) if !entry.deleted => {
                entry.deleted = true;
                debug!(config = %key, "delete config");
                true
            }
            _ => false,
        }
    }

    /// A live object.
    pub fn get(&self, key: &ConfigKey) -> Option<ConfigSpec> {
        self.entries
            .get(key)
            .filter(|entry| !entry.deleted)
            .map(|entry| entry.spec.clone())
    }

    /// The object, or its last content if it was deleted.
    pub fn last_known(&self, key: &ConfigKey) -> Option<ConfigSpec> {
        self.entries.get(key).map(|entry| entry.spec.clone())
    }

    /// Live objects of one kind in one namespace.
    pub fn list(&self, kind: ConfigKind, namespace: &str) -> Vec<(ConfigKey, ConfigSpec)> {
        let mut found: Vec<_> = self
            .entries
            .iter()
            .filter(|entry| {
                !entry.deleted && entry.key().kind == kind && entry.key().namespace == namespace
            })
            .map(|entry| (entry.key().clone(), entry.spec.clone()))
            .collect();
        found.sort_by(|a, b| a.0.cmp(&b.0));
        found
    }

    /// Number of live objects.
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|entry| !entry.deleted).count()
    }

    /// Whether the store holds no live objects.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
