//! Change notifications from the configuration layer.

use std::collections::HashSet;
use std::fmt;

/// Kind of a configuration object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ConfigKind {
    /// A service (hostname plus instances).
    ServiceEntry,
    /// Routing rules for a set of hosts.
    VirtualService,
    /// Traffic policy for a host.
    DestinationRule,
    /// Proxy egress scope for a namespace.
    Sidecar,
    /// Ingress/egress gateway configuration.
    Gateway,
}

impl fmt::Display for ConfigKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ServiceEntry => "ServiceEntry",
            Self::VirtualService => "VirtualService",
            Self::DestinationRule => "DestinationRule",
            Self::Sidecar => "Sidecar",
            Self::Gateway => "Gateway",
        };
        f.write_str(name)
    }
}

/// Identifies one unit of configuration that changed.
///
/// For services the name is the service hostname.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConfigKey {
    /// Kind of configuration.
    pub kind: ConfigKind,
    /// Object name.
    pub name: String,
    /// Object namespace.
    pub namespace: String,
}

impl ConfigKey {
    /// Create a key.
    #[must_use]
    pub fn new(kind: ConfigKind, name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            namespace: namespace.into(),
        }
    }

    /// Key of a service identified by hostname.
    #[must_use]
    pub fn service(hostname: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self::new(ConfigKind::ServiceEntry, hostname, namespace)
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.kind, self.namespace, self.name)
    }
}

/// A request to push configuration to connected proxies.
///
/// `full` resends every subscribed kind to every connection. Otherwise
/// `configs_updated` drives a push scoped to the affected connections and
/// kinds.
///
/// # Example
///
/// ```rust
/// use ads_core::{ConfigKey, PushRequest};
///
/// let push = PushRequest::incremental([ConfigKey::service("a.example.com", "default")]);
/// assert!(!push.full);
/// assert_eq!(push.configs_updated.len(), 1);
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PushRequest {
    /// Resend everything to everyone.
    pub full: bool,
    /// Configuration that changed.
    pub configs_updated: HashSet<ConfigKey>,
}

impl PushRequest {
    /// A full push.
    #[must_use]
    pub fn full() -> Self {
        Self {
            full: true,
            configs_updated: HashSet::new(),
        }
    }

    /// A full push that also records which configuration changed.
    #[must_use]
    pub fn full_with(keys: impl IntoIterator<Item = ConfigKey>) -> Self {
        Self {
            full: true,
            configs_updated: keys.into_iter().collect(),
        }
    }

    /// A push scoped to the given changes.
    #[must_use]
    pub fn incremental(keys: impl IntoIterator<Item = ConfigKey>) -> Self {
        Self {
            full: false,
            configs_updated: keys.into_iter().collect(),
        }
    }

    /// Whether the request asks for nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.full && self.configs_updated.is_empty()
    }
}
