//! Sidecar egress scoping.
//!
//! Egress hosts use the `namespace/host` syntax: the namespace is `*` (any),
//! `.` (the proxy's own namespace), `~` (none) or an exact name; the host is
//! `*`, a `*.suffix` wildcard or an exact hostname.

use std::fmt;

/// Namespace part of an egress host.
#[derive(Debug, Clone, PartialEq, Eq)]
enum NamespaceSelector {
    Any,
    Local,
    None,
    Exact(String),
}

/// One parsed egress host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EgressHost {
    namespace: NamespaceSelector,
    host: String,
}

impl EgressHost {
    /// Parse `namespace/host`. A bare host means any namespace.
    pub fn parse(spec: &str) -> Self {
        let (namespace, host) = match spec.split_once('/') {
            Some((ns, host)) => {
                let ns = match ns {
                    "*" => NamespaceSelector::Any,
                    "." => NamespaceSelector::Local,
                    "~" => NamespaceSelector::None,
                    other => NamespaceSelector::Exact(other.to_string()),
                };
                (ns, host)
            }
            None => (NamespaceSelector::Any, spec),
        };
        Self {
            namespace,
            host: host.to_string(),
        }
    }

    /// Whether a host declared in `namespace` is selected for a proxy in
    /// `proxy_namespace`.
    pub fn matches(&self, proxy_namespace: Option<&str>, namespace: &str, hostname: &str) -> bool {
        let namespace_ok = match &self.namespace {
            NamespaceSelector::Any => true,
            NamespaceSelector::Local => proxy_namespace == Some(namespace),
            NamespaceSelector::None => false,
            NamespaceSelector::Exact(ns) => ns == namespace,
        };
        namespace_ok && host_matches(&self.host, hostname)
    }
}

impl fmt::Display for EgressHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ns = match &self.namespace {
            NamespaceSelector::Any => "*",
            NamespaceSelector::Local => ".",
            NamespaceSelector::None => "~",
            NamespaceSelector::Exact(ns) => ns.as_str(),
        };
        write!(f, "{ns}/{}", self.host)
    }
}

fn host_matches(pattern: &str, hostname: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    match pattern.strip_prefix("*.") {
        Some(suffix) => hostname
            .strip_suffix(suffix)
            .is_some_and(|head| head.ends_with('.') && head.len() > 1),
        None => pattern == hostname,
    }
}

/// The egress scope of one proxy.
///
/// A proxy without a Sidecar sees the whole mesh.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EgressScope {
    hosts: Option<Vec<EgressHost>>,
}

impl EgressScope {
    /// A scope that selects everything.
    pub fn unrestricted() -> Self {
        Self { hosts: None }
    }

    /// A scope restricted to the given egress hosts.
    pub fn from_egress<'a>(egress: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            hosts: Some(egress.into_iter().map(EgressHost::parse).collect()),
        }
    }

    /// Whether the scope selects everything.
    pub fn is_unrestricted(&self) -> bool {
        self.hosts.is_none()
    }

    /// Whether `hostname` in `namespace` is visible to a proxy in
    /// `proxy_namespace`.
    pub fn contains(&self, proxy_namespace: Option<&str>, namespace: &str, hostname: &str) -> bool {
        match &self.hosts {
            None => true,
            Some(hosts) => hosts
                .iter()
                .any(|h| h.matches(proxy_namespace, namespace, hostname)),
        }
    }
}
