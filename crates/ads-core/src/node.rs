//! Node and connection identification.
//!
//! [`NodeHash`] is a compact FNV-1a hash of a proxy's node id, used to index
//! connections by node. [`ConnectionId`] identifies one stream, and
//! [`ConnectionContext`] carries everything the collaborators need to know
//! about the proxy on the other end.

use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};

use fnv::FnvHasher;

/// Hash-based node identifier for efficient lookup.
///
/// Several connections may share a `NodeHash` while a proxy reconnects.
///
/// # Example
///
/// ```rust
/// use ads_core::NodeHash;
///
/// let a = NodeHash::from_id("sidecar~10.0.0.1~app.default~default.svc.cluster.local");
/// let b = NodeHash::from_id("sidecar~10.0.0.2~app.default~default.svc.cluster.local");
/// assert_ne!(a, b);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeHash(u64);

impl NodeHash {
    /// Create a node hash from a node ID string.
    #[must_use]
    pub fn from_id(node_id: &str) -> Self {
        let mut hasher = FnvHasher::default();
        node_id.hash(&mut hasher);
        Self(hasher.finish())
    }

    /// Get the raw hash value.
    #[must_use]
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Unique identifier for a connection (one ADS stream).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the numeric value.
    #[inline]
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Identity of the proxy behind a connection.
///
/// Built from the `node` of the first discovery request on a stream and
/// immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionContext {
    connection_id: ConnectionId,
    node_id: String,
    node_hash: NodeHash,
    cluster: String,
    metadata: BTreeMap<String, String>,
}

impl ConnectionContext {
    /// Metadata key carrying the proxy's config namespace.
    pub const NAMESPACE_KEY: &'static str = "NAMESPACE";
    /// Legacy metadata key for the config namespace.
    pub const CONFIG_NAMESPACE_KEY: &'static str = "CONFIG_NAMESPACE";

    /// Create a context for a newly identified node.
    #[must_use]
    pub fn new(connection_id: ConnectionId, node_id: impl Into<String>) -> Self {
        let node_id = node_id.into();
        Self {
            connection_id,
            node_hash: NodeHash::from_id(&node_id),
            node_id,
            cluster: String::new(),
            metadata: BTreeMap::new(),
        }
    }

    /// Set the node cluster.
    #[must_use]
    pub fn with_cluster(mut self, cluster: impl Into<String>) -> Self {
        self.cluster = cluster.into();
        self
    }

    /// Set the flattened node metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: BTreeMap<String, String>) -> Self {
        self.metadata = metadata;
        self
    }

    /// The connection this context belongs to.
    #[inline]
    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    /// The proxy's node id.
    #[inline]
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Hash of the node id.
    #[inline]
    pub fn node_hash(&self) -> NodeHash {
        self.node_hash
    }

    /// The proxy's service cluster.
    #[inline]
    pub fn cluster(&self) -> &str {
        &self.cluster
    }

    /// String-valued node metadata.
    #[inline]
    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    /// The namespace the proxy runs in.
    ///
    /// Taken from metadata when present, otherwise parsed from an Istio node
    /// id of the form `type~ip~pod.namespace~namespace.svc.cluster.local`.
    #[must_use]
    pub fn namespace(&self) -> Option<&str> {
        if let Some(ns) = self
            .metadata
            .get(Self::NAMESPACE_KEY)
            .or_else(|| self.metadata.get(Self::CONFIG_NAMESPACE_KEY))
            .filter(|ns| !ns.is_empty())
        {
            return Some(ns.as_str());
        }

        let mut parts = self.node_id.split('~');
        let (_, _, id, domain) = (parts.next()?, parts.next()?, parts.next()?, parts.next());
        id.split_once('.')
            .map(|(_, ns)| ns)
            .or_else(|| domain.and_then(|d| d.split('.').next()))
            .filter(|ns| !ns.is_empty())
    }

    /// The proxy IP, parsed from an Istio node id.
    #[must_use]
    pub fn ip(&self) -> Option<&str> {
        let mut parts = self.node_id.split('~');
        parts.next()?;
        parts.next().filter(|ip| !ip.is_empty())
    }
}
