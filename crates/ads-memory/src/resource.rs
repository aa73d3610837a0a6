//! Skeletal resources produced by the in-memory environment.

use ads_core::{Resource, ResourceKind};
use prost::Message;

/// Minimal protobuf message holding only a resource name.
///
/// `name` is field 1 of Envoy's Cluster, ClusterLoadAssignment (as
/// `cluster_name`), Listener and RouteConfiguration in both schemas, so the
/// encoding decodes as a valid, empty resource of any of the four kinds.
#[derive(Clone, PartialEq, Message)]
pub struct NamedResource {
    /// Resource name.
    #[prost(string, tag = "1")]
    pub name: String,
}

/// A named resource of one kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemResource {
    kind: ResourceKind,
    name: String,
}

impl MemResource {
    /// Create a resource.
    pub fn new(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }
}

impl Resource for MemResource {
    fn kind(&self) -> ResourceKind {
        self.kind
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn encode(&self) -> Result<Vec<u8>, Box<dyn std::error::Error + Send + Sync>> {
        Ok(NamedResource {
            name: self.name.clone(),
        }
        .encode_to_vec())
    }
}
