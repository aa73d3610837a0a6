//! Discovery wire messages.
//!
//! Field numbers match `envoy.service.discovery.{v2,v3}.DiscoveryRequest`
//! and `DiscoveryResponse`; the two schema generations share a layout for
//! every field used here, so one set of messages serves both transports.

use std::collections::BTreeMap;

use prost::Message;
use prost_types::value::Kind;

use ads_core::{ConnectionContext, ConnectionId};

/// Identity of the proxy sending a request (`envoy.config.core.v3.Node`).
#[derive(Clone, PartialEq, Message)]
pub struct Node {
    /// Node identifier.
    #[prost(string, tag = "1")]
    pub id: String,
    /// Service cluster of the node.
    #[prost(string, tag = "2")]
    pub cluster: String,
    /// Opaque node metadata.
    #[prost(message, optional, tag = "3")]
    pub metadata: Option<prost_types::Struct>,
}

impl Node {
    /// Create a node with an id.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// Add a string metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.get_or_insert_with(Default::default).fields.insert(
            key.into(),
            prost_types::Value {
                kind: Some(Kind::StringValue(value.into())),
            },
        );
        self
    }

    /// String-valued metadata entries. Other value kinds are skipped.
    pub fn string_metadata(&self) -> BTreeMap<String, String> {
        self.metadata
            .iter()
            .flat_map(|s| s.fields.iter())
            .filter_map(|(key, value)| match &value.kind {
                Some(Kind::StringValue(s)) => Some((key.clone(), s.clone())),
                _ => None,
            })
            .collect()
    }

    /// Build the connection context for this node.
    pub fn to_context(&self, connection_id: ConnectionId) -> ConnectionContext {
        ConnectionContext::new(connection_id, self.id.clone())
            .with_cluster(self.cluster.clone())
            .with_metadata(self.string_metadata())
    }
}

/// `google.rpc.Status`, carried in `error_detail` of a NACK.
#[derive(Clone, PartialEq, Message)]
pub struct RpcStatus {
    /// Status code.
    #[prost(int32, tag = "1")]
    pub code: i32,
    /// Error message.
    #[prost(string, tag = "2")]
    pub message: String,
    /// Error details.
    #[prost(message, repeated, tag = "3")]
    pub details: Vec<prost_types::Any>,
}

/// Discovery request sent by a proxy.
#[derive(Clone, PartialEq, Message)]
pub struct DiscoveryRequest {
    /// Version of the last accepted response for this type (empty initially).
    #[prost(string, tag = "1")]
    pub version_info: String,
    /// Node information.
    #[prost(message, optional, tag = "2")]
    pub node: Option<Node>,
    /// Requested resource names. Empty means all.
    #[prost(string, repeated, tag = "3")]
    pub resource_names: Vec<String>,
    /// Type URL of requested resources.
    #[prost(string, tag = "4")]
    pub type_url: String,
    /// Nonce of the response being acknowledged.
    #[prost(string, tag = "5")]
    pub response_nonce: String,
    /// Set when the proxy rejected the response (NACK).
    #[prost(message, optional, tag = "6")]
    pub error_detail: Option<RpcStatus>,
}

impl DiscoveryRequest {
    /// A first request for a type URL.
    pub fn new(type_url: impl Into<String>) -> Self {
        Self {
            type_url: type_url.into(),
            ..Default::default()
        }
    }

    /// Attach the node identity.
    #[must_use]
    pub fn with_node(mut self, node: Node) -> Self {
        self.node = Some(node);
        self
    }

    /// Set the requested resource names.
    #[must_use]
    pub fn with_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.resource_names = names.into_iter().map(Into::into).collect();
        self
    }

    /// Set the nonce and version being answered.
    #[must_use]
    pub fn with_nonce(mut self, nonce: impl Into<String>, version_info: impl Into<String>) -> Self {
        self.response_nonce = nonce.into();
        self.version_info = version_info.into();
        self
    }

    /// An ACK of `response`, keeping this request's names.
    #[must_use]
    pub fn ack(self, response: &DiscoveryResponse) -> Self {
        self.with_nonce(response.nonce.clone(), response.version_info.clone())
    }

    /// A NACK of `response`.
    #[must_use]
    pub fn nack(mut self, response: &DiscoveryResponse, message: impl Into<String>) -> Self {
        self.response_nonce = response.nonce.clone();
        self.error_detail = Some(RpcStatus {
            code: tonic::Code::InvalidArgument as i32,
            message: message.into(),
            details: Vec::new(),
        });
        self
    }

    /// The NACK message, if this request rejects a response.
    pub fn nack_message(&self) -> Option<&str> {
        self.error_detail.as_ref().map(|d| d.message.as_str())
    }
}

/// Control plane identifier.
#[derive(Clone, PartialEq, Message)]
pub struct ControlPlane {
    /// Identifier.
    #[prost(string, tag = "1")]
    pub identifier: String,
}

/// Discovery response sent to a proxy.
#[derive(Clone, PartialEq, Message)]
pub struct DiscoveryResponse {
    /// Version of this response.
    #[prost(string, tag = "1")]
    pub version_info: String,
    /// Resources.
    #[prost(message, repeated, tag = "2")]
    pub resources: Vec<prost_types::Any>,
    /// Whether this is a canary response.
    #[prost(bool, tag = "3")]
    pub canary: bool,
    /// Type URL of the resources.
    #[prost(string, tag = "4")]
    pub type_url: String,
    /// Unique nonce for this response.
    #[prost(string, tag = "5")]
    pub nonce: String,
    /// Control plane identifier.
    #[prost(message, optional, tag = "6")]
    pub control_plane: Option<ControlPlane>,
}
