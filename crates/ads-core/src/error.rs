//! Error types for ADS operations.
//!
//! This module provides [`AdsError`], the error type shared by the protocol
//! engine, the push scheduler and the external collaborators. Every variant
//! converts to a gRPC status code.

use crate::{ResourceKind, SchemaVersion};

/// Error type for ADS operations.
///
/// Protocol outcomes that are not failures (stale nonces, NACKs, missing
/// resources) are not represented here; they are reported as outcomes by
/// the protocol engine.
///
/// # Example
///
/// ```rust
/// use ads_core::{AdsError, ResourceKind, SchemaVersion};
///
/// let err = AdsError::SchemaMismatch {
///     kind: ResourceKind::Cluster,
///     established: SchemaVersion::V2,
///     requested: SchemaVersion::V3,
/// };
/// let status: tonic::Status = err.into();
/// assert_eq!(status.code(), tonic::Code::InvalidArgument);
/// ```
#[derive(Debug, thiserror::Error)]
pub enum AdsError {
    /// Malformed or unknown type URL.
    #[error("invalid type URL: {type_url} - {reason}")]
    InvalidTypeUrl {
        /// The invalid type URL.
        type_url: String,
        /// Reason why the type URL is invalid.
        reason: String,
    },

    /// A resource kind was requested in a different schema than the one the
    /// stream already uses for it.
    #[error("{kind} already subscribed with {established} type URL, request used {requested}")]
    SchemaMismatch {
        /// The resource kind.
        kind: ResourceKind,
        /// Schema locked by the first request for the kind.
        established: SchemaVersion,
        /// Schema of the offending request.
        requested: SchemaVersion,
    },

    /// The first request of a stream did not identify the node.
    #[error("discovery request carries no node identity")]
    MissingNode,

    /// The resource generator failed for a kind.
    #[error("failed to generate {kind} resources: {message}")]
    Generation {
        /// Kind being generated.
        kind: ResourceKind,
        /// Error message.
        message: String,
        /// Optional underlying error.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Resource encoding failed.
    #[error("encoding error for {kind} {name}: {message}")]
    Encoding {
        /// Kind being encoded.
        kind: ResourceKind,
        /// Resource name.
        name: String,
        /// Error message.
        message: String,
    },

    /// Connection is closed or closing.
    #[error("connection closed: {reason}")]
    ConnectionClosed {
        /// Reason for closure.
        reason: String,
    },

    /// Too many concurrent connections.
    #[error("connection limit reached ({limit})")]
    ConnectionLimit {
        /// Configured limit.
        limit: usize,
    },

    /// gRPC transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Optional underlying error.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Server is shutting down.
    #[error("server is shutting down")]
    Shutdown,

    /// Unexpected internal error.
    #[error("internal error: {message}")]
    Internal {
        /// Error message.
        message: String,
        /// Optional underlying error.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration error.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl AdsError {
    /// Create a generation error for a kind.
    pub fn generation(kind: ResourceKind, message: impl Into<String>) -> Self {
        Self::Generation {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Create a generation error wrapping an underlying error.
    pub fn generation_from<E>(kind: ResourceKind, message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Generation {
            kind,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an internal error from any error type.
    pub fn internal<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Internal {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a transport error from any error type.
    pub fn transport<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Transport {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Whether the error terminates the stream it occurred on.
    #[must_use]
    pub fn is_fatal_to_stream(&self) -> bool {
        matches!(
            self,
            Self::SchemaMismatch { .. }
                | Self::ConnectionClosed { .. }
                | Self::ConnectionLimit { .. }
                | Self::Transport { .. }
                | Self::Shutdown
        )
    }
}

impl From<AdsError> for tonic::Status {
    fn from(err: AdsError) -> Self {
        match &err {
            AdsError::InvalidTypeUrl { .. }
            | AdsError::SchemaMismatch { .. }
            | AdsError::MissingNode
            | AdsError::Encoding { .. }
            | AdsError::Configuration(_) => tonic::Status::invalid_argument(err.to_string()),
            AdsError::Generation { .. } | AdsError::Internal { .. } => {
                tonic::Status::internal(err.to_string())
            }
            AdsError::ConnectionClosed { .. } => tonic::Status::cancelled(err.to_string()),
            AdsError::ConnectionLimit { .. } => tonic::Status::resource_exhausted(err.to_string()),
            AdsError::Transport { .. } | AdsError::Shutdown => {
                tonic::Status::unavailable(err.to_string())
            }
        }
    }
}
