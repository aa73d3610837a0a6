//! The [`Resource`] trait for generated ADS resources.

use std::fmt;
use std::sync::Arc;

use crate::ResourceKind;

/// A resource produced by a [`ResourceGenerator`](crate::ResourceGenerator).
///
/// The synchronization core never inspects payloads: it only needs the
/// resource name and its serialized protobuf message. The message is wrapped
/// in a `google.protobuf.Any` labelled with the type URL the proxy subscribed
/// with, so one encoding serves both schemas.
pub trait Resource: Send + Sync + fmt::Debug {
    /// The kind of this resource.
    fn kind(&self) -> ResourceKind;

    /// The resource name.
    fn name(&self) -> &str;

    /// Serialize the resource message.
    fn encode(&self) -> Result<Vec<u8>, Box<dyn std::error::Error + Send + Sync>>;
}

/// Type alias for a shared resource.
pub type BoxResource = Arc<dyn Resource>;
