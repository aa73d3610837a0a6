//! # ads-core
//!
//! Core types, traits, and error handling for the meshsync Aggregated
//! Discovery Service.
//!
//! This crate provides the vocabulary shared by every other meshsync crate:
//!
//! - [`AdsError`] - Error type with gRPC status code mapping
//! - [`ResourceKind`], [`SchemaVersion`], [`TypeUrl`] - The dual-schema type URL catalogue
//! - [`VersionAuthority`] - Process-wide push versions and response nonces
//! - [`ConnectionContext`] - Identity of a connected proxy
//! - [`PushRequest`], [`ConfigKey`] - Change notifications from the config layer
//! - [`ResourceGenerator`], [`ScopeResolver`], [`ServiceDirectory`] - Collaborators
//!   implemented outside the synchronization core
//!
//! ## Example
//!
//! ```rust
//! use ads_core::{ResourceKind, SchemaVersion, TypeUrl, VersionAuthority};
//!
//! let url = TypeUrl::parse("type.googleapis.com/envoy.api.v2.Cluster").unwrap();
//! assert_eq!(url.kind(), ResourceKind::Cluster);
//! assert_eq!(url.schema(), SchemaVersion::V2);
//!
//! let authority = VersionAuthority::new();
//! let v1 = authority.next_version();
//! let v2 = authority.next_version();
//! assert!(v2 > v1);
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod collaborator;
mod error;
mod node;
mod push;
mod resource;
mod type_url;
mod version;

pub use collaborator::{ResourceGenerator, ScopeResolver, ServiceDirectory, ServiceSummary};
pub use error::AdsError;
pub use node::{ConnectionContext, ConnectionId, NodeHash};
pub use push::{ConfigKey, ConfigKind, PushRequest};
pub use resource::{BoxResource, Resource};
pub use type_url::{ResourceKind, ResourceKindSet, SchemaVersion, TypeUrl};
pub use version::{PushVersion, VersionAuthority};

/// Result type alias using [`AdsError`].
pub type Result<T> = std::result::Result<T, AdsError>;

/// Alias for Result used across the workspace.
pub type AdsResult<T> = Result<T>;
