//! # meshsync
//!
//! Aggregated Discovery Service (ADS) core for service mesh control planes.
//!
//! meshsync keeps every connected proxy's view of the mesh in sync over
//! state-of-the-world ADS streams:
//!
//! - One stream per proxy carries clusters, endpoints, listeners and routes
//! - v2 and v3 resource schemas, locked per kind and stream
//! - Scoped pushes: a configuration change only reaches proxies that can see it
//! - ACK/NACK tracking and per-connection sync status
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use meshsync::prelude::*;
//!
//! let env = MemEnvironment::new().shared();
//! env.registry().add_service(Service::new("reviews.default.svc", "default", [9080]));
//!
//! let server = AdsServer::builder().environment(env.clone()).build()?;
//!
//! // Tell connected proxies about a change.
//! server.notify(PushRequest::incremental([ConfigKey::service("reviews.default.svc", "default")]));
//!
//! server.serve("[::]:15010".parse()?).await?;
//! ```
//!
//! ## Architecture
//!
//! - `ads-core` - Resource kinds, type URLs, versions, errors and the
//!   collaborator traits a control plane implements
//! - `ads-server` - Protocol engine, push scheduler and gRPC server
//! - `ads-memory` - In-memory service registry and config store
//!
//! This crate re-exports all public APIs for convenience.
//!
//! ## Design Principles
//!
//! 1. **No panics in library code** - All errors are returned as `Result`
//! 2. **No locks held across await points** - Per-connection state is owned
//!    by the connection's task
//! 3. **Pushes never block** - The scheduler merges work into a pending slot
//!    and moves on

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(unsafe_code)]
#![warn(missing_docs)]

pub use ads_core as core;
pub use ads_memory as memory;
pub use ads_server as server;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use meshsync::prelude::*;
/// ```
pub mod prelude {
    // Core types
    pub use ads_core::{
        AdsError, AdsResult, BoxResource, ConfigKey, ConfigKind, ConnectionContext, NodeHash,
        PushRequest, PushVersion, Resource, ResourceGenerator, ResourceKind, ScopeResolver,
        SchemaVersion, ServiceDirectory, ServiceSummary, TypeUrl,
    };

    // In-memory environment
    pub use ads_memory::{ConfigSpec, MemEnvironment, Service, ServiceInstance};

    // Server types
    pub use ads_server::{
        AdsServer, AdsServerBuilder, ConnectionStatus, PushSummary, ServerConfig,
        SubscriptionState,
    };
}

/// Version information for this crate.
pub mod version {
    /// Crate version.
    pub const VERSION: &str = env!("CARGO_PKG_VERSION");

    /// Minimum supported Rust version.
    pub const MSRV: &str = "1.75";

    /// Get version info as a string.
    pub fn version_string() -> String {
        format!("meshsync {} (MSRV {})", VERSION, MSRV)
    }
}
