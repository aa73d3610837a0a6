//! # ads-memory
//!
//! In-memory implementations of the collaborators the ADS core consumes:
//!
//! - [`MemServiceRegistry`] - Services and their instances
//! - [`MemConfigStore`] - VirtualService, DestinationRule, Sidecar and Gateway objects
//! - [`EgressScope`] - Sidecar egress host matching
//! - [`MemEnvironment`] - Implements [`ResourceGenerator`](ads_core::ResourceGenerator),
//!   [`ScopeResolver`](ads_core::ScopeResolver) and
//!   [`ServiceDirectory`](ads_core::ServiceDirectory) over both stores
//!
//! ## Key Design Decisions
//!
//! - Uses `DashMap` for concurrent access from connection tasks and the push scheduler
//! - No map guard is held while calling back into another store
//! - Deleted configs leave a tombstone so the scope of the deletion can still be resolved
//!
//! ## Example
//!
//! ```rust
//! use ads_core::{ConfigKey, ServiceDirectory};
//! use ads_memory::{MemEnvironment, Service};
//!
//! let env = MemEnvironment::new();
//! env.registry().add_service(Service::new("reviews.bookinfo.svc.cluster.local", "bookinfo", [9080]));
//!
//! let key = ConfigKey::service("reviews.bookinfo.svc.cluster.local", "bookinfo");
//! assert!(env.service(&key).is_some());
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config_store;
mod environment;
mod registry;
mod resource;
mod scope;
mod stats;

pub use config_store::{ConfigSpec, MemConfigStore};
pub use environment::{MemEnvironment, DEFAULT_ROOT_NAMESPACE};
pub use registry::{MemServiceRegistry, Service, ServiceInstance};
pub use resource::{MemResource, NamedResource};
pub use scope::{EgressHost, EgressScope};
pub use stats::GenerationStats;
