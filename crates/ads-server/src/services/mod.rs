//! ADS stream service and its gRPC bindings.

mod ads;
mod grpc;

pub use ads::{AdsConfig, AdsResponseStream, AdsService, AggregatedDiscoveryService};
pub use grpc::{AdsTransport, AggregatedDiscoveryServiceServer, V2Transport, V3Transport};
