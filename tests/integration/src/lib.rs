//! End-to-end ADS scenarios.
//!
//! Most scenarios drive streams in-process through
//! [`AdsServer::stream`](meshsync::server::AdsServer::stream); the gRPC
//! tests bind a real listener and talk to it with a tonic client.
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test --package integration-tests
//!
//! # With logs
//! RUST_LOG=ads_server=debug cargo test --package integration-tests -- --nocapture
//! ```

pub mod harness;

#[cfg(test)]
mod grpc_tests;
#[cfg(test)]
mod load_tests;
#[cfg(test)]
mod stream_tests;
