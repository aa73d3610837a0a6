//! # ads-server
//!
//! State-of-the-world Aggregated Discovery Service for Envoy-compatible
//! proxies.
//!
//! This crate provides the synchronization core and its gRPC surface:
//!
//! - [`AdsServer`] - Owns the connection registry, version authority and
//!   push scheduler
//! - [`AdsServerBuilder`] - Builder for configuring the server
//! - [`ProtocolEngine`] - Per-stream request/ACK/NACK handling
//! - [`PushScheduler`] - Scoped fan-out of configuration changes
//! - v2 and v3 `AggregatedDiscoveryService` bindings
//! - Health checking via the gRPC health protocol
//! - Metrics through the `metrics` facade
//! - Graceful shutdown with connection draining
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use ads_core::PushRequest;
//! use ads_memory::MemEnvironment;
//! use ads_server::AdsServer;
//!
//! let env = Arc::new(MemEnvironment::new());
//! let server = AdsServer::builder().environment(env.clone()).build()?;
//!
//! // Later, after changing `env`:
//! server.notify(PushRequest::full());
//!
//! server.serve("[::]:15010".parse()?).await?;
//! ```
//!
//! ## Pushes
//!
//! [`AdsServer::notify`] allocates one version per push and queues work on
//! every affected connection without waiting for it to be sent. A
//! connection that is busy when several pushes arrive sends one response
//! per kind, carrying the newest version.
//!
//! ## Graceful Shutdown
//!
//! On shutdown every service is marked not serving, all connections are
//! closed, and the server waits up to the grace period for their tasks to
//! finish.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod builder;
mod config;
mod connection;
mod engine;
pub mod health;
pub mod metrics;
pub mod proto;
mod registry;
mod scheduler;
pub mod shutdown;
mod stream;
mod subscription;


pub mod services;

pub use builder::AdsServerBuilder;
pub use config::ServerConfig;
pub use connection::{ConnectionHandle, ConnectionStatus, PendingPush};
pub use engine::{ProtocolEngine, RequestOutcome};
pub use health::HealthService;
pub use metrics::{AdsMetrics, ResponseTrigger};
pub use proto::{DiscoveryRequest, DiscoveryResponse, Node};
pub use registry::ConnectionRegistry;
pub use scheduler::{PushScheduler, PushSummary};
pub use services::{
    AdsConfig, AdsResponseStream, AdsService, AggregatedDiscoveryService,
    AggregatedDiscoveryServiceServer, V2Transport, V3Transport,
};
pub use shutdown::{DrainGuard, ShutdownController};
pub use stream::StreamStats;
pub use subscription::{Subscription, SubscriptionState, SubscriptionStatus};

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::Stream;
use tokio::sync::oneshot;
use tonic::transport::Server;
use tonic::Status;
use tracing::info;

use ads_core::{
    PushRequest, ResourceGenerator, ScopeResolver, ServiceDirectory, VersionAuthority,
};

/// The ADS server.
///
/// Connections register themselves when their stream identifies a node;
/// configuration changes enter through [`notify`](Self::notify).
pub struct AdsServer {
    registry: Arc<ConnectionRegistry>,
    authority: Arc<VersionAuthority>,
    generator: Arc<dyn ResourceGenerator>,
    scheduler: PushScheduler,
    metrics: AdsMetrics,
    shutdown: ShutdownController,
    config: ServerConfig,
}

impl std::fmt::Debug for AdsServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdsServer")
            .field("connections", &self.registry.len())
            .field("version", &self.authority.current_version())
            .field("config", &self.config)
            .finish()
    }
}

impl AdsServer {
    /// Create a new builder for configuring the server.
    pub fn builder() -> AdsServerBuilder {
        AdsServerBuilder::new()
    }

    pub(crate) fn new(
        generator: Arc<dyn ResourceGenerator>,
        scope: Arc<dyn ScopeResolver>,
        directory: Arc<dyn ServiceDirectory>,
        config: ServerConfig,
    ) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let authority = Arc::new(VersionAuthority::new());
        let metrics = AdsMetrics::new();
        let initial = authority.next_version();
        info!(version = %initial, "initial push version allocated");

        let scheduler = PushScheduler::new(
            Arc::clone(&registry),
            Arc::clone(&authority),
            scope,
            directory,
            metrics.clone(),
        );

        Self {
            registry,
            authority,
            generator,
            scheduler,
            metrics,
            shutdown: ShutdownController::new(),
            config,
        }
    }

    /// Get the server configuration.
    #[inline]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Get the connection registry.
    #[inline]
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Get the version authority.
    #[inline]
    pub fn authority(&self) -> &Arc<VersionAuthority> {
        &self.authority
    }

    /// Get the metrics handle.
    #[inline]
    pub fn metrics(&self) -> &AdsMetrics {
        &self.metrics
    }

    /// Get the shutdown controller.
    #[inline]
    pub fn shutdown_controller(&self) -> &ShutdownController {
        &self.shutdown
    }

    /// Number of registered connections.
    pub fn connection_count(&self) -> usize {
        self.registry.len()
    }

    /// Create the ADS stream service.
    pub fn service(&self) -> AdsService {
        AdsService::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.authority),
            Arc::clone(&self.generator),
            self.metrics.clone(),
            self.shutdown.clone(),
            AdsConfig::from(&self.config),
        )
    }

    /// Serve one ADS stream without a gRPC transport.
    pub fn stream<S>(&self, requests: S) -> AdsResponseStream
    where
        S: Stream<Item = Result<DiscoveryRequest, Status>> + Send + 'static,
    {
        self.service().serve_stream(requests)
    }

    /// Push a configuration change to the connections it affects.
    pub fn notify(&self, request: PushRequest) -> PushSummary {
        self.scheduler.schedule(request)
    }

    /// Push every subscribed kind to every connection.
    pub fn push_all(&self) -> PushSummary {
        self.notify(PushRequest::full())
    }

    /// Synchronization status of every registered connection.
    pub fn sync_status(&self) -> Vec<ConnectionStatus> {
        let current = self.authority.current_version();
        self.registry
            .all()
            .iter()
            .map(|handle| ConnectionStatus::capture(handle, current))
            .collect()
    }

    /// Close every connection and wait for them to drain.
    ///
    /// Returns `true` if all connections finished within the grace period.
    pub async fn shutdown(&self) -> bool {
        drain(&self.registry, &self.shutdown, self.config.grace_period).await
    }

    /// Build the router with both ADS transports and, if enabled, health.
    async fn build_router(&self) -> (tonic::transport::server::Router, Option<HealthService>) {
        let service = self.service();

        let mut builder = Server::builder()
            .http2_keepalive_interval(self.config.keepalive_interval)
            .http2_keepalive_timeout(self.config.keepalive_timeout)
            .max_concurrent_streams(self.config.max_concurrent_streams);

        let mut router = builder
            .add_service(AggregatedDiscoveryServiceServer::<_, V3Transport>::new(
                service.clone(),
            ))
            .add_service(AggregatedDiscoveryServiceServer::<_, V2Transport>::new(
                service,
            ));

        let health = if self.config.enable_health {
            let (health, health_svc) = HealthService::new();
            router = router.add_service(health_svc);
            health.set_all_serving().await;
            Some(health)
        } else {
            None
        };

        (router, health)
    }

    /// Start the server and listen on the given address.
    ///
    /// Shuts down gracefully on SIGTERM/SIGINT. The server stays usable
    /// while serving, so share it (for example in an `Arc`) to keep calling
    /// [`notify`](Self::notify).
    pub async fn serve(&self, addr: SocketAddr) -> Result<(), tonic::transport::Error> {
        self.serve_until(addr, shutdown::wait_for_signal()).await
    }

    /// Start the server with a custom shutdown signal.
    pub async fn serve_with_shutdown(
        &self,
        addr: SocketAddr,
        shutdown_rx: oneshot::Receiver<()>,
    ) -> Result<(), tonic::transport::Error> {
        self.serve_until(addr, async move {
            let _ = shutdown_rx.await;
        })
        .await
    }

    async fn serve_until<F>(&self, addr: SocketAddr, signal: F) -> Result<(), tonic::transport::Error>
    where
        F: std::future::Future<Output = ()> + Send,
    {
        info!(addr = %addr, "starting ADS server");

        let (router, health) = self.build_router().await;
        let registry = Arc::clone(&self.registry);
        let controller = self.shutdown.clone();
        let grace_period = self.config.grace_period;

        let serve_future = router.serve_with_shutdown(addr, async move {
            signal.await;

            if let Some(ref health) = health {
                health.set_all_not_serving().await;
            }

            drain(&registry, &controller, grace_period).await;
        });

        info!(addr = %addr, "ADS server listening");
        serve_future.await
    }
}

async fn drain(
    registry: &ConnectionRegistry,
    controller: &ShutdownController,
    grace_period: Duration,
) -> bool {
    let closed = registry.close_all();
    info!(connections = closed, grace_period = ?grace_period, "draining connections");
    controller.shutdown(grace_period).await
}
