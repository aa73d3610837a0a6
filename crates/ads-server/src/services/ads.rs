//! Aggregated Discovery Service (ADS) stream handling.
//!
//! Every stream is served by one task. The task first waits for a request
//! that identifies the node, registers the connection, then multiplexes
//! inbound requests, scheduled pushes, connection close and server shutdown
//! until one of them ends the stream.

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::Stream;
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tonic::{Request, Response, Status, Streaming};
use tracing::{debug, info, instrument, warn};

use ads_core::{AdsError, ConnectionId, ResourceGenerator, VersionAuthority};

use crate::config::ServerConfig;
use crate::connection::ConnectionHandle;
use crate::engine::{ProtocolEngine, RequestOutcome};
use crate::metrics::AdsMetrics;
use crate::proto::{DiscoveryRequest, DiscoveryResponse};
use crate::registry::ConnectionRegistry;
use crate::shutdown::{wait_for_shutdown, ShutdownController};

/// Configuration for the ADS service.
#[derive(Debug, Clone)]
pub struct AdsConfig {
    /// Response buffer size per stream.
    pub response_buffer_size: usize,
    /// Maximum concurrent connections.
    pub max_connections: Option<usize>,
    /// Identifier stamped on every response.
    pub control_plane_id: Option<String>,
}

impl Default for AdsConfig {
    fn default() -> Self {
        Self {
            response_buffer_size: 16,
            max_connections: None,
            control_plane_id: None,
        }
    }
}

impl From<&ServerConfig> for AdsConfig {
    fn from(config: &ServerConfig) -> Self {
        Self {
            response_buffer_size: config.response_buffer_size,
            max_connections: config.max_connections,
            control_plane_id: config.control_plane_id.clone(),
        }
    }
}

/// Response stream type for ADS.
pub type AdsResponseStream = ReceiverStream<Result<DiscoveryResponse, Status>>;

type ResponseSender = mpsc::Sender<Result<DiscoveryResponse, Status>>;

/// Aggregated Discovery Service.
///
/// Cheap to clone; clones share the registry, the version authority and
/// the generator.
#[derive(Clone)]
pub struct AdsService {
    registry: Arc<ConnectionRegistry>,
    authority: Arc<VersionAuthority>,
    generator: Arc<dyn ResourceGenerator>,
    metrics: AdsMetrics,
    shutdown: ShutdownController,
    config: AdsConfig,
}

impl std::fmt::Debug for AdsService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdsService")
            .field("connections", &self.registry.len())
            .field("config", &self.config)
            .finish()
    }
}

impl AdsService {
    /// Create a new ADS service.
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        authority: Arc<VersionAuthority>,
        generator: Arc<dyn ResourceGenerator>,
        metrics: AdsMetrics,
        shutdown: ShutdownController,
        config: AdsConfig,
    ) -> Self {
        Self {
            registry,
            authority,
            generator,
            metrics,
            shutdown,
            config,
        }
    }

    /// Get a reference to the connection registry.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Get a reference to the configuration.
    pub fn config(&self) -> &AdsConfig {
        &self.config
    }

    /// Serve one ADS stream from any source of requests.
    ///
    /// Spawns the connection task and returns the response stream. The
    /// stream ends when the client stops sending, the connection is closed
    /// or the server shuts down.
    pub fn serve_stream<S>(&self, requests: S) -> AdsResponseStream
    where
        S: Stream<Item = Result<DiscoveryRequest, Status>> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(self.config.response_buffer_size);
        let service = self.clone();
        tokio::spawn(async move { service.run_connection(Box::pin(requests), tx).await });
        ReceiverStream::new(rx)
    }

    async fn run_connection<S>(self, mut requests: Pin<Box<S>>, tx: ResponseSender)
    where
        S: Stream<Item = Result<DiscoveryRequest, Status>> + Send + 'static,
    {
        let _drain = self.shutdown.track_connection();
        let mut shutdown = self.shutdown.subscribe();
        if self.shutdown.is_shutdown() {
            let _ = tx.send(Err(AdsError::Shutdown.into())).await;
            return;
        }

        let Some((handle, engine, first)) = self.identify(&mut requests, &tx, &mut shutdown).await
        else {
            debug!("stream ended before the node was identified");
            return;
        };

        self.metrics.connection_opened();
        info!(
            connection = %handle.id(),
            node = handle.node_id(),
            "ADS connection established"
        );

        let reason = self
            .drive(&handle, engine, first, &mut requests, &tx, &mut shutdown)
            .await;

        self.registry.unregister(handle.id());
        handle.close();
        self.metrics.connection_closed(handle.stats().age());
        info!(
            connection = %handle.id(),
            node = handle.node_id(),
            reason,
            duration = ?handle.stats().age(),
            requests = handle.stats().requests(),
            responses = handle.stats().responses(),
            "ADS connection closed"
        );
    }

    /// Wait for a request carrying a node and register the connection.
    async fn identify<S>(
        &self,
        requests: &mut Pin<Box<S>>,
        tx: &ResponseSender,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Option<(Arc<ConnectionHandle>, ProtocolEngine, DiscoveryRequest)>
    where
        S: Stream<Item = Result<DiscoveryRequest, Status>> + Send + 'static,
    {
        loop {
            let request = tokio::select! {
                biased;
                _ = wait_for_shutdown(shutdown) => return None,
                next = requests.next() => match next {
                    Some(Ok(request)) => request,
                    Some(Err(status)) => {
                        debug!(error = %status, "stream error before identification");
                        return None;
                    }
                    None => return None,
                },
            };

            let Some(node) = request.node.as_ref().filter(|node| !node.id.is_empty()) else {
                warn!(
                    type_url = %request.type_url,
                    error = %AdsError::MissingNode,
                    "skipping request"
                );
                continue;
            };

            let handle = Arc::new(ConnectionHandle::new(node.to_context(ConnectionId::next())));
            match self.config.max_connections {
                Some(limit) => {
                    if !self.registry.try_register(Arc::clone(&handle), limit) {
                        warn!(node = %node.id, limit, "rejecting connection");
                        let _ = tx.send(Err(AdsError::ConnectionLimit { limit }.into())).await;
                        return None;
                    }
                }
                None => self.registry.register(Arc::clone(&handle)),
            }
            let engine = ProtocolEngine::new(
                Arc::clone(handle.context()),
                Arc::clone(&self.generator),
                Arc::clone(&self.authority),
                self.metrics.clone(),
            )
            .with_control_plane(self.config.control_plane_id.clone());

            return Some((handle, engine, request));
        }
    }

    /// Run the connection until it ends. Returns why it ended.
    #[instrument(skip_all, fields(connection = %handle.id()))]
    async fn drive<S>(
        &self,
        handle: &Arc<ConnectionHandle>,
        mut engine: ProtocolEngine,
        first: DiscoveryRequest,
        requests: &mut Pin<Box<S>>,
        tx: &ResponseSender,
        shutdown: &mut watch::Receiver<bool>,
    ) -> &'static str
    where
        S: Stream<Item = Result<DiscoveryRequest, Status>> + Send + 'static,
    {
        let mut inbound = Some(first);
        loop {
            if let Some(request) = inbound.take() {
                handle.stats().record_request();
                let outcome = engine.on_request(&request);
                handle.publish_subscriptions(engine.status());
                match outcome {
                    Ok(RequestOutcome::Respond(response)) => {
                        if !Self::send(handle, tx, Ok(response)).await {
                            return "client gone";
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(
                            node = handle.node_id(),
                            error = %e,
                            "terminating stream"
                        );
                        Self::send(handle, tx, Err(e.into())).await;
                        return "protocol error";
                    }
                }
            }

            tokio::select! {
                biased;
                _ = wait_for_shutdown(shutdown) => return "server shutdown",
                _ = handle.closed() => return "connection closed",
                _ = handle.push_queued() => {
                    let Some(push) = handle.take_pending() else { continue };
                    handle.stats().record_push();
                    let responses = engine.on_push(&push);
                    handle.publish_subscriptions(engine.status());
                    for response in responses {
                        if !Self::send(handle, tx, Ok(response)).await {
                            return "client gone";
                        }
                    }
                }
                next = requests.next() => match next {
                    Some(Ok(request)) => inbound = Some(request),
                    Some(Err(status)) => {
                        debug!(error = %status, "inbound stream error");
                        return "stream error";
                    }
                    None => return "client closed stream",
                },
            }
        }
    }

    /// Send one item unless the connection closes first.
    async fn send(
        handle: &ConnectionHandle,
        tx: &ResponseSender,
        item: Result<DiscoveryResponse, Status>,
    ) -> bool {
        tokio::select! {
            biased;
            _ = handle.closed() => false,
            sent = tx.send(item) => match sent {
                Ok(()) => {
                    handle.stats().record_response();
                    true
                }
                Err(_) => false,
            },
        }
    }
}

/// Server-side ADS interface, independent of transport version.
#[async_trait]
pub trait AggregatedDiscoveryService: Send + Sync + 'static {
    /// Server streaming response type for StreamAggregatedResources.
    type StreamAggregatedResourcesStream: Stream<Item = Result<DiscoveryResponse, Status>>
        + Send
        + 'static;

    /// Bidirectional state-of-the-world ADS stream.
    async fn stream_aggregated_resources(
        &self,
        request: Request<Streaming<DiscoveryRequest>>,
    ) -> Result<Response<Self::StreamAggregatedResourcesStream>, Status>;
}

#[async_trait]
impl AggregatedDiscoveryService for AdsService {
    type StreamAggregatedResourcesStream = AdsResponseStream;

    #[instrument(skip(self, request), name = "ads_stream")]
    async fn stream_aggregated_resources(
        &self,
        request: Request<Streaming<DiscoveryRequest>>,
    ) -> Result<Response<Self::StreamAggregatedResourcesStream>, Status> {
        if self.shutdown.is_shutdown() {
            return Err(AdsError::Shutdown.into());
        }
        debug!(remote = ?request.remote_addr(), "ADS stream opened");
        Ok(Response::new(self.serve_stream(request.into_inner())))
    }
}
