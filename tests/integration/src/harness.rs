//! Test harness for ADS scenarios.
//!
//! Provides utilities for:
//! - Building a server over an in-memory mesh
//! - Driving proxy streams in-process or over gRPC
//! - Waiting for responses with bounded timeouts

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::BoxStream;
use futures::StreamExt;
use prost::Message;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_stream::wrappers::ReceiverStream;
use tonic::transport::Channel;
use tonic::Status;
use tracing::info;

use meshsync::memory::NamedResource;
use meshsync::prelude::*;
use meshsync::server::{DiscoveryRequest, DiscoveryResponse, Node, V2Transport, V3Transport};
use meshsync::server::services::AdsTransport;

/// Namespace whose `Sidecar` limits egress to its own namespace and
/// [`SHARED_NS`].
pub const SCOPED_NS: &str = "app";

/// Namespace visible from [`SCOPED_NS`].
pub const SHARED_NS: &str = "shared";

/// Namespace without a `Sidecar`; its proxies see everything.
pub const OPEN_NS: &str = "web";

/// Type URLs used by the scenarios.
pub mod urls {
    /// v3 clusters.
    pub const CDS: &str = "type.googleapis.com/envoy.config.cluster.v3.Cluster";
    /// v3 endpoints.
    pub const EDS: &str = "type.googleapis.com/envoy.config.endpoint.v3.ClusterLoadAssignment";
    /// v3 listeners.
    pub const LDS: &str = "type.googleapis.com/envoy.config.listener.v3.Listener";
    /// v3 routes.
    pub const RDS: &str = "type.googleapis.com/envoy.config.route.v3.RouteConfiguration";
    /// v2 clusters.
    pub const V2_CDS: &str = "type.googleapis.com/envoy.api.v2.Cluster";
    /// v2 listeners.
    pub const V2_LDS: &str = "type.googleapis.com/envoy.api.v2.Listener";
    /// All v3 kinds in push order.
    pub const ALL: [&str; 4] = [CDS, EDS, LDS, RDS];
}

/// Default wait for a response that should arrive.
pub const RESPONSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default wait for a response that should not arrive.
pub const QUIET_PERIOD: Duration = Duration::from_secs(1);

/// Install a test subscriber honouring `RUST_LOG`. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Istio-style node id of a sidecar in `namespace`.
pub fn node_id(pod: &str, namespace: &str) -> String {
    format!("sidecar~10.0.0.1~{pod}.{namespace}~{namespace}.svc.cluster.local")
}

/// Resource names carried by a response.
pub fn names(response: &DiscoveryResponse) -> Vec<String> {
    response
        .resources
        .iter()
        .filter_map(|any| NamedResource::decode(any.value.as_slice()).ok())
        .map(|resource| resource.name)
        .collect()
}

/// Resource kind of a response.
pub fn kind_of(response: &DiscoveryResponse) -> ResourceKind {
    TypeUrl::parse(&response.type_url)
        .map(|url| url.kind())
        .unwrap_or_else(|e| panic!("response with unknown type url: {e}"))
}

/// Push version carried by a response.
pub fn version_of(response: &DiscoveryResponse) -> PushVersion {
    PushVersion::parse(&response.version_info)
        .unwrap_or_else(|| panic!("unparseable version {:?}", response.version_info))
}

/// A server over an in-memory mesh.
///
/// The mesh starts with a `Sidecar` in [`SCOPED_NS`] whose egress is
/// `./*` and `shared/*`, and one service in each namespace.
pub struct TestMesh {
    /// The in-memory environment.
    pub env: Arc<MemEnvironment>,
    /// The server under test.
    pub server: AdsServer,
}

impl TestMesh {
    /// Create a mesh with default server settings.
    pub fn new() -> Self {
        Self::with_builder(|builder| builder)
    }

    /// Create a mesh, customising the server builder.
    pub fn with_builder(configure: impl FnOnce(AdsServerBuilder) -> AdsServerBuilder) -> Self {
        init_tracing();
        let env = MemEnvironment::new().shared();
        env.configs().create(
            "default",
            SCOPED_NS,
            ConfigSpec::Sidecar {
                egress: vec!["./*".into(), format!("{SHARED_NS}/*")],
            },
        );
        for namespace in [SCOPED_NS, SHARED_NS, OPEN_NS] {
            let host = format!("base.{namespace}.svc.cluster.local");
            env.registry()
                .add_service(Service::new(host.clone(), namespace, [8080]));
            env.registry()
                .add_instance(&host, ServiceInstance::new("10.1.0.1", 8080));
        }

        let server = configure(AdsServer::builder().environment(env.clone()))
            .build()
            .unwrap_or_else(|e| panic!("server build failed: {e}"));
        Self { env, server }
    }

    /// Open an in-process stream for a proxy in `namespace`.
    pub fn proxy(&self, pod: &str, namespace: &str) -> TestProxy {
        self.proxy_with_node(Node::new(node_id(pod, namespace)))
    }

    /// Open an in-process stream for an arbitrary node.
    pub fn proxy_with_node(&self, node: Node) -> TestProxy {
        let (tx, rx) = mpsc::channel(32);
        let responses = self.server.stream(ReceiverStream::new(rx).map(Ok));
        TestProxy::new(node, tx, responses.boxed())
    }

    /// Register a service with one port and, optionally, instances.
    pub fn add_service(&self, host: &str, namespace: &str, port: u16, instances: usize) -> ConfigKey {
        let key = self
            .env
            .registry()
            .add_service(Service::new(host, namespace, [port]));
        for i in 0..instances {
            self.env
                .registry()
                .add_instance(host, ServiceInstance::new(format!("10.2.0.{}", i + 1), port));
        }
        key
    }

    /// Notify the server of changed configs.
    pub fn notify(&self, keys: impl IntoIterator<Item = ConfigKey>) -> PushSummary {
        self.server.notify(PushRequest::incremental(keys))
    }

    /// Wait until every connection has accepted its latest responses.
    pub async fn wait_synced(&self) {
        self.wait_until(|server| {
            let status = server.sync_status();
            !status.is_empty() && status.iter().all(ConnectionStatus::is_synced)
        })
        .await;
    }

    /// Wait until the server reaches `count` connections.
    pub async fn wait_connections(&self, count: usize) {
        self.wait_until(|server| server.connection_count() == count)
            .await;
    }

    /// Poll `condition` until it holds or [`RESPONSE_TIMEOUT`] elapses.
    pub async fn wait_until(&self, condition: impl Fn(&AdsServer) -> bool) {
        let reached = timeout(RESPONSE_TIMEOUT, async {
            while !condition(&self.server) {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        assert!(reached.is_ok(), "condition not reached: {:?}", self.server.sync_status());
    }
}

impl Default for TestMesh {
    fn default() -> Self {
        Self::new()
    }
}

/// One proxy stream, from the proxy's side.
pub struct TestProxy {
    node: Node,
    identified: bool,
    tx: mpsc::Sender<DiscoveryRequest>,
    responses: BoxStream<'static, Result<DiscoveryResponse, Status>>,
    names: HashMap<String, Vec<String>>,
}

impl TestProxy {
    fn new(
        node: Node,
        tx: mpsc::Sender<DiscoveryRequest>,
        responses: BoxStream<'static, Result<DiscoveryResponse, Status>>,
    ) -> Self {
        Self {
            node,
            identified: false,
            tx,
            responses,
            names: HashMap::new(),
        }
    }

    /// The proxy's node id.
    pub fn node_id(&self) -> &str {
        &self.node.id
    }

    /// Send a raw request. The node is attached to the first request only.
    pub async fn send(&mut self, mut request: DiscoveryRequest) {
        if !self.identified && request.node.is_none() {
            request.node = Some(self.node.clone());
        }
        self.identified = true;
        if self.tx.send(request).await.is_err() {
            panic!("stream of {} is gone", self.node.id);
        }
    }

    /// Request a type with names (empty for wildcard) and return the answer.
    pub async fn request(&mut self, type_url: &str, names: &[&str]) -> DiscoveryResponse {
        let names: Vec<String> = names.iter().map(|n| n.to_string()).collect();
        self.names.insert(type_url.to_string(), names.clone());
        self.send(DiscoveryRequest::new(type_url).with_names(names))
            .await;
        let response = self.recv().await;
        assert_eq!(response.type_url, type_url);
        response
    }

    /// Change the names of an existing subscription while acknowledging
    /// `last`, and return the answer.
    pub async fn change_names(
        &mut self,
        last: &DiscoveryResponse,
        names: &[&str],
    ) -> DiscoveryResponse {
        let names: Vec<String> = names.iter().map(|n| n.to_string()).collect();
        self.names.insert(last.type_url.clone(), names.clone());
        self.send(DiscoveryRequest::new(last.type_url.clone()).with_names(names).ack(last))
            .await;
        self.recv().await
    }

    /// Wildcard-subscribe to `type_url` and acknowledge the answer.
    pub async fn subscribe(&mut self, type_url: &str) -> DiscoveryResponse {
        let response = self.request(type_url, &[]).await;
        self.ack(&response).await;
        response
    }

    /// Subscribe to every v3 kind.
    pub async fn subscribe_all(&mut self) -> Vec<DiscoveryResponse> {
        let mut responses = Vec::new();
        for url in urls::ALL {
            responses.push(self.subscribe(url).await);
        }
        responses
    }

    /// Accept a response.
    pub async fn ack(&mut self, response: &DiscoveryResponse) {
        let names = self.current_names(&response.type_url);
        self.send(
            DiscoveryRequest::new(response.type_url.clone())
                .with_names(names)
                .ack(response),
        )
        .await;
    }

    /// Reject a response.
    pub async fn nack(&mut self, response: &DiscoveryResponse, message: &str) {
        let names = self.current_names(&response.type_url);
        self.send(
            DiscoveryRequest::new(response.type_url.clone())
                .with_names(names)
                .nack(response, message),
        )
        .await;
    }

    fn current_names(&self, type_url: &str) -> Vec<String> {
        self.names.get(type_url).cloned().unwrap_or_default()
    }

    /// Next response, failing the test after [`RESPONSE_TIMEOUT`].
    pub async fn recv(&mut self) -> DiscoveryResponse {
        match self.next(RESPONSE_TIMEOUT).await {
            Some(Ok(response)) => response,
            Some(Err(status)) => panic!("{}: stream failed: {status}", self.node.id),
            None => panic!("{}: stream ended", self.node.id),
        }
    }

    /// Next `count` responses.
    pub async fn recv_many(&mut self, count: usize) -> Vec<DiscoveryResponse> {
        let mut responses = Vec::with_capacity(count);
        for _ in 0..count {
            responses.push(self.recv().await);
        }
        responses
    }

    /// Next item, expected to be a stream error.
    pub async fn recv_status(&mut self) -> Status {
        match self.next(RESPONSE_TIMEOUT).await {
            Some(Err(status)) => status,
            Some(Ok(response)) => panic!("expected an error, got {response:?}"),
            None => panic!("{}: stream ended without status", self.node.id),
        }
    }

    /// Assert nothing arrives within `period`.
    pub async fn expect_none(&mut self, period: Duration) {
        if let Ok(item) = timeout(period, self.responses.next()).await {
            panic!("{}: unexpected item {item:?}", self.node.id);
        }
    }

    /// Assert the stream ends.
    pub async fn expect_closed(&mut self) {
        loop {
            match self.next(RESPONSE_TIMEOUT).await {
                None => return,
                Some(Err(_)) => continue,
                Some(Ok(response)) => {
                    panic!("{}: expected close, got {response:?}", self.node.id)
                }
            }
        }
    }

    async fn next(&mut self, wait: Duration) -> Option<Result<DiscoveryResponse, Status>> {
        match timeout(wait, self.responses.next()).await {
            Ok(item) => item,
            Err(_) => panic!("{}: timed out after {wait:?}", self.node.id),
        }
    }
}

/// A server listening on a local port.
pub struct GrpcServer {
    /// The in-memory environment.
    pub env: Arc<MemEnvironment>,
    /// The server, shared with its serving task.
    pub server: Arc<AdsServer>,
    /// Bound address.
    pub addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: JoinHandle<Result<(), tonic::transport::Error>>,
}

impl GrpcServer {
    /// Build a server over a fresh mesh and serve it on a free port.
    pub async fn start() -> anyhow::Result<Self> {
        let mesh = TestMesh::with_builder(|builder| {
            builder
                .grace_period(Duration::from_secs(2))
                .control_plane_id("meshsync-test")
        });
        let addr = free_port().await?;
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let TestMesh { env, server } = mesh;
        let server = Arc::new(server);
        let serving = Arc::clone(&server);
        let handle =
            tokio::spawn(async move { serving.serve_with_shutdown(addr, shutdown_rx).await });

        wait_listening(addr).await?;
        info!(addr = %addr, "test server started");
        Ok(Self {
            env,
            server,
            addr,
            shutdown_tx: Some(shutdown_tx),
            handle,
        })
    }

    /// Connect a channel to the server.
    pub async fn channel(&self) -> anyhow::Result<Channel> {
        Ok(Channel::from_shared(format!("http://{}", self.addr))?
            .connect()
            .await?)
    }

    /// Open a v3 ADS stream for a proxy in `namespace`.
    pub async fn proxy(&self, pod: &str, namespace: &str) -> anyhow::Result<TestProxy> {
        self.proxy_on::<V3Transport>(pod, namespace).await
    }

    /// Open an ADS stream on transport `V`.
    pub async fn proxy_on<V: AdsTransport>(
        &self,
        pod: &str,
        namespace: &str,
    ) -> anyhow::Result<TestProxy> {
        let path = format!("/{}/StreamAggregatedResources", V::SERVICE_NAME);
        let (tx, responses) = open_stream(self.channel().await?, &path).await?;
        Ok(TestProxy::new(
            Node::new(node_id(pod, namespace)),
            tx,
            responses,
        ))
    }

    /// Signal shutdown and wait for the server to stop.
    pub async fn stop(mut self) -> anyhow::Result<()> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        timeout(Duration::from_secs(10), self.handle).await???;
        Ok(())
    }
}

/// Open a raw ADS stream on `path`.
pub async fn open_stream(
    channel: Channel,
    path: &str,
) -> anyhow::Result<(
    mpsc::Sender<DiscoveryRequest>,
    BoxStream<'static, Result<DiscoveryResponse, Status>>,
)> {
    let mut grpc = tonic::client::Grpc::new(channel);
    grpc.ready().await?;

    let (tx, rx) = mpsc::channel(32);
    let codec: tonic::codec::ProstCodec<DiscoveryRequest, DiscoveryResponse> =
        tonic::codec::ProstCodec::default();
    let path = http::uri::PathAndQuery::try_from(path)?;
    let response = grpc
        .streaming(tonic::Request::new(ReceiverStream::new(rx)), path, codec)
        .await?;
    Ok((tx, response.into_inner().boxed()))
}

/// Paths of the two ADS transports.
pub fn transport_paths() -> [String; 2] {
    [
        format!("/{}/StreamAggregatedResources", V2Transport::SERVICE_NAME),
        format!("/{}/StreamAggregatedResources", V3Transport::SERVICE_NAME),
    ]
}

async fn free_port() -> anyhow::Result<SocketAddr> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    Ok(listener.local_addr()?)
}

async fn wait_listening(addr: SocketAddr) -> anyhow::Result<()> {
    for _ in 0..100 {
        if tokio::net::TcpStream::connect(addr).await.is_ok() {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    anyhow::bail!("server at {addr} never started listening")
}
