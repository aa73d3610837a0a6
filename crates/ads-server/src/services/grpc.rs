//! Tonic service binding for `StreamAggregatedResources`.
//!
//! One binding serves both `envoy.service.discovery.v2` and `.v3`: the
//! request and response messages share their wire layout, so only the
//! service name in the route differs. The transport version does not
//! constrain which resource schema a stream may use.

use std::marker::PhantomData;
use std::sync::Arc;
use std::task::{Context, Poll};

use tonic::codegen::{Body, BoxFuture, Service, StdError};

use crate::proto::{DiscoveryRequest, DiscoveryResponse};

use super::ads::AggregatedDiscoveryService;

const STREAM_METHOD: &str = "/StreamAggregatedResources";

/// An ADS transport version.
pub trait AdsTransport: Send + Sync + 'static {
    /// Fully qualified gRPC service name.
    const SERVICE_NAME: &'static str;
}

/// `envoy.service.discovery.v2.AggregatedDiscoveryService`
#[derive(Debug, Clone, Copy)]
pub struct V2Transport;

impl AdsTransport for V2Transport {
    const SERVICE_NAME: &'static str = "envoy.service.discovery.v2.AggregatedDiscoveryService";
}

/// `envoy.service.discovery.v3.AggregatedDiscoveryService`
#[derive(Debug, Clone, Copy)]
pub struct V3Transport;

impl AdsTransport for V3Transport {
    const SERVICE_NAME: &'static str = "envoy.service.discovery.v3.AggregatedDiscoveryService";
}

/// gRPC server for an [`AggregatedDiscoveryService`] on transport `V`.
///
/// Delta ADS is answered with `UNIMPLEMENTED`.
pub struct AggregatedDiscoveryServiceServer<T, V> {
    inner: Arc<T>,
    _transport: PhantomData<fn() -> V>,
}

impl<T, V> AggregatedDiscoveryServiceServer<T, V> {
    /// Wrap a service.
    pub fn new(inner: T) -> Self {
        Self::from_arc(Arc::new(inner))
    }

    /// Wrap a shared service.
    pub fn from_arc(inner: Arc<T>) -> Self {
        Self {
            inner,
            _transport: PhantomData,
        }
    }
}

impl<T, V> Clone for AggregatedDiscoveryServiceServer<T, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            _transport: PhantomData,
        }
    }
}

impl<T, V: AdsTransport> std::fmt::Debug for AggregatedDiscoveryServiceServer<T, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AggregatedDiscoveryServiceServer")
            .field("service", &V::SERVICE_NAME)
            .finish()
    }
}

struct StreamAggregatedResourcesSvc<T>(Arc<T>);

impl<T: AggregatedDiscoveryService> tonic::server::StreamingService<DiscoveryRequest>
    for StreamAggregatedResourcesSvc<T>
{
    type Response = DiscoveryResponse;
    type ResponseStream = T::StreamAggregatedResourcesStream;
    type Future = BoxFuture<tonic::Response<Self::ResponseStream>, tonic::Status>;

    fn call(
        &mut self,
        request: tonic::Request<tonic::Streaming<DiscoveryRequest>>,
    ) -> Self::Future {
        let inner = Arc::clone(&self.0);
        Box::pin(async move { inner.stream_aggregated_resources(request).await })
    }
}

impl<T, V, B> Service<http::Request<B>> for AggregatedDiscoveryServiceServer<T, V>
where
    T: AggregatedDiscoveryService,
    V: AdsTransport,
    B: Body + Send + 'static,
    B::Error: Into<StdError> + Send + 'static,
{
    type Response = http::Response<tonic::body::BoxBody>;
    type Error = std::convert::Infallible;
    type Future = BoxFuture<Self::Response, Self::Error>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: http::Request<B>) -> Self::Future {
        let is_stream = req
            .uri()
            .path()
            .strip_prefix('/')
            .and_then(|path| path.strip_prefix(V::SERVICE_NAME))
            == Some(STREAM_METHOD);

        if is_stream {
            let inner = Arc::clone(&self.inner);
            return Box::pin(async move {
                let method = StreamAggregatedResourcesSvc(inner);
                let codec = tonic::codec::ProstCodec::default();
                let mut grpc = tonic::server::Grpc::new(codec);
                Ok(grpc.streaming(method, req).await)
            });
        }

        Box::pin(async move {
            let mut response = http::Response::new(tonic::body::empty_body());
            let headers = response.headers_mut();
            headers.insert(
                tonic::Status::GRPC_STATUS,
                (tonic::Code::Unimplemented as i32).into(),
            );
            headers.insert(
                http::header::CONTENT_TYPE,
                tonic::metadata::GRPC_CONTENT_TYPE,
            );
            Ok(response)
        })
    }
}

impl<T, V: AdsTransport> tonic::server::NamedService for AggregatedDiscoveryServiceServer<T, V> {
    const NAME: &'static str = V::SERVICE_NAME;
}
