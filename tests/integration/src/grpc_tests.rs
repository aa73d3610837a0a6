//! Scenarios over a real gRPC transport.

use std::time::Duration;

use tonic_health::pb::health_check_response::ServingStatus;
use tonic_health::pb::health_client::HealthClient;
use tonic_health::pb::HealthCheckRequest;

use meshsync::prelude::*;
use meshsync::server::services::AdsTransport;
use meshsync::server::{V2Transport, V3Transport};

use crate::harness::{kind_of, open_stream, transport_paths, urls, GrpcServer, OPEN_NS, QUIET_PERIOD};

#[tokio::test]
async fn v3_transport_serves_subscriptions() {
    let server = GrpcServer::start().await.unwrap();
    let mut proxy = server.proxy("p", OPEN_NS).await.unwrap();

    let response = proxy.subscribe(urls::CDS).await;
    assert_eq!(response.type_url, urls::CDS);
    assert_eq!(
        response.control_plane.map(|cp| cp.identifier).as_deref(),
        Some("meshsync-test")
    );
    proxy.expect_none(QUIET_PERIOD).await;

    server.stop().await.unwrap();
}

#[tokio::test]
async fn v2_transport_serves_both_schemas() {
    let server = GrpcServer::start().await.unwrap();
    let mut proxy = server.proxy_on::<V2Transport>("p", OPEN_NS).await.unwrap();

    assert_eq!(proxy.subscribe(urls::V2_LDS).await.type_url, urls::V2_LDS);
    assert_eq!(proxy.subscribe(urls::CDS).await.type_url, urls::CDS);

    server.stop().await.unwrap();
}

#[tokio::test]
async fn pushes_travel_over_the_wire() {
    let server = GrpcServer::start().await.unwrap();
    let mut proxy = server.proxy("p", OPEN_NS).await.unwrap();
    proxy.subscribe(urls::EDS).await;
    proxy.subscribe(urls::LDS).await;
    wait_synced(&server.server).await;

    let key = server
        .env
        .registry()
        .add_service(Service::new("ratings.web.svc.cluster.local", OPEN_NS, [9080]));
    server.env.registry().add_instance(
        "ratings.web.svc.cluster.local",
        ServiceInstance::new("10.4.0.1", 9080),
    );
    let summary = server.server.notify(PushRequest::incremental([key]));
    assert_eq!(summary.delivered, 1);

    let pushed = proxy.recv_many(2).await;
    assert_eq!(kind_of(&pushed[0]), ResourceKind::Endpoint);
    assert_eq!(kind_of(&pushed[1]), ResourceKind::Listener);
    assert_eq!(pushed[0].version_info, summary.version.unwrap().to_string());

    server.stop().await.unwrap();
}

async fn wait_synced(server: &AdsServer) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !server.sync_status().iter().all(ConnectionStatus::is_synced) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn health_reports_serving_for_both_transports() {
    let server = GrpcServer::start().await.unwrap();
    let mut client = HealthClient::new(server.channel().await.unwrap());

    for service in [V2Transport::SERVICE_NAME, V3Transport::SERVICE_NAME, ""] {
        let response = client
            .check(HealthCheckRequest {
                service: service.to_string(),
            })
            .await
            .unwrap()
            .into_inner();
        assert_eq!(response.status, ServingStatus::Serving as i32, "{service}");
    }

    server.stop().await.unwrap();
}

#[tokio::test]
async fn delta_ads_is_unimplemented() {
    let server = GrpcServer::start().await.unwrap();
    let channel = server.channel().await.unwrap();

    let path = format!("/{}/DeltaAggregatedResources", V3Transport::SERVICE_NAME);
    let error = open_stream(channel, &path).await.err().unwrap();
    let status = error.downcast_ref::<tonic::Status>().unwrap();
    assert_eq!(status.code(), tonic::Code::Unimplemented);

    server.stop().await.unwrap();
}

#[tokio::test]
async fn both_transport_paths_accept_streams() {
    let server = GrpcServer::start().await.unwrap();
    for path in transport_paths() {
        let (tx, mut responses) = open_stream(server.channel().await.unwrap(), &path)
            .await
            .unwrap();
        tx.send(
            meshsync::server::DiscoveryRequest::new(urls::LDS)
                .with_node(meshsync::server::Node::new("router~10.0.0.9~gw.web~web.svc.cluster.local")),
        )
        .await
        .unwrap();
        let response = tokio::time::timeout(Duration::from_secs(5), futures::StreamExt::next(&mut responses))
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(response.type_url, urls::LDS);
    }
    server.stop().await.unwrap();
}

#[tokio::test]
async fn stopping_the_server_ends_streams() {
    let server = GrpcServer::start().await.unwrap();
    let mut proxy = server.proxy("p", OPEN_NS).await.unwrap();
    proxy.subscribe(urls::CDS).await;

    server.stop().await.unwrap();
    proxy.expect_closed().await;
}
