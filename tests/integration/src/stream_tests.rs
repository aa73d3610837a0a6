//! Stream lifecycle and protocol scenarios.

use std::time::Duration;

use meshsync::prelude::*;
use meshsync::server::DiscoveryRequest;

use crate::harness::{
    kind_of, names, urls, version_of, TestMesh, OPEN_NS, QUIET_PERIOD, SCOPED_NS,
};

#[tokio::test]
async fn overlapping_streams_survive_the_older_closing() {
    let mesh = TestMesh::new();
    let mut older = mesh.proxy("reviews-v1", SCOPED_NS);
    let mut newer = mesh.proxy("reviews-v1", SCOPED_NS);
    older.subscribe(urls::CDS).await;
    newer.subscribe(urls::CDS).await;
    mesh.wait_connections(2).await;
    assert_eq!(mesh.server.registry().by_node(newer.node_id()).len(), 2);

    drop(older);
    mesh.wait_connections(1).await;
    assert_eq!(mesh.server.registry().by_node(newer.node_id()).len(), 1);

    mesh.server.push_all();
    assert_eq!(kind_of(&newer.recv().await), ResourceKind::Cluster);
}

#[tokio::test]
async fn reconnect_with_old_nonce_gets_fresh_response() {
    let mesh = TestMesh::new();
    let mut first = mesh.proxy("reviews-v1", OPEN_NS);
    let previous = first.subscribe(urls::CDS).await;
    drop(first);
    mesh.wait_connections(0).await;
    mesh.server.push_all();

    let mut second = mesh.proxy("reviews-v1", OPEN_NS);
    second
        .send(DiscoveryRequest::new(urls::CDS).with_nonce(previous.nonce.clone(), previous.version_info.clone()))
        .await;
    let fresh = second.recv().await;
    assert_ne!(fresh.nonce, previous.nonce);
    assert!(version_of(&fresh) > version_of(&previous));
    assert_eq!(names(&fresh), names(&previous));
}

#[tokio::test]
async fn route_subscription_narrows_and_widens() {
    let mesh = TestMesh::new();
    mesh.add_service("reviews.app.svc.cluster.local", SCOPED_NS, 9080, 1);
    let mut proxy = mesh.proxy("productpage", SCOPED_NS);

    let both = proxy.request(urls::RDS, &["8080", "9080"]).await;
    assert_eq!(names(&both), vec!["8080", "9080"]);

    let narrowed = proxy.change_names(&both, &["8080"]).await;
    assert_eq!(names(&narrowed), vec!["8080"]);

    let widened = proxy.change_names(&narrowed, &["8080", "9080"]).await;
    assert_eq!(names(&widened), vec!["8080", "9080"]);
    proxy.ack(&widened).await;
    proxy.expect_none(QUIET_PERIOD).await;
}

#[tokio::test]
async fn endpoints_follow_requested_clusters() {
    let mesh = TestMesh::new();
    let mut proxy = mesh.proxy("productpage", OPEN_NS);
    let cluster = "outbound|8080||base.shared.svc.cluster.local";

    let response = proxy.request(urls::EDS, &[cluster, "outbound|1||missing"]).await;
    assert_eq!(names(&response), vec![cluster]);
}

#[tokio::test]
async fn ack_twice_produces_nothing() {
    let mesh = TestMesh::new();
    let mut proxy = mesh.proxy("p", OPEN_NS);
    let response = proxy.subscribe(urls::LDS).await;
    proxy.ack(&response).await;
    proxy.expect_none(QUIET_PERIOD).await;

    let status = &mesh.server.sync_status()[0];
    assert!(status.is_synced());
    assert_eq!(status.subscriptions[0].state, SubscriptionState::Acked);
}

#[tokio::test]
async fn nack_keeps_last_accepted_version() {
    let mesh = TestMesh::new();
    let mut proxy = mesh.proxy("p", OPEN_NS);
    let accepted = proxy.subscribe(urls::CDS).await;
    mesh.wait_synced().await;

    mesh.server.push_all();
    let rejected = proxy.recv().await;
    proxy.nack(&rejected, "cluster validation failed").await;
    proxy.expect_none(QUIET_PERIOD).await;

    let subscription = mesh.server.sync_status()[0].subscriptions[0].clone();
    assert_eq!(subscription.state, SubscriptionState::Nacked);
    assert_eq!(subscription.last_acked_version, Some(version_of(&accepted)));
    assert_eq!(subscription.last_nack.as_deref(), Some("cluster validation failed"));

    // A later push is still delivered.
    let summary = mesh.server.push_all();
    let next = proxy.recv().await;
    assert_eq!(Some(version_of(&next)), summary.version);
}

#[tokio::test]
async fn schema_mismatch_terminates_only_offending_stream() {
    let mesh = TestMesh::new();
    let mut bystander = mesh.proxy("bystander", OPEN_NS);
    bystander.subscribe(urls::CDS).await;

    let mut proxy = mesh.proxy("mixed", OPEN_NS);
    proxy.subscribe(urls::CDS).await;
    proxy.send(DiscoveryRequest::new(urls::V2_CDS)).await;

    let status = proxy.recv_status().await;
    assert_eq!(status.code(), tonic::Code::InvalidArgument);
    proxy.expect_closed().await;

    mesh.wait_connections(1).await;
    mesh.wait_synced().await;
    mesh.server.push_all();
    assert_eq!(kind_of(&bystander.recv().await), ResourceKind::Cluster);
}

#[tokio::test]
async fn kinds_may_use_different_schemas() {
    let mesh = TestMesh::new();
    let mut proxy = mesh.proxy("p", OPEN_NS);
    let clusters = proxy.subscribe(urls::V2_CDS).await;
    let listeners = proxy.subscribe(urls::LDS).await;
    assert_eq!(clusters.type_url, urls::V2_CDS);
    assert_eq!(listeners.type_url, urls::LDS);
    mesh.wait_synced().await;

    mesh.server.push_all();
    let pushed = proxy.recv_many(2).await;
    assert_eq!(pushed[0].type_url, urls::V2_CDS);
    assert_eq!(pushed[1].type_url, urls::LDS);
}

#[tokio::test]
async fn generator_failure_keeps_connection_alive() {
    let mesh = TestMesh::new();
    let mut proxy = mesh.proxy("p", OPEN_NS);
    proxy.subscribe(urls::CDS).await;
    proxy.subscribe(urls::LDS).await;
    mesh.wait_synced().await;

    mesh.env.fail_next(ResourceKind::Cluster, 1);
    mesh.server.push_all();
    // Clusters fail, listeners still go out.
    assert_eq!(kind_of(&proxy.recv().await), ResourceKind::Listener);
    proxy.expect_none(QUIET_PERIOD).await;

    let summary = mesh.server.push_all();
    let pushed = proxy.recv_many(2).await;
    assert_eq!(kind_of(&pushed[0]), ResourceKind::Cluster);
    assert_eq!(Some(version_of(&pushed[0])), summary.version);
    assert_eq!(mesh.server.connection_count(), 1);
}

#[tokio::test]
async fn sync_status_reports_version_lag() {
    let mesh = TestMesh::new();
    let mut proxy = mesh.proxy("p", OPEN_NS);
    proxy.subscribe(urls::CDS).await;
    mesh.wait_synced().await;
    assert_eq!(mesh.server.sync_status()[0].max_lag(), 0);

    mesh.server.push_all();
    let first = proxy.recv().await;
    mesh.server.push_all();
    let second = proxy.recv().await;
    assert!(version_of(&second) > version_of(&first));

    mesh.wait_until(|server| server.sync_status()[0].max_lag() == 2)
        .await;

    proxy.ack(&second).await;
    mesh.wait_synced().await;
    let status = &mesh.server.sync_status()[0];
    assert_eq!(status.max_lag(), 0);
    assert_eq!(status.node_id, proxy.node_id());
    assert!(status.requests >= 3);
    assert_eq!(status.responses, 3);
}

#[tokio::test]
async fn connection_limit_rejects_extra_streams() {
    let mesh = TestMesh::with_builder(|builder| builder.max_connections(1));
    let mut admitted = mesh.proxy("admitted", OPEN_NS);
    admitted.subscribe(urls::CDS).await;

    let mut rejected = mesh.proxy("rejected", OPEN_NS);
    rejected.send(DiscoveryRequest::new(urls::CDS)).await;
    assert_eq!(
        rejected.recv_status().await.code(),
        tonic::Code::ResourceExhausted
    );
    rejected.expect_closed().await;
    assert_eq!(mesh.server.connection_count(), 1);
}

#[tokio::test]
async fn shutdown_drains_connections() {
    let mesh = TestMesh::with_builder(|builder| builder.grace_period(Duration::from_secs(2)));
    let mut a = mesh.proxy("a", OPEN_NS);
    let mut b = mesh.proxy("b", SCOPED_NS);
    a.subscribe(urls::CDS).await;
    b.subscribe(urls::LDS).await;

    assert!(mesh.server.shutdown().await);
    a.expect_closed().await;
    b.expect_closed().await;
    assert_eq!(mesh.server.connection_count(), 0);
    assert_eq!(mesh.server.shutdown_controller().active_connections(), 0);

    // Streams opened after shutdown are refused before any request.
    let mut late = mesh.proxy("late", OPEN_NS);
    assert_eq!(late.recv_status().await.code(), tonic::Code::Unavailable);
}
