//! Fan-out under many connections.

use futures::future::join_all;

use meshsync::prelude::*;

use crate::harness::{kind_of, urls, version_of, TestMesh, TestProxy, OPEN_NS, QUIET_PERIOD, SCOPED_NS};

const PROXIES: usize = 100;

async fn connect_all(mesh: &TestMesh) -> Vec<TestProxy> {
    let mut proxies = Vec::with_capacity(PROXIES);
    for i in 0..PROXIES {
        let namespace = if i % 2 == 0 { SCOPED_NS } else { OPEN_NS };
        let mut proxy = mesh.proxy(&format!("pod-{i}"), namespace);
        proxy.subscribe(urls::CDS).await;
        proxy.subscribe(urls::LDS).await;
        proxies.push(proxy);
    }
    mesh.wait_synced().await;
    proxies
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn full_push_reaches_all_connections() {
    let mesh = TestMesh::new();
    let mut proxies = connect_all(&mesh).await;

    let summary = mesh.server.push_all();
    assert_eq!(summary.delivered, PROXIES);
    let version = summary.version.unwrap();

    let received = join_all(proxies.iter_mut().map(|proxy| async move {
        let pushed = proxy.recv_many(2).await;
        (kind_of(&pushed[0]), kind_of(&pushed[1]), version_of(&pushed[1]))
    }))
    .await;
    for (first, second, pushed_version) in received {
        assert_eq!(first, ResourceKind::Cluster);
        assert_eq!(second, ResourceKind::Listener);
        assert_eq!(pushed_version, version);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn scoped_push_reaches_only_proxies_in_scope() {
    let mesh = TestMesh::new();
    let mut proxies = connect_all(&mesh).await;

    let key = mesh.add_service("billing.finance.svc.cluster.local", "finance", 8443, 0);
    let summary = mesh.notify([key]);
    assert_eq!(summary.delivered, PROXIES / 2);
    assert_eq!(summary.skipped, PROXIES / 2);

    join_all(proxies.iter_mut().enumerate().map(|(i, proxy)| async move {
        if i % 2 == 0 {
            proxy.expect_none(QUIET_PERIOD).await;
        } else {
            assert_eq!(kind_of(&proxy.recv().await), ResourceKind::Listener);
        }
    }))
    .await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn versions_stay_monotonic_across_bursts() {
    let mesh = TestMesh::new();
    let mut proxy = mesh.proxy("watcher", OPEN_NS);
    proxy.subscribe(urls::CDS).await;
    mesh.wait_synced().await;

    let mut last = None;
    for _ in 0..20 {
        let version = mesh.server.push_all().version;
        assert!(version > last);
        last = version;
    }

    // Bursts may coalesce, but the newest version always arrives.
    let mut seen = Vec::new();
    loop {
        let response = proxy.recv().await;
        seen.push(version_of(&response));
        if Some(version_of(&response)) == last {
            break;
        }
    }
    assert!(seen.windows(2).all(|pair| pair[0] < pair[1]));
}
