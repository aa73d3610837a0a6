//! Simple ADS Server Example
//!
//! This example runs an ADS server over an in-memory mesh that:
//! - Registers a few services across two namespaces
//! - Restricts one namespace with a `Sidecar`
//! - Scales a service every 30 seconds and pushes the change
//! - Logs per-connection sync status every minute
//!
//! Run with:
//! ```bash
//! RUST_LOG=info,ads_server=debug cargo run -p simple-server
//! ```
//!
//! Then point an Envoy bootstrap with an ADS cluster at port 15010.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use meshsync::prelude::*;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Configuration for the example server.
struct Config {
    /// Address to listen on.
    listen_addr: String,
    /// Number of sample services per namespace.
    services_per_namespace: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "[::]:15010".to_string(),
            services_per_namespace: 3,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    info!("Starting simple ADS server example");
    info!("{}", meshsync::version::version_string());

    let config = Config::default();
    let env = MemEnvironment::new().shared();
    setup_sample_mesh(&env, &config);

    let server = Arc::new(
        AdsServer::builder()
            .environment(env.clone())
            .control_plane_id("simple-server")
            .grace_period(Duration::from_secs(5))
            .build()
            .context("building ADS server")?,
    );

    info!("ADS server configured");
    info!("  Max connections: {:?}", server.config().max_connections);
    info!("  Health checks: {}", server.config().enable_health);

    // Periodically scale a service and push the change.
    let scaler = Arc::clone(&server);
    let scaler_env = Arc::clone(&env);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(30));
        interval.tick().await;
        let host = "svc-0.bookinfo.svc.cluster.local";
        let mut replicas = 1u8;

        loop {
            interval.tick().await;
            replicas = replicas % 5 + 1;
            let instances = (1..=replicas)
                .map(|i| ServiceInstance::new(format!("10.10.0.{i}"), 9080))
                .collect();
            scaler_env.registry().set_instances(host, instances);

            let summary = scaler.notify(PushRequest::incremental([ConfigKey::service(
                host, "bookinfo",
            )]));
            info!(
                replicas,
                version = ?summary.version,
                delivered = summary.delivered,
                "scaled service"
            );
        }
    });

    // Report sync status periodically.
    let reporter = Arc::clone(&server);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));

        loop {
            interval.tick().await;
            for status in reporter.sync_status() {
                info!(
                    connection = %status.connection_id,
                    node = %status.node_id,
                    synced = status.is_synced(),
                    lag = status.max_lag(),
                    "sync status"
                );
            }
        }
    });

    let addr: SocketAddr = config
        .listen_addr
        .parse()
        .with_context(|| format!("invalid listen address {}", config.listen_addr))?;
    info!("Press Ctrl+C to shutdown");
    server.serve(addr).await.context("serving ADS")?;

    info!("Shut down");
    Ok(())
}

/// Register sample services and a `Sidecar`.
fn setup_sample_mesh(env: &MemEnvironment, config: &Config) {
    for namespace in ["bookinfo", "payments"] {
        for i in 0..config.services_per_namespace {
            let host = format!("svc-{i}.{namespace}.svc.cluster.local");
            env.registry()
                .add_service(Service::new(host.clone(), namespace, [9080]));
            env.registry()
                .add_instance(&host, ServiceInstance::new(format!("10.20.{i}.1"), 9080));
        }
        info!(namespace, services = config.services_per_namespace, "registered services");
    }

    // Payments proxies only see their own namespace.
    env.configs().create(
        "default",
        "payments",
        ConfigSpec::Sidecar {
            egress: vec!["./*".into()],
        },
    );
    info!("Restricted payments namespace with a Sidecar");
}
