//! gRPC health reporting for the ADS services.
//!
//! Wraps `tonic-health` so the server can flip every ADS service between
//! serving and not serving around startup and drain.

use std::sync::Arc;

use tokio::sync::Mutex;
use tonic_health::server::HealthReporter;
use tonic_health::ServingStatus;

use crate::services::{AdsTransport, V2Transport, V3Transport};

/// Health reporter for the ADS server.
#[derive(Clone)]
pub struct HealthService {
    reporter: Arc<Mutex<HealthReporter>>,
}

impl std::fmt::Debug for HealthService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthService").finish()
    }
}

impl HealthService {
    /// Create the reporter and the tonic service to mount.
    pub fn new() -> (
        Self,
        tonic_health::pb::health_server::HealthServer<impl tonic_health::pb::health_server::Health>,
    ) {
        let (reporter, service) = tonic_health::server::health_reporter();
        (
            Self {
                reporter: Arc::new(Mutex::new(reporter)),
            },
            service,
        )
    }

    /// Mark every ADS service as serving.
    pub async fn set_all_serving(&self) {
        self.set_all(ServingStatus::Serving).await;
    }

    /// Mark every ADS service as not serving.
    pub async fn set_all_not_serving(&self) {
        self.set_all(ServingStatus::NotServing).await;
    }

    async fn set_all(&self, status: ServingStatus) {
        let mut reporter = self.reporter.lock().await;
        for service in Self::service_names() {
            reporter.set_service_status(*service, status).await;
        }
    }

    /// Names reported to health checkers: both ADS transports plus the
    /// server as a whole (empty name).
    pub fn service_names() -> &'static [&'static str] {
        &[V2Transport::SERVICE_NAME, V3Transport::SERVICE_NAME, ""]
    }
}
