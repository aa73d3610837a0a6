//! Push scheduling.
//!
//! The scheduler turns a [`PushRequest`] into per-connection work. It never
//! generates resources and never waits on a connection: it computes which
//! kinds each connection needs, merges them into the connection's pending
//! slot and moves on.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashSet;
use tracing::{debug, info};

use ads_core::{
    ConfigKey, ConfigKind, PushRequest, PushVersion, ResourceKind, ResourceKindSet,
    ScopeResolver, ServiceDirectory, VersionAuthority,
};

use crate::metrics::AdsMetrics;
use crate::registry::ConnectionRegistry;

/// Outcome of one scheduled push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PushSummary {
    /// Version of the push epoch. `None` if the request asked for nothing.
    pub version: Option<PushVersion>,
    /// Connections that had work queued.
    pub delivered: usize,
    /// Connections outside the push's scope.
    pub skipped: usize,
    /// Connections that were closing.
    pub dropped: usize,
}

impl PushSummary {
    fn empty() -> Self {
        Self {
            version: None,
            delivered: 0,
            skipped: 0,
            dropped: 0,
        }
    }
}

/// Fans push requests out to live connections.
pub struct PushScheduler {
    registry: Arc<ConnectionRegistry>,
    authority: Arc<VersionAuthority>,
    scope: Arc<dyn ScopeResolver>,
    directory: Arc<dyn ServiceDirectory>,
    known_services: DashSet<ConfigKey>,
    metrics: AdsMetrics,
}

impl std::fmt::Debug for PushScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushScheduler")
            .field("connections", &self.registry.len())
            .field("known_services", &self.known_services.len())
            .finish()
    }
}

impl PushScheduler {
    /// Create a scheduler. Known services are seeded from `directory`.
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        authority: Arc<VersionAuthority>,
        scope: Arc<dyn ScopeResolver>,
        directory: Arc<dyn ServiceDirectory>,
        metrics: AdsMetrics,
    ) -> Self {
        let known_services = directory.services().into_iter().collect();
        Self {
            registry,
            authority,
            scope,
            directory,
            known_services,
            metrics,
        }
    }

    /// Schedule a push. Returns once every affected connection has work
    /// queued; the responses themselves are produced by the connection
    /// tasks.
    pub fn schedule(&self, request: PushRequest) -> PushSummary {
        if request.is_empty() {
            return PushSummary::empty();
        }

        let mut plan: Vec<(ConfigKey, ResourceKindSet)> = request
            .configs_updated
            .into_iter()
            .map(|key| {
                let kinds = self.affected_kinds(&key);
                (key, kinds)
            })
            .collect();
        plan.retain(|(_, kinds)| !kinds.is_empty());
        if request.full {
            self.reseed_known_services();
        }

        if !request.full && plan.is_empty() {
            debug!("push request affects no resource kinds");
            return PushSummary::empty();
        }

        let version = self.authority.next_version();
        let mut summary = PushSummary {
            version: Some(version),
            ..PushSummary::empty()
        };

        for handle in self.registry.all() {
            let kinds = if request.full {
                ResourceKindSet::all()
            } else {
                let ctx = handle.context();
                plan.iter()
                    .filter(|(key, _)| self.scope.in_scope(ctx, key))
                    .fold(ResourceKindSet::empty(), |acc, (_, kinds)| acc.union(*kinds))
            };

            if kinds.is_empty() {
                summary.skipped += 1;
                continue;
            }

            if handle.enqueue_push(version, kinds, request.full) {
                summary.delivered += 1;
            } else {
                debug!(
                    connection = %handle.id(),
                    node = handle.node_id(),
                    version = %version,
                    "connection closing, push dropped"
                );
                self.metrics.record_push_dropped();
                summary.dropped += 1;
            }
        }

        self.metrics.record_push(request.full, summary.delivered);
        info!(
            version = %version,
            full = request.full,
            configs = plan.len(),
            delivered = summary.delivered,
            skipped = summary.skipped,
            dropped = summary.dropped,
            "push scheduled"
        );
        summary
    }

    /// Replace the known services with what the directory holds now. A full
    /// push regenerates listeners for every service, so later changes to
    /// any of them are instance changes.
    fn reseed_known_services(&self) {
        let current: HashSet<ConfigKey> = self.directory.services().into_iter().collect();
        self.known_services.retain(|key| current.contains(key));
        for key in current {
            self.known_services.insert(key);
        }
    }

    /// Resource kinds a config change affects.
    ///
    /// For services this also reconciles the set of known services, so it
    /// must run for every key of every request.
    fn affected_kinds(&self, key: &ConfigKey) -> ResourceKindSet {
        let mut kinds = ResourceKindSet::empty();
        match key.kind {
            ConfigKind::ServiceEntry => match self.directory.service(key) {
                Some(service) => {
                    if service.instances > 0 {
                        kinds.insert(ResourceKind::Endpoint);
                    }
                    if self.known_services.insert(key.clone()) {
                        kinds.insert(ResourceKind::Listener);
                    }
                }
                None => {
                    if self.known_services.remove(key).is_some() {
                        kinds.insert(ResourceKind::Listener);
                    }
                }
            },
            ConfigKind::VirtualService => kinds.insert(ResourceKind::Listener),
            ConfigKind::DestinationRule => kinds.insert(ResourceKind::Cluster),
            ConfigKind::Sidecar | ConfigKind::Gateway => kinds = ResourceKindSet::all(),
        }
        kinds
    }
}
