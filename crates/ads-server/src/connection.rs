//! Shared side of a connection.
//!
//! The connection task owns the protocol engine and its subscriptions. What
//! other tasks may touch lives in [`ConnectionHandle`]: the pending-push
//! slot the scheduler merges into, the wakeup that goes with it, the close
//! signal and the last published subscription status.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{watch, Notify};

use ads_core::{ConnectionContext, ConnectionId, NodeHash, PushVersion, ResourceKindSet};

use crate::stream::StreamStats;
use crate::subscription::SubscriptionStatus;

/// Work queued for a connection by the push scheduler.
///
/// Pushes that arrive before the connection task runs are coalesced: the
/// highest version wins and the kind sets are merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingPush {
    /// Version to stamp on the responses.
    pub version: PushVersion,
    /// Kinds to regenerate.
    pub kinds: ResourceKindSet,
    /// Whether any merged push was a full push.
    pub full: bool,
}

impl PendingPush {
    fn merge(&mut self, other: PendingPush) {
        self.version = self.version.max(other.version);
        self.kinds = self.kinds.union(other.kinds);
        self.full |= other.full;
    }
}

/// Handle to a live connection, shared by the registry and the scheduler.
#[derive(Debug)]
pub struct ConnectionHandle {
    context: Arc<ConnectionContext>,
    pending: Mutex<Option<PendingPush>>,
    wakeup: Notify,
    closed: watch::Sender<bool>,
    subscriptions: watch::Sender<Vec<SubscriptionStatus>>,
    stats: StreamStats,
}

impl ConnectionHandle {
    /// Create a handle for an identified proxy.
    pub fn new(context: ConnectionContext) -> Self {
        let (closed, _) = watch::channel(false);
        let (subscriptions, _) = watch::channel(Vec::new());
        Self {
            context: Arc::new(context),
            pending: Mutex::new(None),
            wakeup: Notify::new(),
            closed,
            subscriptions,
            stats: StreamStats::new(),
        }
    }

    /// Connection id.
    #[inline]
    pub fn id(&self) -> ConnectionId {
        self.context.connection_id()
    }

    /// Node id of the proxy.
    #[inline]
    pub fn node_id(&self) -> &str {
        self.context.node_id()
    }

    /// Hash of the node id.
    #[inline]
    pub fn node_hash(&self) -> NodeHash {
        self.context.node_hash()
    }

    /// Identity of the proxy.
    #[inline]
    pub fn context(&self) -> &Arc<ConnectionContext> {
        &self.context
    }

    /// Stream counters.
    #[inline]
    pub fn stats(&self) -> &StreamStats {
        &self.stats
    }

    /// Queue a push and wake the connection task.
    ///
    /// Never blocks. Returns `false` if the connection is closed, in which
    /// case nothing is queued.
    pub fn enqueue_push(&self, version: PushVersion, kinds: ResourceKindSet, full: bool) -> bool {
        if self.is_closed() {
            return false;
        }
        let push = PendingPush {
            version,
            kinds,
            full,
        };
        {
            let mut slot = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            match slot.as_mut() {
                Some(existing) => existing.merge(push),
                None => *slot = Some(push),
            }
        }
        self.wakeup.notify_one();
        true
    }

    /// Take the queued push, if any.
    pub fn take_pending(&self) -> Option<PendingPush> {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Wait until a push has been queued.
    pub async fn push_queued(&self) {
        self.wakeup.notified().await;
    }

    /// Close the connection. Idempotent; returns `true` on the first call.
    pub fn close(&self) -> bool {
        !self.closed.send_replace(true)
    }

    /// Whether the connection is closed or closing.
    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Wait until the connection is closed.
    pub async fn closed(&self) {
        let mut rx = self.closed.subscribe();
        let _ = rx.wait_for(|closed| *closed).await.map(|_| ());
    }

    /// Publish the connection task's current subscriptions.
    pub fn publish_subscriptions(&self, statuses: Vec<SubscriptionStatus>) {
        self.subscriptions.send_replace(statuses);
    }

    /// Last published subscriptions.
    pub fn subscriptions(&self) -> Vec<SubscriptionStatus> {
        self.subscriptions.borrow().clone()
    }
}

/// Sync status of one connection.
#[derive(Debug, Clone)]
pub struct ConnectionStatus {
    /// Connection id.
    pub connection_id: ConnectionId,
    /// Node id of the proxy.
    pub node_id: String,
    /// Latest version issued by the server when the status was taken.
    pub current_version: PushVersion,
    /// Per-kind subscription state.
    pub subscriptions: Vec<SubscriptionStatus>,
    /// Requests received.
    pub requests: u64,
    /// Responses sent.
    pub responses: u64,
}

impl ConnectionStatus {
    /// Capture the status of a connection.
    pub fn capture(handle: &ConnectionHandle, current_version: PushVersion) -> Self {
        Self {
            connection_id: handle.id(),
            node_id: handle.node_id().to_string(),
            current_version,
            subscriptions: handle.subscriptions(),
            requests: handle.stats().requests(),
            responses: handle.stats().responses(),
        }
    }

    /// Largest acked-version lag across subscriptions.
    pub fn max_lag(&self) -> u64 {
        self.subscriptions
            .iter()
            .map(|s| s.version_lag(self.current_version))
            .max()
            .unwrap_or(0)
    }

    /// Whether every subscription accepted its latest response.
    pub fn is_synced(&self) -> bool {
        self.subscriptions.iter().all(SubscriptionStatus::is_synced)
    }
}
