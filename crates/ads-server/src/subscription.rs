//! Per-kind subscription state of one connection.

use std::collections::BTreeSet;

use ads_core::{PushVersion, ResourceKind, TypeUrl};

/// Where a subscription stands in the request/response exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    /// Requested, but nothing has been sent yet.
    Requested,
    /// A response was sent and is awaiting ACK or NACK.
    Pending,
    /// The last response was accepted.
    Acked,
    /// The last response was rejected.
    Nacked,
}

/// State of one resource kind on one connection.
///
/// Owned by the connection's protocol engine and never shared.
#[derive(Debug, Clone)]
pub struct Subscription {
    type_url: TypeUrl,
    resource_names: BTreeSet<String>,
    state: SubscriptionState,
    last_sent_version: Option<PushVersion>,
    last_sent_nonce: Option<String>,
    last_acked_version: Option<PushVersion>,
    last_acked_nonce: Option<String>,
    last_nack: Option<String>,
}

impl Subscription {
    /// Open a subscription.
    pub fn new(type_url: TypeUrl, resource_names: BTreeSet<String>) -> Self {
        Self {
            type_url,
            resource_names,
            state: SubscriptionState::Requested,
            last_sent_version: None,
            last_sent_nonce: None,
            last_acked_version: None,
            last_acked_nonce: None,
            last_nack: None,
        }
    }

    /// The type URL the subscription was opened with.
    #[inline]
    pub fn type_url(&self) -> TypeUrl {
        self.type_url
    }

    /// The subscribed kind.
    #[inline]
    pub fn kind(&self) -> ResourceKind {
        self.type_url.kind()
    }

    /// Requested names. Empty means all.
    #[inline]
    pub fn resource_names(&self) -> &BTreeSet<String> {
        &self.resource_names
    }

    /// Current state.
    #[inline]
    pub fn state(&self) -> SubscriptionState {
        self.state
    }

    /// Version of the last response sent.
    #[inline]
    pub fn last_sent_version(&self) -> Option<PushVersion> {
        self.last_sent_version
    }

    /// Nonce of the last response sent.
    #[inline]
    pub fn last_sent_nonce(&self) -> Option<&str> {
        self.last_sent_nonce.as_deref()
    }

    /// Version of the last response the proxy accepted.
    #[inline]
    pub fn last_acked_version(&self) -> Option<PushVersion> {
        self.last_acked_version
    }

    /// Nonce of the last response the proxy accepted.
    #[inline]
    pub fn last_acked_nonce(&self) -> Option<&str> {
        self.last_acked_nonce.as_deref()
    }

    /// Error message of the most recent NACK.
    #[inline]
    pub fn last_nack(&self) -> Option<&str> {
        self.last_nack.as_deref()
    }

    /// Whether `nonce` answers the last response sent.
    pub fn is_response_to(&self, nonce: &str) -> bool {
        self.last_sent_nonce.as_deref() == Some(nonce)
    }

    /// Replace the requested names. Returns whether they changed.
    pub fn update_names(&mut self, names: BTreeSet<String>) -> bool {
        if self.resource_names == names {
            return false;
        }
        self.resource_names = names;
        true
    }

    /// Record a response handed to the proxy.
    pub fn record_sent(&mut self, version: PushVersion, nonce: String) {
        self.last_sent_version = Some(version);
        self.last_sent_nonce = Some(nonce);
        self.state = SubscriptionState::Pending;
    }

    /// Record acceptance of the last response.
    pub fn record_ack(&mut self) {
        self.last_acked_version = self.last_sent_version;
        self.last_acked_nonce = self.last_sent_nonce.clone();
        self.state = SubscriptionState::Acked;
    }

    /// Record rejection of the last response. The acked version is kept.
    pub fn record_nack(&mut self, message: impl Into<String>) {
        self.last_nack = Some(message.into());
        self.state = SubscriptionState::Nacked;
    }

    /// Snapshot for status reporting.
    pub fn status(&self) -> SubscriptionStatus {
        SubscriptionStatus {
            type_url: self.type_url,
            resource_names: self.resource_names.iter().cloned().collect(),
            state: self.state,
            last_sent_version: self.last_sent_version,
            last_sent_nonce: self.last_sent_nonce.clone(),
            last_acked_version: self.last_acked_version,
            last_acked_nonce: self.last_acked_nonce.clone(),
            last_nack: self.last_nack.clone(),
        }
    }
}

/// Point-in-time copy of a [`Subscription`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionStatus {
    /// Subscribed type URL.
    pub type_url: TypeUrl,
    /// Requested names.
    pub resource_names: Vec<String>,
    /// Exchange state.
    pub state: SubscriptionState,
    /// Version of the last response sent.
    pub last_sent_version: Option<PushVersion>,
    /// Nonce of the last response sent.
    pub last_sent_nonce: Option<String>,
    /// Last accepted version.
    pub last_acked_version: Option<PushVersion>,
    /// Last accepted nonce.
    pub last_acked_nonce: Option<String>,
    /// Most recent NACK message.
    pub last_nack: Option<String>,
}

impl SubscriptionStatus {
    /// How many push epochs the proxy's accepted config trails `current`.
    pub fn version_lag(&self, current: PushVersion) -> u64 {
        let acked = self.last_acked_version.unwrap_or(PushVersion::INITIAL);
        current.as_u64().saturating_sub(acked.as_u64())
    }

    /// Whether the proxy accepted the latest response it was sent.
    pub fn is_synced(&self) -> bool {
        self.state == SubscriptionState::Acked && self.last_acked_version == self.last_sent_version
    }
}
