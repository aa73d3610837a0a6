//! Per-connection protocol state machine.
//!
//! The engine turns inbound discovery requests and scheduled pushes into
//! outbound responses. It owns every [`Subscription`] of its connection and
//! is driven by exactly one task, so no locking is involved.
//!
//! Request classification for a kind that is already subscribed:
//!
//! | Nonce | `error_detail` | Names | Outcome |
//! |-------|----------------|-------|---------|
//! | empty | any | any | re-issued request, respond |
//! | not the last sent | any | any | stale, ignore |
//! | last sent | none | same | ACK |
//! | last sent | none | changed | ACK, then respond to the new names |
//! | last sent | set | same | NACK, no resend |
//! | last sent | set | changed | NACK, then respond to the new names |

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::{debug, info, trace, warn};

use ads_core::{
    AdsError, ConnectionContext, PushVersion, ResourceGenerator, ResourceKind, TypeUrl,
    VersionAuthority,
};

use crate::connection::PendingPush;
use crate::metrics::{AdsMetrics, ResponseTrigger};
use crate::proto::{ControlPlane, DiscoveryRequest, DiscoveryResponse};
use crate::subscription::{Subscription, SubscriptionStatus};

/// Result of handling one discovery request.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestOutcome {
    /// Send this response.
    Respond(DiscoveryResponse),
    /// The proxy accepted the last response.
    Acked {
        /// Kind acknowledged.
        kind: ResourceKind,
        /// Version now acknowledged.
        version: Option<PushVersion>,
    },
    /// The proxy rejected the last response.
    Nacked {
        /// Kind rejected.
        kind: ResourceKind,
        /// Error reported by the proxy.
        message: String,
    },
    /// The request answers a response that is no longer the latest.
    Stale {
        /// Kind concerned.
        kind: ResourceKind,
    },
    /// The type URL is not served.
    Unsupported {
        /// The unknown type URL.
        type_url: String,
    },
    /// The response could not be generated; the subscription is kept.
    Skipped {
        /// Kind concerned.
        kind: ResourceKind,
    },
}

/// Protocol engine of one connection.
pub struct ProtocolEngine {
    context: Arc<ConnectionContext>,
    generator: Arc<dyn ResourceGenerator>,
    authority: Arc<VersionAuthority>,
    metrics: AdsMetrics,
    control_plane: Option<ControlPlane>,
    subscriptions: BTreeMap<ResourceKind, Subscription>,
}

impl std::fmt::Debug for ProtocolEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolEngine")
            .field("connection", &self.context.connection_id())
            .field("subscriptions", &self.subscriptions)
            .finish()
    }
}

impl ProtocolEngine {
    /// Create an engine for an identified connection.
    pub fn new(
        context: Arc<ConnectionContext>,
        generator: Arc<dyn ResourceGenerator>,
        authority: Arc<VersionAuthority>,
        metrics: AdsMetrics,
    ) -> Self {
        Self {
            context,
            generator,
            authority,
            metrics,
            control_plane: None,
            subscriptions: BTreeMap::new(),
        }
    }

    /// Stamp responses with a control plane identifier.
    #[must_use]
    pub fn with_control_plane(mut self, identifier: Option<String>) -> Self {
        self.control_plane = identifier.map(|identifier| ControlPlane { identifier });
        self
    }

    /// The connection this engine serves.
    #[inline]
    pub fn context(&self) -> &Arc<ConnectionContext> {
        &self.context
    }

    /// Subscription for a kind.
    pub fn subscription(&self, kind: ResourceKind) -> Option<&Subscription> {
        self.subscriptions.get(&kind)
    }

    /// Status of every subscription, in push order.
    pub fn status(&self) -> Vec<SubscriptionStatus> {
        self.subscriptions.values().map(Subscription::status).collect()
    }

    /// Handle one inbound request.
    ///
    /// # Errors
    ///
    /// [`AdsError::SchemaMismatch`] if the request names a kind already
    /// subscribed in the other schema. The stream must be closed.
    pub fn on_request(&mut self, request: &DiscoveryRequest) -> Result<RequestOutcome, AdsError> {
        self.metrics.record_request(&request.type_url);

        let type_url = match TypeUrl::parse(&request.type_url) {
            Ok(type_url) => type_url,
            Err(e) => {
                warn!(
                    connection = %self.context.connection_id(),
                    node = self.context.node_id(),
                    error = %e,
                    "ignoring request for unsupported type"
                );
                self.metrics.record_unsupported();
                return Ok(RequestOutcome::Unsupported {
                    type_url: request.type_url.clone(),
                });
            }
        };
        let kind = type_url.kind();
        let names: BTreeSet<String> = request.resource_names.iter().cloned().collect();

        trace!(
            connection = %self.context.connection_id(),
            type_url = %type_url,
            version = %request.version_info,
            nonce = %request.response_nonce,
            resources = names.len(),
            "processing request"
        );

        let Some(sub) = self.subscriptions.get_mut(&kind) else {
            debug!(
                connection = %self.context.connection_id(),
                type_url = %type_url,
                previous_nonce = %request.response_nonce,
                "new subscription"
            );
            self.subscriptions
                .insert(kind, Subscription::new(type_url, names));
            return Ok(self.respond_to_request(kind));
        };

        if sub.type_url().schema() != type_url.schema() {
            return Err(AdsError::SchemaMismatch {
                kind,
                established: sub.type_url().schema(),
                requested: type_url.schema(),
            });
        }

        if request.response_nonce.is_empty() {
            debug!(
                connection = %self.context.connection_id(),
                type_url = %type_url,
                "request re-issued without nonce"
            );
            sub.update_names(names);
            return Ok(self.respond_to_request(kind));
        }

        if !sub.is_response_to(&request.response_nonce) {
            debug!(
                connection = %self.context.connection_id(),
                type_url = %type_url,
                nonce = %request.response_nonce,
                expected = sub.last_sent_nonce().unwrap_or_default(),
                "ignoring stale nonce"
            );
            self.metrics.record_stale(type_url.as_str());
            return Ok(RequestOutcome::Stale { kind });
        }

        if let Some(message) = request.nack_message() {
            warn!(
                connection = %self.context.connection_id(),
                node = self.context.node_id(),
                type_url = %type_url,
                nonce = %request.response_nonce,
                error = %message,
                "proxy rejected configuration"
            );
            sub.record_nack(message);
            self.metrics.record_nack(type_url.as_str());
            if sub.update_names(names) {
                return Ok(self.respond_to_request(kind));
            }
            return Ok(RequestOutcome::Nacked {
                kind,
                message: message.to_string(),
            });
        }

        sub.record_ack();
        self.metrics.record_ack(type_url.as_str());
        let version = sub.last_acked_version();
        trace!(
            connection = %self.context.connection_id(),
            type_url = %type_url,
            version = ?version,
            "ACK"
        );
        if sub.update_names(names) {
            return Ok(self.respond_to_request(kind));
        }
        Ok(RequestOutcome::Acked { kind, version })
    }

    /// Regenerate every subscribed kind named by a scheduled push.
    ///
    /// A kind already sent at this version or a later one is left alone:
    /// its content was generated from state at least as new as the push.
    /// Kinds that fail to generate are skipped; the next push retries them.
    pub fn on_push(&mut self, push: &PendingPush) -> Vec<DiscoveryResponse> {
        let kinds: Vec<ResourceKind> = push
            .kinds
            .iter()
            .filter(|kind| match self.subscriptions.get(kind) {
                Some(sub) if sub.last_sent_version() >= Some(push.version) => {
                    trace!(
                        connection = %self.context.connection_id(),
                        type_url = %sub.type_url(),
                        version = %push.version,
                        "already sent at this version or later, skipping push"
                    );
                    false
                }
                Some(_) => true,
                None => false,
            })
            .collect();

        let mut responses = Vec::with_capacity(kinds.len());
        for kind in kinds {
            match self.build_response(kind, push.version) {
                Ok(response) => {
                    self.metrics.record_response(
                        &response.type_url,
                        response.resources.len(),
                        ResponseTrigger::Push,
                    );
                    responses.push(response);
                }
                Err(e) => self.generation_failed(kind, &e),
            }
        }

        if !responses.is_empty() {
            info!(
                connection = %self.context.connection_id(),
                node = self.context.node_id(),
                version = %push.version,
                full = push.full,
                responses = responses.len(),
                "pushing configuration"
            );
        }
        responses
    }

    fn respond_to_request(&mut self, kind: ResourceKind) -> RequestOutcome {
        let version = self.authority.current_version();
        match self.build_response(kind, version) {
            Ok(response) => {
                debug!(
                    connection = %self.context.connection_id(),
                    type_url = %response.type_url,
                    version = %response.version_info,
                    nonce = %response.nonce,
                    resources = response.resources.len(),
                    "responding to request"
                );
                self.metrics.record_response(
                    &response.type_url,
                    response.resources.len(),
                    ResponseTrigger::Request,
                );
                RequestOutcome::Respond(response)
            }
            Err(e) => {
                self.generation_failed(kind, &e);
                RequestOutcome::Skipped { kind }
            }
        }
    }

    fn build_response(
        &mut self,
        kind: ResourceKind,
        version: PushVersion,
    ) -> Result<DiscoveryResponse, AdsError> {
        let sub = self.subscriptions.get_mut(&kind).ok_or_else(|| AdsError::Internal {
            message: format!("no subscription for {kind}"),
            source: None,
        })?;
        let type_url = sub.type_url().as_str();

        let resources = self
            .generator
            .generate(kind, sub.resource_names(), &self.context)?
            .iter()
            .map(|resource| {
                resource
                    .encode()
                    .map(|value| prost_types::Any {
                        type_url: type_url.to_string(),
                        value,
                    })
                    .map_err(|e| AdsError::Encoding {
                        kind,
                        name: resource.name().to_string(),
                        message: e.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let nonce = self.authority.next_nonce();
        sub.record_sent(version, nonce.clone());

        Ok(DiscoveryResponse {
            version_info: version.to_string(),
            resources,
            canary: false,
            type_url: type_url.to_string(),
            nonce,
            control_plane: self.control_plane.clone(),
        })
    }

    fn generation_failed(&self, kind: ResourceKind, error: &AdsError) {
        let type_url = self
            .subscriptions
            .get(&kind)
            .map_or("", |sub| sub.type_url().as_str());
        warn!(
            connection = %self.context.connection_id(),
            node = self.context.node_id(),
            type_url,
            error = %error,
            "failed to generate response, skipping"
        );
        self.metrics.record_generation_failure(type_url);
    }
}
