//! Nearlink session
//!
//! The explicit, host-owned session object: role control (advertise or
//! discover, one at a time), connection negotiation commands, payload sends,
//! and the intake that applies the provider's asynchronous notifications to
//! the endpoint registry before fanning them out to the host.
//!
//! Every command is fire-and-forget from the host's point of view: the
//! returned future resolves when the provider acknowledges the command, and
//! all failure surfaces through the event stream, never as a returned error.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, warn};

use crate::capability::{Capability, CapabilityGate, CapabilityHost};
use crate::endpoint::{
    Endpoint, EndpointRegistry, EndpointState, NegotiationOutcome, Resolution,
};
use crate::event::{EventDispatcher, SessionEvent};
use crate::payload::{TransferLedger, TransferProgress, TransferStatus};
use crate::provider::{
    InboundPayload, ProviderEvent, Strategy, TransportProvider, STATUS_CONNECTION_REJECTED,
    STATUS_ERROR, STATUS_OK,
};
use crate::NearlinkError;

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Session configuration provided by the host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Service identifier both sides advertise and discover under,
    /// typically the application's package name.
    pub service_id: String,
}

impl SessionConfig {
    pub fn new(service_id: impl Into<String>) -> Self {
        Self {
            service_id: service_id.into(),
        }
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), NearlinkError> {
        if self.service_id.trim().is_empty() {
            return Err(NearlinkError::InvalidConfig(
                "service_id cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// LOCAL STATE
// ============================================================================

/// The single role this process is playing, at most one at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActiveRole {
    Idle,
    Advertising,
    Discovering,
}

impl fmt::Display for ActiveRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Advertising => write!(f, "Advertising"),
            Self::Discovering => write!(f, "Discovering"),
        }
    }
}

/// Process-wide session state, mutated only by host commands.
struct LocalState {
    local_name: Option<String>,
    active_role: ActiveRole,
    active_strategy: Option<Strategy>,
}

// ============================================================================
// SESSION
// ============================================================================

/// A proximity-link session over an injected [`TransportProvider`].
///
/// Cheap to clone; clones share all state. The host subscribes for events,
/// sets its local name, starts a role, and reacts to the event stream.
/// Provider notification threads feed [`NearlinkSession::handle_provider_event`]
/// directly; transitions per endpoint are applied atomically in delivery
/// order.
#[derive(Clone)]
pub struct NearlinkSession {
    config: Arc<SessionConfig>,
    provider: Arc<dyn TransportProvider>,
    registry: Arc<EndpointRegistry>,
    dispatcher: Arc<EventDispatcher>,
    transfers: Arc<TransferLedger>,
    local: Arc<RwLock<LocalState>>,
    gate: Option<CapabilityGate>,
}

impl NearlinkSession {
    /// Create a session over the given provider.
    pub fn new(
        config: SessionConfig,
        provider: Arc<dyn TransportProvider>,
    ) -> Result<Self, NearlinkError> {
        Self::build(config, provider, None)
    }

    /// Create a session that also gates on platform capabilities.
    pub fn with_capabilities(
        config: SessionConfig,
        provider: Arc<dyn TransportProvider>,
        capability_host: Arc<dyn CapabilityHost>,
    ) -> Result<Self, NearlinkError> {
        Self::build(config, provider, Some(CapabilityGate::new(capability_host)))
    }

    fn build(
        config: SessionConfig,
        provider: Arc<dyn TransportProvider>,
        gate: Option<CapabilityGate>,
    ) -> Result<Self, NearlinkError> {
        config.validate()?;

        // Initialize tracing (idempotent)
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .try_init();

        Ok(Self {
            config: Arc::new(config),
            provider,
            registry: Arc::new(EndpointRegistry::new()),
            dispatcher: Arc::new(EventDispatcher::new()),
            transfers: Arc::new(TransferLedger::new()),
            local: Arc::new(RwLock::new(LocalState {
                local_name: None,
                active_role: ActiveRole::Idle,
                active_strategy: None,
            })),
            gate,
        })
    }

    // ------------------------------------------------------------------------
    // CAPABILITIES
    // ------------------------------------------------------------------------

    /// Whether every required platform capability is granted. Sessions built
    /// without a capability host are unconstrained and report true.
    pub fn has_capabilities(&self) -> bool {
        match &self.gate {
            Some(gate) => gate.has_capabilities(),
            None => true,
        }
    }

    /// The required capabilities not currently granted.
    pub fn missing_capabilities(&self) -> Vec<Capability> {
        match &self.gate {
            Some(gate) => gate.missing_capabilities(),
            None => Vec::new(),
        }
    }

    /// Issue one batched platform request for the missing capabilities.
    pub fn request_capabilities(&self) {
        if let Some(gate) = &self.gate {
            gate.request_capabilities();
        }
    }

    // ------------------------------------------------------------------------
    // DISPATCH & LOCAL STATE
    // ------------------------------------------------------------------------

    /// Opt in to event delivery and return the stream to drain. Events that
    /// occurred before the subscription are permanently lost; enable dispatch
    /// before issuing any role or connection command.
    pub fn subscribe(&self) -> UnboundedReceiver<SessionEvent> {
        self.dispatcher.subscribe()
    }

    /// Whether the host has opted in to event delivery.
    pub fn events_enabled(&self) -> bool {
        self.dispatcher.is_enabled()
    }

    /// Set the name this process announces when advertising or requesting a
    /// connection. Required before either.
    pub fn set_local_name(&self, name: impl Into<String>) {
        self.local.write().local_name = Some(name.into());
    }

    pub fn local_name(&self) -> Option<String> {
        self.local.read().local_name.clone()
    }

    pub fn active_role(&self) -> ActiveRole {
        self.local.read().active_role
    }

    pub fn active_strategy(&self) -> Option<Strategy> {
        self.local.read().active_strategy
    }

    /// Current lifecycle state of an endpoint, if known.
    pub fn endpoint_state(&self, endpoint_id: &str) -> Option<EndpointState> {
        self.registry.state_of(endpoint_id)
    }

    /// Snapshot of every tracked endpoint.
    pub fn endpoints(&self) -> Vec<Endpoint> {
        self.registry.endpoints()
    }

    /// The transfer currently in flight for an endpoint, if any.
    pub fn active_transfer(&self, endpoint_id: &str) -> Option<TransferProgress> {
        self.transfers.active(endpoint_id)
    }

    // ------------------------------------------------------------------------
    // ROLE CONTROL
    // ------------------------------------------------------------------------

    /// Start advertising under the given strategy code. Resolves on the
    /// provider's ack; the outcome arrives as `AdvertisingStarted` or
    /// `AdvertisingFailed`.
    pub async fn begin_advertising(&self, strategy_code: i32) {
        if !self.dispatcher.is_enabled() {
            debug!("begin_advertising ignored: dispatch disabled");
            return;
        }

        let Some(strategy) = Strategy::from_code(strategy_code) else {
            self.dispatcher.emit(SessionEvent::AdvertisingFailed {
                reason: format!("unrecognized strategy code {}", strategy_code),
            });
            return;
        };

        let Some(name) = self.local_name() else {
            self.dispatcher.emit(SessionEvent::AdvertisingFailed {
                reason: "local name not set".to_string(),
            });
            return;
        };

        let role = self.active_role();
        if role != ActiveRole::Idle {
            self.dispatcher.emit(SessionEvent::AdvertisingFailed {
                reason: format!("role {} already active", role),
            });
            return;
        }

        match self
            .provider
            .start_advertising(&name, &self.config.service_id, strategy)
            .await
        {
            Ok(()) => {
                let mut local = self.local.write();
                local.active_role = ActiveRole::Advertising;
                local.active_strategy = Some(strategy);
                drop(local);

                info!("advertising as {} under {}", name, strategy);
                self.dispatcher.emit(SessionEvent::AdvertisingStarted);
            }
            Err(err) => {
                self.dispatcher.emit(SessionEvent::AdvertisingFailed {
                    reason: err.to_string(),
                });
            }
        }
    }

    /// Start discovering peers under the given strategy code. Resolves on
    /// the provider's ack; the outcome arrives as `DiscoveryStarted` or
    /// `DiscoveryFailed`.
    pub async fn begin_discovery(&self, strategy_code: i32) {
        if !self.dispatcher.is_enabled() {
            debug!("begin_discovery ignored: dispatch disabled");
            return;
        }

        let Some(strategy) = Strategy::from_code(strategy_code) else {
            self.dispatcher.emit(SessionEvent::DiscoveryFailed {
                reason: format!("unrecognized strategy code {}", strategy_code),
            });
            return;
        };

        let role = self.active_role();
        if role != ActiveRole::Idle {
            self.dispatcher.emit(SessionEvent::DiscoveryFailed {
                reason: format!("role {} already active", role),
            });
            return;
        }

        match self
            .provider
            .start_discovery(&self.config.service_id, strategy)
            .await
        {
            Ok(()) => {
                let mut local = self.local.write();
                local.active_role = ActiveRole::Discovering;
                local.active_strategy = Some(strategy);
                drop(local);

                info!("discovering under {}", strategy);
                self.dispatcher.emit(SessionEvent::DiscoveryStarted);
            }
            Err(err) => {
                self.dispatcher.emit(SessionEvent::DiscoveryFailed {
                    reason: err.to_string(),
                });
            }
        }
    }

    /// Stop advertising. Always forwarded to the provider; safe to call when
    /// not advertising. Emits nothing.
    pub async fn end_advertising(&self) {
        self.provider.stop_advertising().await;

        let mut local = self.local.write();
        if local.active_role == ActiveRole::Advertising {
            local.active_role = ActiveRole::Idle;
            local.active_strategy = None;
        }
    }

    /// Stop discovery. Always forwarded to the provider; safe to call when
    /// not discovering. Emits nothing.
    pub async fn end_discovery(&self) {
        self.provider.stop_discovery().await;

        let mut local = self.local.write();
        if local.active_role == ActiveRole::Discovering {
            local.active_role = ActiveRole::Idle;
            local.active_strategy = None;
        }
    }

    // ------------------------------------------------------------------------
    // NEGOTIATION
    // ------------------------------------------------------------------------

    /// Initiate a connection to an endpoint. The ack arrives as
    /// `ConnectionRequestSucceeded`/`ConnectionRequestFailed`; the eventual
    /// handshake and resolution arrive separately through provider events.
    pub async fn request_connection(&self, endpoint_id: &str) {
        if !self.dispatcher.is_enabled() {
            debug!("request_connection ignored: dispatch disabled");
            return;
        }

        let Some(name) = self.local_name() else {
            self.dispatcher.emit(SessionEvent::ConnectionRequestFailed {
                endpoint_id: endpoint_id.to_string(),
                reason: "local name not set".to_string(),
            });
            return;
        };

        if let Err(state) = self.registry.begin_request(endpoint_id) {
            self.dispatcher.emit(SessionEvent::ConnectionRequestFailed {
                endpoint_id: endpoint_id.to_string(),
                reason: format!("negotiation already in progress ({})", state),
            });
            return;
        }

        match self.provider.request_connection(&name, endpoint_id).await {
            Ok(()) => {
                self.dispatcher.emit(SessionEvent::ConnectionRequestSucceeded {
                    endpoint_id: endpoint_id.to_string(),
                });
            }
            Err(err) => {
                self.registry.abort_request(endpoint_id);
                self.dispatcher.emit(SessionEvent::ConnectionRequestFailed {
                    endpoint_id: endpoint_id.to_string(),
                    reason: err.to_string(),
                });
            }
        }
    }

    /// Accept a connection pending authentication. Forwarded to the provider
    /// whenever dispatch is enabled; the provider's resolution event is the
    /// authoritative state trigger, so no local transition happens here.
    pub async fn accept_connection(&self, endpoint_id: &str) {
        if !self.dispatcher.is_enabled() {
            debug!("accept_connection ignored: dispatch disabled");
            return;
        }

        if self.registry.state_of(endpoint_id) != Some(EndpointState::PendingAuthentication) {
            debug!(
                "forwarding accept for endpoint {} outside PendingAuthentication",
                endpoint_id
            );
        }

        if let Err(err) = self.provider.accept_connection(endpoint_id).await {
            warn!("accept for endpoint {} not acknowledged: {}", endpoint_id, err);
        }
    }

    /// Reject a connection pending authentication. Same forwarding contract
    /// as [`NearlinkSession::accept_connection`].
    pub async fn reject_connection(&self, endpoint_id: &str) {
        if !self.dispatcher.is_enabled() {
            debug!("reject_connection ignored: dispatch disabled");
            return;
        }

        if let Err(err) = self.provider.reject_connection(endpoint_id).await {
            warn!("reject for endpoint {} not acknowledged: {}", endpoint_id, err);
        }
    }

    /// Tear down the link to a connected endpoint. The provider's
    /// `Disconnected` event performs the actual transition, since the remote
    /// side may also disconnect without any local call.
    pub async fn disconnect(&self, endpoint_id: &str) {
        if !self.dispatcher.is_enabled() {
            debug!("disconnect ignored: dispatch disabled");
            return;
        }

        if !self.registry.is_connected(endpoint_id) {
            debug!("disconnect ignored: endpoint {} not connected", endpoint_id);
            return;
        }

        self.provider.disconnect(endpoint_id).await;
    }

    // ------------------------------------------------------------------------
    // PAYLOAD CHANNEL
    // ------------------------------------------------------------------------

    /// Send one atomic byte payload to a connected endpoint. A missing or
    /// non-connected endpoint is a no-op, tolerating races with a
    /// just-completed disconnect; the provider never sees the call.
    pub async fn send(&self, endpoint_id: &str, bytes: Vec<u8>) {
        if !self.dispatcher.is_enabled() {
            debug!("send ignored: dispatch disabled");
            return;
        }

        if !self.registry.is_connected(endpoint_id) {
            debug!("send ignored: endpoint {} not connected", endpoint_id);
            return;
        }

        if let Err(err) = self.provider.send_payload(endpoint_id, bytes).await {
            // Transfer failures also surface through TransferUpdate events;
            // a rejected ack is only logged.
            warn!("send to endpoint {} not acknowledged: {}", endpoint_id, err);
        }
    }

    // ------------------------------------------------------------------------
    // PROVIDER EVENT INTAKE
    // ------------------------------------------------------------------------

    /// Apply one provider notification. Called by the provider's notification
    /// threads in delivery order; each call applies its registry transition
    /// atomically. While dispatch is disabled the session is inert and the
    /// notification is dropped entirely.
    pub fn handle_provider_event(&self, event: ProviderEvent) {
        if !self.dispatcher.is_enabled() {
            debug!("dispatch disabled; provider event dropped");
            return;
        }

        match event {
            ProviderEvent::EndpointFound {
                endpoint_id,
                endpoint_name,
            } => {
                self.registry.insert_discovered(&endpoint_id, &endpoint_name);
                self.dispatcher.emit(SessionEvent::EndpointFound {
                    endpoint_id,
                    endpoint_name,
                });
            }

            ProviderEvent::EndpointLost { endpoint_id } => {
                if self.registry.mark_lost(&endpoint_id) {
                    self.dispatcher
                        .emit(SessionEvent::EndpointLost { endpoint_id });
                }
            }

            ProviderEvent::ConnectionInitiated {
                endpoint_id,
                auth_digits,
            } => {
                self.registry.note_initiated(&endpoint_id);
                self.dispatcher.emit(SessionEvent::ConnectionInitiated {
                    endpoint_id,
                    auth_digits,
                });
            }

            ProviderEvent::ConnectionResolved {
                endpoint_id,
                status_code,
            } => self.handle_resolution(&endpoint_id, status_code),

            ProviderEvent::Disconnected { endpoint_id } => {
                if self.registry.mark_disconnected(&endpoint_id) {
                    self.transfers.clear(&endpoint_id);
                    self.dispatcher
                        .emit(SessionEvent::EndpointDisconnected { endpoint_id });
                } else {
                    debug!(
                        "disconnect notification for endpoint {} not connected",
                        endpoint_id
                    );
                }
            }

            ProviderEvent::PayloadReceived {
                endpoint_id,
                payload,
            } => match payload {
                InboundPayload::Bytes(data) => {
                    self.dispatcher
                        .emit(SessionEvent::DataReceived { endpoint_id, data });
                }
                InboundPayload::File { .. } | InboundPayload::Stream => {
                    debug!(
                        "discarding non-byte payload from endpoint {}",
                        endpoint_id
                    );
                }
            },

            ProviderEvent::TransferUpdate {
                endpoint_id,
                bytes_transferred,
                total_bytes,
                status_code,
            } => {
                let status = TransferStatus::from_code(status_code);
                let progress =
                    self.transfers
                        .record(&endpoint_id, bytes_transferred, total_bytes, status);
                self.dispatcher.emit(SessionEvent::TransferProgress {
                    endpoint_id,
                    bytes_transferred: progress.bytes_transferred,
                    total_bytes: progress.total_bytes,
                    status: progress.status,
                });
            }
        }
    }

    /// Resolve a pending negotiation from the transport's status code. Every
    /// non-success, non-rejection code — including codes nobody recognizes —
    /// collapses to the broken-connection event so the host always receives
    /// a terminal signal.
    fn handle_resolution(&self, endpoint_id: &str, status_code: i32) {
        let outcome = match status_code {
            STATUS_OK => NegotiationOutcome::Accepted,
            STATUS_CONNECTION_REJECTED => NegotiationOutcome::Rejected,
            STATUS_ERROR => NegotiationOutcome::Failed,
            other => {
                warn!(
                    "unknown resolution code {} for endpoint {}; treating as broken",
                    other, endpoint_id
                );
                NegotiationOutcome::Failed
            }
        };

        match self.registry.resolve(endpoint_id, outcome) {
            Resolution::Connected => {
                info!("endpoint {} connected", endpoint_id);
                self.dispatcher.emit(SessionEvent::ConnectionSucceeded {
                    endpoint_id: endpoint_id.to_string(),
                });
            }
            Resolution::Rejected => {
                self.dispatcher.emit(SessionEvent::ConnectionRejected {
                    endpoint_id: endpoint_id.to_string(),
                });
            }
            Resolution::Broken => {
                self.dispatcher.emit(SessionEvent::ConnectionBroken {
                    endpoint_id: endpoint_id.to_string(),
                });
            }
            Resolution::NotPending => {
                warn!(
                    "resolution code {} for endpoint {} with no pending negotiation; dropped",
                    status_code, endpoint_id
                );
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
