//! Endpoint registry
//!
//! Single source of truth for known remote endpoints and their lifecycle
//! state. Transitions are applied atomically under one write-lock acquisition
//! per provider callback, in delivery order; the registry is safe for
//! concurrent status queries from other threads.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

/// Opaque endpoint identifier, unique per discovery session, assigned by the
/// transport.
pub type EndpointId = String;

// ============================================================================
// STATE MACHINE
// ============================================================================

/// Lifecycle state of one remote endpoint.
///
/// ```text
/// Discovered ──(request)──> ConnectionRequested ──(auth digits)──> PendingAuthentication
/// PendingAuthentication ──(resolved ok)──> Connected ──(link down)──> Disconnected
/// PendingAuthentication ──(resolved rejected)──> Rejected
/// PendingAuthentication ──(transport error)──> Broken
/// Discovered ──(out of range)──> Lost
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EndpointState {
    /// Announced by the transport, no negotiation started
    Discovered,
    /// A connection was requested locally, awaiting the handshake
    ConnectionRequested,
    /// Authentication digits delivered, awaiting accept/reject resolution
    PendingAuthentication,
    /// Link established; the payload channel is open
    Connected,
    /// Either side rejected the authentication prompt
    Rejected,
    /// The transport failed before the negotiation resolved
    Broken,
    /// A previously connected link went down
    Disconnected,
    /// Went out of range before any negotiation
    Lost,
}

impl EndpointState {
    /// Whether this state ends the endpoint's lifecycle.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EndpointState::Rejected
                | EndpointState::Broken
                | EndpointState::Disconnected
                | EndpointState::Lost
        )
    }

    /// Whether a negotiation is outstanding. At most one per endpoint at a
    /// time; a second request before resolution is a protocol error.
    pub fn is_negotiating(&self) -> bool {
        matches!(
            self,
            EndpointState::ConnectionRequested | EndpointState::PendingAuthentication
        )
    }
}

impl fmt::Display for EndpointState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Discovered => write!(f, "Discovered"),
            Self::ConnectionRequested => write!(f, "ConnectionRequested"),
            Self::PendingAuthentication => write!(f, "PendingAuthentication"),
            Self::Connected => write!(f, "Connected"),
            Self::Rejected => write!(f, "Rejected"),
            Self::Broken => write!(f, "Broken"),
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Lost => write!(f, "Lost"),
        }
    }
}

/// One remote peer as the registry tracks it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Endpoint {
    pub id: EndpointId,
    /// Name the peer announced while advertising; absent for endpoints first
    /// seen through an inbound handshake.
    pub display_name: Option<String>,
    pub state: EndpointState,
}

/// How the transport resolved a pending negotiation, as interpreted from its
/// status code by the negotiator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationOutcome {
    Accepted,
    Rejected,
    /// Transport error, or a status code nobody recognizes
    Failed,
}

/// Outcome of a resolution transition, telling the caller which terminal
/// event (if any) to fan out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Connected,
    Rejected,
    Broken,
    /// No pending negotiation for this endpoint; nothing to emit
    NotPending,
}

// ============================================================================
// REGISTRY
// ============================================================================

/// Tracks the set of known endpoints and owns their records exclusively.
#[derive(Default)]
pub struct EndpointRegistry {
    endpoints: RwLock<HashMap<EndpointId, Endpoint>>,
}

impl EndpointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a found endpoint as Discovered. Re-finding an endpoint whose
    /// previous lifecycle ended replaces the stale record.
    pub fn insert_discovered(&self, id: &str, name: &str) {
        let mut endpoints = self.endpoints.write();
        endpoints.insert(
            id.to_string(),
            Endpoint {
                id: id.to_string(),
                display_name: Some(name.to_string()),
                state: EndpointState::Discovered,
            },
        );
    }

    /// Apply a "lost" notification. Lost only applies to endpoints still in
    /// Discovered; an endpoint mid-negotiation or connected keeps its state
    /// (the negotiation outcome wins the race). Terminal records are evicted.
    ///
    /// Returns true when the lost event should be surfaced to the host.
    pub fn mark_lost(&self, id: &str) -> bool {
        let mut endpoints = self.endpoints.write();
        match endpoints.get(id) {
            Some(endpoint) if endpoint.state == EndpointState::Discovered => {
                endpoints.remove(id);
                true
            }
            Some(endpoint)
                if endpoint.state.is_negotiating() || endpoint.state == EndpointState::Connected =>
            {
                debug!(
                    "ignoring lost for endpoint {} in state {}",
                    id, endpoint.state
                );
                false
            }
            Some(_) => {
                // Terminal leftover; the host never interacted further, evict.
                endpoints.remove(id);
                true
            }
            None => true,
        }
    }

    /// Move an endpoint into ConnectionRequested ahead of the provider call.
    /// Fails when a negotiation is already outstanding for the id. An unknown
    /// id is admitted (the host may request by id it learned out of band).
    pub fn begin_request(&self, id: &str) -> Result<(), EndpointState> {
        let mut endpoints = self.endpoints.write();
        match endpoints.get_mut(id) {
            Some(endpoint) if endpoint.state.is_negotiating() => Err(endpoint.state),
            Some(endpoint) => {
                endpoint.state = EndpointState::ConnectionRequested;
                Ok(())
            }
            None => {
                endpoints.insert(
                    id.to_string(),
                    Endpoint {
                        id: id.to_string(),
                        display_name: None,
                        state: EndpointState::ConnectionRequested,
                    },
                );
                Ok(())
            }
        }
    }

    /// Roll a failed request back to Discovered so the endpoint is not stuck
    /// mid-negotiation after a rejected ack.
    pub fn abort_request(&self, id: &str) {
        let mut endpoints = self.endpoints.write();
        if let Some(endpoint) = endpoints.get_mut(id) {
            if endpoint.state == EndpointState::ConnectionRequested {
                endpoint.state = EndpointState::Discovered;
            }
        }
    }

    /// Record the handshake start: the endpoint is now awaiting an
    /// accept/reject decision. Creates the record when the handshake is the
    /// first time this endpoint is seen (the advertiser side never
    /// discovered it).
    pub fn note_initiated(&self, id: &str) {
        let mut endpoints = self.endpoints.write();
        match endpoints.get_mut(id) {
            Some(endpoint) => endpoint.state = EndpointState::PendingAuthentication,
            None => {
                endpoints.insert(
                    id.to_string(),
                    Endpoint {
                        id: id.to_string(),
                        display_name: None,
                        state: EndpointState::PendingAuthentication,
                    },
                );
            }
        }
    }

    /// Resolve a pending negotiation from a transport status code.
    ///
    /// Only a PendingAuthentication endpoint can resolve normally. A
    /// resolution arriving while still ConnectionRequested means the
    /// transport skipped the handshake notification; that collapses to
    /// Broken so the host still receives exactly one terminal signal. Any
    /// other state has no negotiation to resolve.
    pub fn resolve(&self, id: &str, outcome: NegotiationOutcome) -> Resolution {
        let mut endpoints = self.endpoints.write();
        let Some(endpoint) = endpoints.get_mut(id) else {
            return Resolution::NotPending;
        };

        match endpoint.state {
            EndpointState::PendingAuthentication => match outcome {
                NegotiationOutcome::Accepted => {
                    endpoint.state = EndpointState::Connected;
                    Resolution::Connected
                }
                NegotiationOutcome::Rejected => {
                    endpoint.state = EndpointState::Rejected;
                    Resolution::Rejected
                }
                NegotiationOutcome::Failed => {
                    endpoint.state = EndpointState::Broken;
                    Resolution::Broken
                }
            },
            EndpointState::ConnectionRequested => {
                endpoint.state = EndpointState::Broken;
                Resolution::Broken
            }
            _ => Resolution::NotPending,
        }
    }

    /// Apply the transport's authoritative disconnect notification. Only a
    /// Connected endpoint transitions; returns whether it did.
    pub fn mark_disconnected(&self, id: &str) -> bool {
        let mut endpoints = self.endpoints.write();
        match endpoints.get_mut(id) {
            Some(endpoint) if endpoint.state == EndpointState::Connected => {
                endpoint.state = EndpointState::Disconnected;
                true
            }
            _ => false,
        }
    }

    /// Current state of an endpoint, if known.
    pub fn state_of(&self, id: &str) -> Option<EndpointState> {
        self.endpoints.read().get(id).map(|e| e.state)
    }

    /// Snapshot of one endpoint record.
    pub fn endpoint(&self, id: &str) -> Option<Endpoint> {
        self.endpoints.read().get(id).cloned()
    }

    /// Snapshot of every tracked endpoint.
    pub fn endpoints(&self) -> Vec<Endpoint> {
        self.endpoints.read().values().cloned().collect()
    }

    /// Whether the payload channel is open for this endpoint.
    pub fn is_connected(&self, id: &str) -> bool {
        self.state_of(id) == Some(EndpointState::Connected)
    }
}

// ============================================================================
// TESTS
// ============================================================================
