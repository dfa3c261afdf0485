//! Transport provider boundary
//!
//! Defines the capability the session requires from the underlying proximity
//! transport (Bluetooth / Wi-Fi Direct radios, link establishment) and the
//! asynchronous event stream that transport delivers back. Platform code
//! implements [`TransportProvider`]; the session never touches a radio
//! directly.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// ============================================================================
// STRATEGY
// ============================================================================

/// Connection topology policy governing how many simultaneous links the
/// transport permits for a role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Strategy {
    /// Many-to-many mesh of nearby devices
    Cluster,
    /// Exactly one link at a time
    PointToPoint,
    /// One hub, many spokes
    Star,
}

impl Strategy {
    /// Resolve the host-facing integer code. Exactly three codes are
    /// recognized; anything else is invalid input and must be rejected
    /// before any provider call.
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(Strategy::Cluster),
            2 => Some(Strategy::PointToPoint),
            3 => Some(Strategy::Star),
            _ => None,
        }
    }

    /// The integer code for this strategy.
    pub fn code(&self) -> i32 {
        match self {
            Strategy::Cluster => 1,
            Strategy::PointToPoint => 2,
            Strategy::Star => 3,
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Cluster => write!(f, "Cluster"),
            Strategy::PointToPoint => write!(f, "PointToPoint"),
            Strategy::Star => write!(f, "Star"),
        }
    }
}

// ============================================================================
// RESOLUTION STATUS CODES
// ============================================================================

/// Both sides accepted; the link is up.
pub const STATUS_OK: i32 = 0;

/// One side rejected the authentication prompt.
pub const STATUS_CONNECTION_REJECTED: i32 = 8004;

/// The transport failed before resolution.
pub const STATUS_ERROR: i32 = 13;

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Errors reported by the transport provider when acknowledging a command.
///
/// The `Display` text of these variants is what failure events carry to the
/// host, so providers should put their native diagnostic message inside.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("advertising failed: {0}")]
    Advertising(String),

    #[error("discovery failed: {0}")]
    Discovery(String),

    #[error("connection request failed: {0}")]
    Connection(String),

    #[error("send failed: {0}")]
    Send(String),
}

// ============================================================================
// PAYLOADS
// ============================================================================

/// An inbound payload as the transport reports it.
///
/// The transport may deliver kinds beyond atomic byte buffers; only
/// [`InboundPayload::Bytes`] is ever forwarded to the host. The other kinds
/// are modeled so the session can recognize and discard them deliberately.
#[derive(Debug, Clone)]
pub enum InboundPayload {
    /// One atomic byte buffer
    Bytes(Vec<u8>),
    /// A file handle managed by the transport (out of scope, discarded)
    File { uri: String, size: u64 },
    /// A streaming payload (out of scope, discarded)
    Stream,
}

// ============================================================================
// PROVIDER TRAIT
// ============================================================================

/// The proximity transport capability the session drives.
///
/// Every start/request method resolves to the provider's asynchronous
/// acknowledgment: `Ok` means the command was accepted, `Err` carries the
/// provider's diagnostic. The ack is distinct from eventual lifecycle
/// resolution, which arrives later through [`ProviderEvent`]s. Stop and
/// disconnect requests have no meaningful failure mode and are infallible.
#[async_trait]
pub trait TransportProvider: Send + Sync {
    /// Begin advertising `local_name` under `service_id` with the given
    /// topology strategy.
    async fn start_advertising(
        &self,
        local_name: &str,
        service_id: &str,
        strategy: Strategy,
    ) -> Result<(), ProviderError>;

    /// Stop advertising. Safe to call when not advertising.
    async fn stop_advertising(&self);

    /// Begin discovering peers advertising under `service_id`.
    async fn start_discovery(
        &self,
        service_id: &str,
        strategy: Strategy,
    ) -> Result<(), ProviderError>;

    /// Stop discovery. Safe to call when not discovering.
    async fn stop_discovery(&self);

    /// Initiate a connection to a discovered endpoint, announcing
    /// `local_name` to the remote side.
    async fn request_connection(
        &self,
        local_name: &str,
        endpoint_id: &str,
    ) -> Result<(), ProviderError>;

    /// Accept a connection pending authentication.
    async fn accept_connection(&self, endpoint_id: &str) -> Result<(), ProviderError>;

    /// Reject a connection pending authentication.
    async fn reject_connection(&self, endpoint_id: &str) -> Result<(), ProviderError>;

    /// Transfer one atomic byte payload to a connected endpoint.
    async fn send_payload(&self, endpoint_id: &str, bytes: Vec<u8>) -> Result<(), ProviderError>;

    /// Tear down the link to a connected endpoint. The provider's own
    /// [`ProviderEvent::Disconnected`] confirms the teardown.
    async fn disconnect(&self, endpoint_id: &str);
}

// ============================================================================
// PROVIDER EVENTS
// ============================================================================

/// Asynchronous notifications delivered by the transport, possibly from a
/// different thread than the one that issued the command. The session applies
/// them in delivery order, one at a time per call.
#[derive(Debug, Clone)]
pub enum ProviderEvent {
    /// A remote endpoint began advertising within range
    EndpointFound {
        endpoint_id: String,
        endpoint_name: String,
    },
    /// A previously found endpoint went out of range
    EndpointLost { endpoint_id: String },
    /// A connection handshake started; both sides must confirm the digits
    ConnectionInitiated {
        endpoint_id: String,
        auth_digits: String,
    },
    /// A pending connection resolved with a transport status code
    ConnectionResolved {
        endpoint_id: String,
        status_code: i32,
    },
    /// An established link went down, locally or remotely initiated
    Disconnected { endpoint_id: String },
    /// A payload arrived from a connected endpoint
    PayloadReceived {
        endpoint_id: String,
        payload: InboundPayload,
    },
    /// Progress for an in-flight transfer, inbound or outbound
    TransferUpdate {
        endpoint_id: String,
        bytes_transferred: u64,
        total_bytes: u64,
        status_code: i32,
    },
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_from_code_recognized() {
        assert_eq!(Strategy::from_code(1), Some(Strategy::Cluster));
        assert_eq!(Strategy::from_code(2), Some(Strategy::PointToPoint));
        assert_eq!(Strategy::from_code(3), Some(Strategy::Star));
    }

    #[test]
    fn test_strategy_from_code_rejects_everything_else() {
        assert_eq!(Strategy::from_code(0), None);
        assert_eq!(Strategy::from_code(4), None);
        assert_eq!(Strategy::from_code(-1), None);
        assert_eq!(Strategy::from_code(i32::MAX), None);
    }

    #[test]
    fn test_strategy_code_round_trip() {
        for strategy in [Strategy::Cluster, Strategy::PointToPoint, Strategy::Star] {
            assert_eq!(Strategy::from_code(strategy.code()), Some(strategy));
        }
    }

    #[test]
    fn test_strategy_display() {
        assert_eq!(Strategy::Cluster.to_string(), "Cluster");
        assert_eq!(Strategy::PointToPoint.to_string(), "PointToPoint");
        assert_eq!(Strategy::Star.to_string(), "Star");
    }

    #[test]
    fn test_resolution_codes_distinct() {
        assert_ne!(STATUS_OK, STATUS_CONNECTION_REJECTED);
        assert_ne!(STATUS_OK, STATUS_ERROR);
        assert_ne!(STATUS_CONNECTION_REJECTED, STATUS_ERROR);
    }

    #[test]
    fn test_provider_error_carries_diagnostic_text() {
        let err = ProviderError::Advertising("radio off".to_string());
        assert!(err.to_string().contains("radio off"));

        let err = ProviderError::Connection("endpoint busy".to_string());
        assert!(err.to_string().contains("endpoint busy"));
    }
}
