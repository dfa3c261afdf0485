// Nearlink Core — Proximity Link Spine
//
// Connection lifecycle and event dispatch over a pluggable proximity
// transport: advertise or discover, negotiate authenticated links, exchange
// byte payloads, and surface every outcome to the host as typed events.

pub mod capability;
pub mod endpoint;
pub mod event;
pub mod payload;
pub mod provider;
pub mod session;

use thiserror::Error;

pub use capability::{
    required_capabilities, Capability, CapabilityGate, CapabilityHost,
    API_LEVEL_GRANULAR_BLUETOOTH, API_LEVEL_NEARBY_WIFI,
};
pub use endpoint::{Endpoint, EndpointId, EndpointState};
pub use event::SessionEvent;
pub use payload::{TransferProgress, TransferStatus};
pub use provider::{
    InboundPayload, ProviderError, ProviderEvent, Strategy, TransportProvider,
    STATUS_CONNECTION_REJECTED, STATUS_ERROR, STATUS_OK,
};
pub use session::{ActiveRole, NearlinkSession, SessionConfig};

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Debug, Error, Clone)]
pub enum NearlinkError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
