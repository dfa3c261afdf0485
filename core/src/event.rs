//! Event dispatch
//!
//! The single fan-out point between the session and the host. Every
//! lifecycle and transfer notification becomes one [`SessionEvent`] on a
//! typed channel the host drains. Dispatch is gated by subscription: until
//! the host subscribes, events are dropped, not queued — there is no
//! buffering or replay.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::debug;

use crate::payload::TransferStatus;

// ============================================================================
// EVENT SURFACE
// ============================================================================

/// Every notification the session can deliver to the host. One event per
/// occurrence, fire-and-forget, no acknowledgment expected back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SessionEvent {
    DiscoveryStarted,
    DiscoveryFailed {
        reason: String,
    },
    AdvertisingStarted,
    AdvertisingFailed {
        reason: String,
    },
    EndpointFound {
        endpoint_id: String,
        endpoint_name: String,
    },
    EndpointLost {
        endpoint_id: String,
    },
    ConnectionRequestSucceeded {
        endpoint_id: String,
    },
    ConnectionRequestFailed {
        endpoint_id: String,
        reason: String,
    },
    /// The handshake started; surface `auth_digits` to the user for visual
    /// confirmation before accepting
    ConnectionInitiated {
        endpoint_id: String,
        auth_digits: String,
    },
    ConnectionSucceeded {
        endpoint_id: String,
    },
    ConnectionRejected {
        endpoint_id: String,
    },
    ConnectionBroken {
        endpoint_id: String,
    },
    TransferProgress {
        endpoint_id: String,
        bytes_transferred: u64,
        total_bytes: u64,
        status: TransferStatus,
    },
    DataReceived {
        endpoint_id: String,
        data: Vec<u8>,
    },
    EndpointDisconnected {
        endpoint_id: String,
    },
}

impl fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DiscoveryStarted => write!(f, "DiscoveryStarted"),
            Self::DiscoveryFailed { reason } => write!(f, "DiscoveryFailed {{ {} }}", reason),
            Self::AdvertisingStarted => write!(f, "AdvertisingStarted"),
            Self::AdvertisingFailed { reason } => write!(f, "AdvertisingFailed {{ {} }}", reason),
            Self::EndpointFound {
                endpoint_id,
                endpoint_name,
            } => write!(f, "EndpointFound {{ {}, {} }}", endpoint_id, endpoint_name),
            Self::EndpointLost { endpoint_id } => write!(f, "EndpointLost {{ {} }}", endpoint_id),
            Self::ConnectionRequestSucceeded { endpoint_id } => {
                write!(f, "ConnectionRequestSucceeded {{ {} }}", endpoint_id)
            }
            Self::ConnectionRequestFailed {
                endpoint_id,
                reason,
            } => write!(
                f,
                "ConnectionRequestFailed {{ {}, {} }}",
                endpoint_id, reason
            ),
            Self::ConnectionInitiated { endpoint_id, .. } => {
                write!(f, "ConnectionInitiated {{ {} }}", endpoint_id)
            }
            Self::ConnectionSucceeded { endpoint_id } => {
                write!(f, "ConnectionSucceeded {{ {} }}", endpoint_id)
            }
            Self::ConnectionRejected { endpoint_id } => {
                write!(f, "ConnectionRejected {{ {} }}", endpoint_id)
            }
            Self::ConnectionBroken { endpoint_id } => {
                write!(f, "ConnectionBroken {{ {} }}", endpoint_id)
            }
            Self::TransferProgress {
                endpoint_id,
                bytes_transferred,
                total_bytes,
                status,
            } => write!(
                f,
                "TransferProgress {{ {}, {}/{}, {} }}",
                endpoint_id, bytes_transferred, total_bytes, status
            ),
            Self::DataReceived { endpoint_id, data } => {
                write!(f, "DataReceived {{ {}, {} bytes }}", endpoint_id, data.len())
            }
            Self::EndpointDisconnected { endpoint_id } => {
                write!(f, "EndpointDisconnected {{ {} }}", endpoint_id)
            }
        }
    }
}

// ============================================================================
// DISPATCHER
// ============================================================================

/// Gated fan-out of [`SessionEvent`]s to the host.
///
/// Subscription installs the channel and enables dispatch in one step; a
/// fresh subscription replaces any previous channel. Events emitted with no
/// subscriber installed are permanently dropped.
#[derive(Default)]
pub struct EventDispatcher {
    sender: RwLock<Option<UnboundedSender<SessionEvent>>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a fresh event channel and return its receiving half. From
    /// this point forward every emitted event is forwarded; nothing emitted
    /// earlier is replayed.
    pub fn subscribe(&self) -> UnboundedReceiver<SessionEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.sender.write() = Some(tx);
        rx
    }

    /// Whether a subscriber is installed.
    pub fn is_enabled(&self) -> bool {
        self.sender.read().is_some()
    }

    /// Forward one event to the host, or drop it when dispatch is disabled.
    /// A receiver dropped by the host is tolerated.
    pub fn emit(&self, event: SessionEvent) {
        let sender = self.sender.read();
        match sender.as_ref() {
            Some(tx) => {
                if tx.send(event).is_err() {
                    debug!("event receiver dropped; event discarded");
                }
            }
            None => debug!("dispatch disabled; dropping event {}", event),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_before_subscribe_is_dropped() {
        let dispatcher = EventDispatcher::new();
        assert!(!dispatcher.is_enabled());

        dispatcher.emit(SessionEvent::DiscoveryStarted);

        let mut rx = dispatcher.subscribe();
        assert!(rx.try_recv().is_err(), "no replay of pre-subscribe events");
    }

    #[test]
    fn test_emit_after_subscribe_is_forwarded() {
        let dispatcher = EventDispatcher::new();
        let mut rx = dispatcher.subscribe();
        assert!(dispatcher.is_enabled());

        dispatcher.emit(SessionEvent::AdvertisingStarted);
        assert_eq!(rx.try_recv().unwrap(), SessionEvent::AdvertisingStarted);
    }

    #[test]
    fn test_events_arrive_in_emission_order() {
        let dispatcher = EventDispatcher::new();
        let mut rx = dispatcher.subscribe();

        dispatcher.emit(SessionEvent::EndpointFound {
            endpoint_id: "E1".to_string(),
            endpoint_name: "Alice".to_string(),
        });
        dispatcher.emit(SessionEvent::EndpointLost {
            endpoint_id: "E1".to_string(),
        });

        assert!(matches!(
            rx.try_recv().unwrap(),
            SessionEvent::EndpointFound { .. }
        ));
        assert!(matches!(
            rx.try_recv().unwrap(),
            SessionEvent::EndpointLost { .. }
        ));
    }

    #[test]
    fn test_dropped_receiver_is_tolerated() {
        let dispatcher = EventDispatcher::new();
        let rx = dispatcher.subscribe();
        drop(rx);

        // Must not panic
        dispatcher.emit(SessionEvent::DiscoveryStarted);
    }

    #[test]
    fn test_resubscribe_replaces_channel() {
        let dispatcher = EventDispatcher::new();
        let mut first = dispatcher.subscribe();
        let mut second = dispatcher.subscribe();

        dispatcher.emit(SessionEvent::DiscoveryStarted);
        assert!(first.try_recv().is_err());
        assert_eq!(second.try_recv().unwrap(), SessionEvent::DiscoveryStarted);
    }

    #[test]
    fn test_event_display() {
        let event = SessionEvent::TransferProgress {
            endpoint_id: "E1".to_string(),
            bytes_transferred: 500,
            total_bytes: 1000,
            status: TransferStatus::InProgress,
        };
        let display = event.to_string();
        assert!(display.contains("500/1000"));
        assert!(display.contains("InProgress"));

        let event = SessionEvent::DataReceived {
            endpoint_id: "E1".to_string(),
            data: vec![1, 2, 3],
        };
        assert!(event.to_string().contains("3 bytes"));
    }

    #[test]
    fn test_auth_digits_not_in_display() {
        let event = SessionEvent::ConnectionInitiated {
            endpoint_id: "E1".to_string(),
            auth_digits: "1234".to_string(),
        };
        assert!(!event.to_string().contains("1234"));
    }
}
