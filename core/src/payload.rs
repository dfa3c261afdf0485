//! Payload transfer bookkeeping
//!
//! Tracks one live transfer per connected endpoint: created on the first
//! progress update, monotonically advanced, destroyed at terminal status.
//! Interpretation of the terminal status is the host's responsibility; the
//! session forwards every update verbatim.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::endpoint::EndpointId;

// ============================================================================
// STATUS
// ============================================================================

/// Status of one payload transfer, as the transport reports it.
///
/// Codes an unknown transport revision might add are preserved verbatim in
/// [`TransferStatus::Unknown`] rather than dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferStatus {
    Success,
    Failure,
    InProgress,
    Canceled,
    Unknown(i32),
}

impl TransferStatus {
    /// Decode the transport's wire code.
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => TransferStatus::Success,
            2 => TransferStatus::Failure,
            3 => TransferStatus::InProgress,
            4 => TransferStatus::Canceled,
            other => TransferStatus::Unknown(other),
        }
    }

    /// The transport's wire code for this status.
    pub fn code(&self) -> i32 {
        match self {
            TransferStatus::Success => 1,
            TransferStatus::Failure => 2,
            TransferStatus::InProgress => 3,
            TransferStatus::Canceled => 4,
            TransferStatus::Unknown(code) => *code,
        }
    }

    /// Whether this status ends the transfer.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransferStatus::InProgress)
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferStatus::Success => write!(f, "Success"),
            TransferStatus::Failure => write!(f, "Failure"),
            TransferStatus::InProgress => write!(f, "InProgress"),
            TransferStatus::Canceled => write!(f, "Canceled"),
            TransferStatus::Unknown(code) => write!(f, "Unknown({})", code),
        }
    }
}

// ============================================================================
// PROGRESS
// ============================================================================

/// Snapshot of one in-flight transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferProgress {
    pub bytes_transferred: u64,
    pub total_bytes: u64,
    pub status: TransferStatus,
}

// ============================================================================
// LEDGER
// ============================================================================

/// Per-endpoint record of the transfer currently in flight.
///
/// One atomic payload is exchanged at a time per endpoint, so the record is
/// keyed by endpoint id. `bytes_transferred` never moves backwards within a
/// transfer's lifetime; a stale out-of-order update is clamped to the level
/// already reached.
#[derive(Default)]
pub struct TransferLedger {
    transfers: RwLock<HashMap<EndpointId, TransferProgress>>,
}

impl TransferLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one progress update and return the record as it should be
    /// forwarded. Terminal statuses destroy the record.
    pub fn record(
        &self,
        endpoint_id: &str,
        bytes_transferred: u64,
        total_bytes: u64,
        status: TransferStatus,
    ) -> TransferProgress {
        let mut transfers = self.transfers.write();

        let bytes = match transfers.get(endpoint_id) {
            Some(existing) => existing.bytes_transferred.max(bytes_transferred),
            None => bytes_transferred,
        };

        let progress = TransferProgress {
            bytes_transferred: bytes,
            total_bytes,
            status,
        };

        if status.is_terminal() {
            transfers.remove(endpoint_id);
        } else {
            transfers.insert(endpoint_id.to_string(), progress.clone());
        }

        progress
    }

    /// The live transfer for an endpoint, if one is in flight.
    pub fn active(&self, endpoint_id: &str) -> Option<TransferProgress> {
        self.transfers.read().get(endpoint_id).cloned()
    }

    /// Drop the live record for an endpoint, if any. Used when the link goes
    /// down with a transfer still in flight.
    pub fn clear(&self, endpoint_id: &str) {
        self.transfers.write().remove(endpoint_id);
    }

    /// Number of transfers currently in flight across all endpoints.
    pub fn in_flight(&self) -> usize {
        self.transfers.read().len()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_from_code() {
        assert_eq!(TransferStatus::from_code(1), TransferStatus::Success);
        assert_eq!(TransferStatus::from_code(2), TransferStatus::Failure);
        assert_eq!(TransferStatus::from_code(3), TransferStatus::InProgress);
        assert_eq!(TransferStatus::from_code(4), TransferStatus::Canceled);
        assert_eq!(TransferStatus::from_code(99), TransferStatus::Unknown(99));
    }

    #[test]
    fn test_status_code_round_trip() {
        for code in [1, 2, 3, 4, 99, -7] {
            assert_eq!(TransferStatus::from_code(code).code(), code);
        }
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(TransferStatus::Success.is_terminal());
        assert!(TransferStatus::Failure.is_terminal());
        assert!(TransferStatus::Canceled.is_terminal());
        assert!(TransferStatus::Unknown(42).is_terminal());
        assert!(!TransferStatus::InProgress.is_terminal());
    }

    #[test]
    fn test_record_creates_and_advances() {
        let ledger = TransferLedger::new();

        let p = ledger.record("E1", 500, 1000, TransferStatus::InProgress);
        assert_eq!(p.bytes_transferred, 500);
        assert_eq!(ledger.in_flight(), 1);

        let p = ledger.record("E1", 750, 1000, TransferStatus::InProgress);
        assert_eq!(p.bytes_transferred, 750);
        assert_eq!(ledger.active("E1").unwrap().bytes_transferred, 750);
    }

    #[test]
    fn test_record_clamps_regressing_bytes() {
        let ledger = TransferLedger::new();
        ledger.record("E1", 800, 1000, TransferStatus::InProgress);

        let p = ledger.record("E1", 300, 1000, TransferStatus::InProgress);
        assert_eq!(p.bytes_transferred, 800);
    }

    #[test]
    fn test_terminal_status_destroys_record() {
        let ledger = TransferLedger::new();
        ledger.record("E1", 500, 1000, TransferStatus::InProgress);

        let p = ledger.record("E1", 1000, 1000, TransferStatus::Success);
        assert_eq!(p.bytes_transferred, 1000);
        assert_eq!(p.status, TransferStatus::Success);
        assert!(ledger.active("E1").is_none());
        assert_eq!(ledger.in_flight(), 0);
    }

    #[test]
    fn test_independent_endpoints() {
        let ledger = TransferLedger::new();
        ledger.record("E1", 100, 1000, TransferStatus::InProgress);
        ledger.record("E2", 200, 500, TransferStatus::InProgress);

        assert_eq!(ledger.in_flight(), 2);
        ledger.record("E1", 1000, 1000, TransferStatus::Success);
        assert_eq!(ledger.in_flight(), 1);
        assert_eq!(ledger.active("E2").unwrap().bytes_transferred, 200);
    }

    #[test]
    fn test_clear_drops_in_flight_record() {
        let ledger = TransferLedger::new();
        ledger.record("E1", 100, 1000, TransferStatus::InProgress);

        ledger.clear("E1");
        assert!(ledger.active("E1").is_none());

        // Clearing an endpoint with nothing in flight is harmless
        ledger.clear("E1");
    }
}
