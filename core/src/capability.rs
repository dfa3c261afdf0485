//! Capability gate
//!
//! Checks and requests the platform permission set the proximity transport
//! needs before any role or connection command proceeds. Pure precondition
//! layer: no state machine, no retries. The host re-invokes the check/request
//! pair as needed.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// Platform API level that introduced the granular Bluetooth capabilities.
pub const API_LEVEL_GRANULAR_BLUETOOTH: u32 = 31;

/// Platform API level that introduced the nearby Wi-Fi devices capability.
pub const API_LEVEL_NEARBY_WIFI: u32 = 33;

/// One grantable platform capability the transport depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Capability {
    ChangeWifiState,
    FineLocation,
    CoarseLocation,
    BluetoothAdmin,
    Bluetooth,
    /// Only required on API >= 33
    NearbyWifiDevices,
    /// Only required on API >= 31
    BluetoothScan,
    /// Only required on API >= 31
    BluetoothConnect,
    /// Only required on API >= 31
    BluetoothAdvertise,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::ChangeWifiState => write!(f, "ChangeWifiState"),
            Capability::FineLocation => write!(f, "FineLocation"),
            Capability::CoarseLocation => write!(f, "CoarseLocation"),
            Capability::BluetoothAdmin => write!(f, "BluetoothAdmin"),
            Capability::Bluetooth => write!(f, "Bluetooth"),
            Capability::NearbyWifiDevices => write!(f, "NearbyWifiDevices"),
            Capability::BluetoothScan => write!(f, "BluetoothScan"),
            Capability::BluetoothConnect => write!(f, "BluetoothConnect"),
            Capability::BluetoothAdvertise => write!(f, "BluetoothAdvertise"),
        }
    }
}

/// The capability set required at a given platform API level. Newer levels
/// fold in the proximity capabilities they introduced; older levels must not
/// require them.
pub fn required_capabilities(api_level: u32) -> Vec<Capability> {
    let mut caps = vec![
        Capability::ChangeWifiState,
        Capability::FineLocation,
        Capability::CoarseLocation,
        Capability::BluetoothAdmin,
        Capability::Bluetooth,
    ];

    if api_level >= API_LEVEL_NEARBY_WIFI {
        caps.push(Capability::NearbyWifiDevices);
    }

    if api_level >= API_LEVEL_GRANULAR_BLUETOOTH {
        caps.push(Capability::BluetoothScan);
        caps.push(Capability::BluetoothConnect);
        caps.push(Capability::BluetoothAdvertise);
    }

    caps
}

/// Platform-side grant state and request entry point, injected by the host.
///
/// `request` receives only the not-yet-granted subset, batched into a single
/// call; the gate never issues it with an empty slice.
pub trait CapabilityHost: Send + Sync {
    /// The platform API level used to compute the required set
    fn api_level(&self) -> u32;

    /// Whether the given capability is currently granted
    fn is_granted(&self, capability: Capability) -> bool;

    /// Prompt the platform to grant the given capabilities, as one batch
    fn request(&self, capabilities: &[Capability]);
}

/// Synchronous check/request pair over a [`CapabilityHost`].
#[derive(Clone)]
pub struct CapabilityGate {
    host: Arc<dyn CapabilityHost>,
}

impl CapabilityGate {
    pub fn new(host: Arc<dyn CapabilityHost>) -> Self {
        Self { host }
    }

    /// The required capabilities not currently granted.
    pub fn missing_capabilities(&self) -> Vec<Capability> {
        required_capabilities(self.host.api_level())
            .into_iter()
            .filter(|cap| !self.host.is_granted(*cap))
            .collect()
    }

    /// True only when every capability in the required set is granted.
    /// Logs each missing capability; no other side effects.
    pub fn has_capabilities(&self) -> bool {
        let missing = self.missing_capabilities();
        for cap in &missing {
            warn!("capability {} not granted", cap);
        }
        missing.is_empty()
    }

    /// Issue one batched request for the missing subset. No-op when nothing
    /// is missing; no retries.
    pub fn request_capabilities(&self) {
        let missing = self.missing_capabilities();
        if missing.is_empty() {
            return;
        }
        self.host.request(&missing);
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct FakeHost {
        api_level: u32,
        granted: Vec<Capability>,
        requests: Mutex<Vec<Vec<Capability>>>,
    }

    impl FakeHost {
        fn new(api_level: u32, granted: Vec<Capability>) -> Self {
            Self {
                api_level,
                granted,
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    impl CapabilityHost for FakeHost {
        fn api_level(&self) -> u32 {
            self.api_level
        }

        fn is_granted(&self, capability: Capability) -> bool {
            self.granted.contains(&capability)
        }

        fn request(&self, capabilities: &[Capability]) {
            self.requests.lock().push(capabilities.to_vec());
        }
    }

    #[test]
    fn test_required_set_on_legacy_api_level() {
        let caps = required_capabilities(29);
        assert_eq!(caps.len(), 5);
        assert!(!caps.contains(&Capability::BluetoothScan));
        assert!(!caps.contains(&Capability::NearbyWifiDevices));
    }

    #[test]
    fn test_required_set_folds_in_granular_bluetooth() {
        let caps = required_capabilities(31);
        assert!(caps.contains(&Capability::BluetoothScan));
        assert!(caps.contains(&Capability::BluetoothConnect));
        assert!(caps.contains(&Capability::BluetoothAdvertise));
        assert!(!caps.contains(&Capability::NearbyWifiDevices));
    }

    #[test]
    fn test_required_set_folds_in_nearby_wifi() {
        let caps = required_capabilities(34);
        assert!(caps.contains(&Capability::NearbyWifiDevices));
        assert!(caps.contains(&Capability::BluetoothScan));
        assert_eq!(caps.len(), 9);
    }

    #[test]
    fn test_has_capabilities_all_granted() {
        let host = Arc::new(FakeHost::new(29, required_capabilities(29)));
        let gate = CapabilityGate::new(host);
        assert!(gate.has_capabilities());
        assert!(gate.missing_capabilities().is_empty());
    }

    #[test]
    fn test_has_capabilities_reports_missing() {
        let mut granted = required_capabilities(31);
        granted.retain(|c| *c != Capability::BluetoothScan);
        let host = Arc::new(FakeHost::new(31, granted));
        let gate = CapabilityGate::new(host);

        assert!(!gate.has_capabilities());
        assert_eq!(gate.missing_capabilities(), vec![Capability::BluetoothScan]);
    }

    #[test]
    fn test_request_is_noop_when_fully_granted() {
        let host = Arc::new(FakeHost::new(29, required_capabilities(29)));
        let gate = CapabilityGate::new(host.clone());

        gate.request_capabilities();
        assert!(host.requests.lock().is_empty());
    }

    #[test]
    fn test_request_batches_only_missing() {
        let host = Arc::new(FakeHost::new(
            33,
            vec![Capability::ChangeWifiState, Capability::Bluetooth],
        ));
        let gate = CapabilityGate::new(host.clone());

        gate.request_capabilities();
        let requests = host.requests.lock();
        assert_eq!(requests.len(), 1);
        assert!(!requests[0].contains(&Capability::Bluetooth));
        assert!(requests[0].contains(&Capability::NearbyWifiDevices));
        assert!(requests[0].contains(&Capability::FineLocation));
    }
}
