//! Composite devices: the merged view of one physical security key

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

use crate::handle::{DeviceHandle, Transport};

/// Capability flags a device can report in its info block
pub mod capability {
    pub const CAP_OTP: u32 = 0x01;
    pub const CAP_FIDO2: u32 = 0x02;
    pub const CAP_PIV: u32 = 0x04;
    pub const CAP_OATH: u32 = 0x08;
    pub const CAP_OPENPGP: u32 = 0x10;
}

/// Stable registry identifier for a composite device
///
/// Identifies a cache entry for the lifetime of the process; unrelated to
/// the physical identity key, which is derived from serial or handle set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RegistryId(pub Uuid);

impl RegistryId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for RegistryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifying metadata returned by a successful live query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Device serial number; some devices do not report one
    pub serial: Option<String>,
    /// Firmware version
    pub version: semver::Version,
    /// Capability bitmask, see [`capability`]
    pub capabilities: u32,
}

impl DeviceInfo {
    pub fn has_capability(&self, cap: u32) -> bool {
        self.capabilities & cap != 0
    }
}

/// Derived identity of a composite device
///
/// Serial number when known, otherwise the structural identity of the
/// absorbed handle set. Two composites denote the same physical key iff
/// their identity keys are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IdentityKey {
    /// Device-reported serial number
    Serial(String),
    /// Transport/path pairs of the handle set, order-independent
    Structural(BTreeSet<(Transport, String)>),
}

/// One physical security key, aggregated across all its interfaces
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositeDevice {
    /// Stable registry identifier
    pub id: RegistryId,
    /// Absorbed handles, in discovery order, at most one per structural identity
    pub handles: Vec<DeviceHandle>,
    /// Cached info from the last successful live query
    pub info: Option<DeviceInfo>,
    /// When the device was first resolved
    pub first_seen: DateTime<Utc>,
    /// When the device last matched a handle in a pass
    pub last_seen: DateTime<Utc>,
}

impl CompositeDevice {
    /// Create a composite device around its first discovered handle
    pub fn new(handle: DeviceHandle) -> Self {
        let now = Utc::now();
        Self {
            id: RegistryId::generate(),
            handles: vec![handle],
            info: None,
            first_seen: now,
            last_seen: now,
        }
    }

    /// Create a composite device with info already attached
    pub fn with_info(handle: DeviceHandle, info: DeviceInfo) -> Self {
        let mut device = Self::new(handle);
        device.info = Some(info);
        device
    }

    /// Add a handle to the set unless a structurally equal one is present.
    ///
    /// Never removes previously absorbed handles.
    pub fn absorb(&mut self, handle: DeviceHandle) {
        if !self.contains_handle(&handle) {
            self.handles.push(handle);
        }
    }

    /// Replace the cached device info wholesale
    pub fn attach_info(&mut self, info: DeviceInfo) {
        self.info = Some(info);
    }

    /// Refresh the last-seen timestamp
    pub fn touch(&mut self) {
        self.last_seen = Utc::now();
    }

    /// Whether a structurally equal handle has been absorbed
    pub fn contains_handle(&self, handle: &DeviceHandle) -> bool {
        self.handles.contains(handle)
    }

    /// Whether any absorbed handle shares `handle`'s USB parent
    pub fn shares_parent(&self, handle: &DeviceHandle) -> bool {
        self.handles.iter().any(|h| h.same_parent(handle))
    }

    /// Serial number, when a live query has reported one
    pub fn serial(&self) -> Option<&str> {
        self.info.as_ref().and_then(|i| i.serial.as_deref())
    }

    /// Derived identity key, see [`IdentityKey`]
    pub fn identity_key(&self) -> IdentityKey {
        match self.serial() {
            Some(serial) => IdentityKey::Serial(serial.to_string()),
            None => IdentityKey::Structural(
                self.handles
                    .iter()
                    .map(|h| (h.transport, h.path.clone()))
                    .collect(),
            ),
        }
    }

    /// Human-readable name for logs and listings
    pub fn display_name(&self) -> String {
        match self.serial() {
            Some(serial) => format!("Security key {}", serial),
            None => "Security key (no serial)".to_string(),
        }
    }
}
