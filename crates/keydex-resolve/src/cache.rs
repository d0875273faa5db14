//! Identity cache: the registry of known composite devices
//!
//! Maps registry IDs to composite devices plus a per-pass "seen" marker.
//! Owned by the resolution engine and mutated only under its exclusive
//! lock; the lookup helpers here back the three resolution tiers.

use std::collections::HashMap;

use keydex_core::{CompositeDevice, DeviceHandle, RegistryId};

/// One cached device with its per-pass marker
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub device: CompositeDevice,
    /// Whether the device matched a handle in the current pass
    pub seen: bool,
}

/// Registry of known composite devices
#[derive(Debug, Default)]
pub struct IdentityCache {
    entries: HashMap<RegistryId, CacheEntry>,
}

impl IdentityCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry (full-rescan refresh)
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Reset all "seen" markers (incremental refresh)
    pub fn reset_seen(&mut self) {
        for entry in self.entries.values_mut() {
            entry.seen = false;
        }
    }

    /// Register a newly created device, marked seen
    pub fn insert(&mut self, device: CompositeDevice) -> RegistryId {
        let id = device.id;
        self.entries.insert(id, CacheEntry { device, seen: true });
        id
    }

    pub fn mark_seen(&mut self, id: RegistryId) {
        if let Some(entry) = self.entries.get_mut(&id) {
            entry.seen = true;
        }
    }

    /// Mutable access to a cached device for absorb/attach updates
    pub fn device_mut(&mut self, id: RegistryId) -> Option<&mut CompositeDevice> {
        self.entries.get_mut(&id).map(|e| &mut e.device)
    }

    /// Tier 1: device already holding a structurally equal handle
    pub fn find_structural(&self, handle: &DeviceHandle) -> Option<RegistryId> {
        self.entries
            .values()
            .find(|e| e.device.contains_handle(handle))
            .map(|e| e.device.id)
    }

    /// Tier 2: device holding a handle with the same USB parent
    pub fn find_by_parent(&self, handle: &DeviceHandle) -> Option<RegistryId> {
        self.entries
            .values()
            .find(|e| e.device.shares_parent(handle))
            .map(|e| e.device.id)
    }

    /// Tier 3: device that reported this serial in an earlier query
    pub fn find_by_serial(&self, serial: &str) -> Option<RegistryId> {
        self.entries
            .values()
            .find(|e| e.device.serial() == Some(serial))
            .map(|e| e.device.id)
    }

    /// Remove entries not seen in the last pass, returning how many
    pub fn prune_unseen(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, e| e.seen);
        before - self.entries.len()
    }

    /// Read-only snapshot of all cached devices
    pub fn snapshot(&self) -> Vec<CompositeDevice> {
        self.entries.values().map(|e| e.device.clone()).collect()
    }
}
