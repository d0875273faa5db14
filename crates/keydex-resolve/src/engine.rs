//! Resolution engine: one enumeration pass over the bus
//!
//! The whole enumerate-and-merge sequence runs under the cache's exclusive
//! lock, so concurrent callers serialize completely. Per-handle and
//! per-transport failures are logged and recovered locally; the only fatal
//! error is losing the lock primitive itself.

use std::sync::Mutex;

use keydex_core::{CompositeDevice, DeviceHandle};
use keydex_query::{
    DeviceInfoQuery, EnumerateError, HandleEnumerator, PrivilegeCheck, QueryError,
};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::cache::IdentityCache;
use crate::config::{RefreshMode, ResolverConfig};

#[derive(Error, Debug)]
pub enum EngineError {
    /// The cache lock was poisoned by a panicking pass; unrecoverable
    #[error("identity cache lock poisoned")]
    CachePoisoned,
}

/// The identity-resolution and merge engine.
///
/// Generic over its collaborators so tests inject a scripted bus; share
/// across threads via `Arc`. Configuration is fixed at construction.
pub struct ResolutionEngine<E, Q, P> {
    config: ResolverConfig,
    cache: Mutex<IdentityCache>,
    enumerator: E,
    query: Q,
    privilege: P,
}

impl<E, Q, P> ResolutionEngine<E, Q, P>
where
    E: HandleEnumerator,
    Q: DeviceInfoQuery,
    P: PrivilegeCheck,
{
    pub fn new(config: ResolverConfig, enumerator: E, query: Q, privilege: P) -> Self {
        Self {
            config,
            cache: Mutex::new(IdentityCache::new()),
            enumerator,
            query,
            privilege,
        }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Run one enumeration pass and return the current device set.
    ///
    /// Handles are processed in enumerator order; per handle the ladder
    /// stops at the first matching tier. The returned devices are clones;
    /// mutating them does not touch the cache.
    pub fn enumerate(&self) -> Result<Vec<CompositeDevice>, EngineError> {
        let mut cache = self.cache.lock().map_err(|_| EngineError::CachePoisoned)?;

        match self.config.refresh {
            RefreshMode::Incremental => cache.reset_seen(),
            RefreshMode::FullRescan => cache.clear(),
        }

        let mut resolved = 0usize;
        for &transport in &self.config.transports {
            if transport.requires_elevation() && !self.privilege.is_elevated() {
                warn!(transport = %transport, "Skipping transport: process is not elevated");
                continue;
            }

            let handles = match self.enumerator.list_handles(transport) {
                Ok(handles) => handles,
                Err(EnumerateError::PermissionDenied(t)) => {
                    warn!(transport = %t, "Permission denied, treating as no devices");
                    continue;
                }
                Err(EnumerateError::Platform { transport, message }) => {
                    error!(transport = %transport, error = %message, "Transport enumeration failed");
                    continue;
                }
            };

            debug!(transport = %transport, count = handles.len(), "Enumerated handles");
            for handle in handles {
                if self.resolve_handle(&mut cache, handle) {
                    resolved += 1;
                }
            }
        }

        let devices = cache.snapshot();
        info!(
            resolved = resolved,
            total = devices.len(),
            "Enumeration pass complete"
        );
        Ok(devices)
        // MutexGuard drops here on every path, releasing the lock
    }

    /// Three-tier ladder for one raw handle; true if it resolved to a device
    fn resolve_handle(&self, cache: &mut IdentityCache, handle: DeviceHandle) -> bool {
        // Tier 1: the handle is already part of a known device
        if let Some(id) = cache.find_structural(&handle) {
            debug!(device = %id, handle = %handle, "Structural match");
            if let Some(device) = cache.device_mut(id) {
                device.touch();
            }
            cache.mark_seen(id);
            return true;
        }

        // Tier 2: a known device hangs off the same USB parent
        if let Some(id) = cache.find_by_parent(&handle) {
            debug!(device = %id, handle = %handle, "Topological match on shared parent");
            if let Some(device) = cache.device_mut(id) {
                device.absorb(handle);
                device.touch();
            }
            cache.mark_seen(id);
            return true;
        }

        // Tier 3: open a live session and match by reported serial
        let device_info = match self.query.open(&handle) {
            Ok(device_info) => device_info,
            Err(QueryError::ExclusivelyHeld(path)) => {
                warn!(handle = %path, "Interface exclusively held, skipping this pass");
                return false;
            }
            Err(err) => {
                warn!(handle = %handle, error = %err, "Live query failed, skipping this pass");
                return false;
            }
        };

        match device_info.serial.clone() {
            Some(serial) => {
                if let Some(id) = cache.find_by_serial(&serial) {
                    debug!(device = %id, serial = %serial, handle = %handle, "Serial match");
                    if let Some(device) = cache.device_mut(id) {
                        device.absorb(handle);
                        device.attach_info(device_info);
                        device.touch();
                    }
                    cache.mark_seen(id);
                } else {
                    let device = CompositeDevice::with_info(handle, device_info);
                    info!(device = %device.id, serial = %serial, "New device");
                    cache.insert(device);
                }
            }
            // No serial: irreducibly new, never merged with anything
            None => {
                let device = CompositeDevice::with_info(handle, device_info);
                info!(device = %device.id, "New device without serial");
                cache.insert(device);
            }
        }
        true
    }

    /// Snapshot the cached devices without running a pass
    pub fn devices(&self) -> Result<Vec<CompositeDevice>, EngineError> {
        let cache = self.cache.lock().map_err(|_| EngineError::CachePoisoned)?;
        Ok(cache.snapshot())
    }

    /// Drop devices that did not match any handle in the last incremental
    /// pass, returning how many were removed
    pub fn prune_unseen(&self) -> Result<usize, EngineError> {
        let mut cache = self.cache.lock().map_err(|_| EngineError::CachePoisoned)?;
        let pruned = cache.prune_unseen();
        if pruned > 0 {
            info!(count = pruned, "Pruned unseen devices");
        }
        Ok(pruned)
    }
}
