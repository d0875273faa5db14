//! In-memory bus backend for tests and simulation
//!
//! Stands in for the OS transport layer: scripted handles per transport,
//! scripted query results per path, and failure injection for the error
//! cases a real bus produces (exclusive holds, permission denials,
//! per-transport platform failures).

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use keydex_core::{DeviceHandle, DeviceInfo, Transport};

use crate::backend::{
    DeviceInfoQuery, EnumerateError, HandleEnumerator, PrivilegeCheck, QueryError,
};

/// Script for one physical key on the fake bus
#[derive(Debug, Clone)]
pub struct FakeDevice {
    /// Handles the bus reports for this key, one per interface
    pub handles: Vec<DeviceHandle>,
    /// Info a live query against any of its handles returns
    pub info: DeviceInfo,
}

impl FakeDevice {
    pub fn with_serial(serial: &str) -> Self {
        Self {
            handles: Vec::new(),
            info: DeviceInfo {
                serial: Some(serial.to_string()),
                version: semver::Version::new(5, 4, 3),
                capabilities: 0,
            },
        }
    }

    pub fn without_serial() -> Self {
        Self {
            handles: Vec::new(),
            info: DeviceInfo {
                serial: None,
                version: semver::Version::new(5, 4, 3),
                capabilities: 0,
            },
        }
    }

    pub fn version(mut self, version: semver::Version) -> Self {
        self.info.version = version;
        self
    }

    pub fn capabilities(mut self, capabilities: u32) -> Self {
        self.info.capabilities = capabilities;
        self
    }

    pub fn handle(mut self, handle: DeviceHandle) -> Self {
        self.handles.push(handle);
        self
    }
}

#[derive(Debug, Default)]
struct FakeBusState {
    /// Listing order per transport follows insertion order
    handles: Vec<DeviceHandle>,
    /// Query result per handle path
    info_by_path: HashMap<String, DeviceInfo>,
    /// Paths currently held exclusively by "another process"
    held_paths: HashSet<String>,
    /// Transports that enumerate with a permission error
    denied_transports: HashSet<Transport>,
    /// Transports that enumerate with a platform error
    failed_transports: HashMap<Transport, String>,
    /// Live-query attempts per path
    open_counts: HashMap<String, usize>,
    elevated: bool,
}

/// The fake bus; implements all three backend traits.
///
/// Interior mutability so the trait methods can take `&self` and the bus
/// can be shared with the engine while tests keep scripting it.
#[derive(Debug, Default)]
pub struct FakeBus {
    state: Mutex<FakeBusState>,
}

impl FakeBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Plug a scripted device into the bus
    pub fn add_device(&self, device: FakeDevice) {
        let mut state = self.state.lock().unwrap();
        for handle in device.handles {
            state
                .info_by_path
                .insert(handle.path.clone(), device.info.clone());
            state.handles.push(handle);
        }
    }

    /// Unplug the interface at `path`
    pub fn remove_path(&self, path: &str) {
        let mut state = self.state.lock().unwrap();
        state.handles.retain(|h| h.path != path);
        state.info_by_path.remove(path);
    }

    /// Make live queries against `path` fail as exclusively held
    pub fn hold_exclusive(&self, path: &str) {
        self.state.lock().unwrap().held_paths.insert(path.to_string());
    }

    /// Release a previous exclusive hold
    pub fn release_exclusive(&self, path: &str) {
        self.state.lock().unwrap().held_paths.remove(path);
    }

    /// Make enumeration of `transport` fail with a permission error
    pub fn deny_transport(&self, transport: Transport) {
        self.state.lock().unwrap().denied_transports.insert(transport);
    }

    /// Make enumeration of `transport` fail with a platform error
    pub fn fail_transport(&self, transport: Transport, message: &str) {
        self.state
            .lock()
            .unwrap()
            .failed_transports
            .insert(transport, message.to_string());
    }

    pub fn set_elevated(&self, elevated: bool) {
        self.state.lock().unwrap().elevated = elevated;
    }

    /// Number of live-query attempts made against `path`
    pub fn open_count(&self, path: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .open_counts
            .get(path)
            .copied()
            .unwrap_or(0)
    }
}

impl HandleEnumerator for FakeBus {
    fn list_handles(&self, transport: Transport) -> Result<Vec<DeviceHandle>, EnumerateError> {
        let state = self.state.lock().unwrap();
        if state.denied_transports.contains(&transport) {
            return Err(EnumerateError::PermissionDenied(transport));
        }
        if let Some(message) = state.failed_transports.get(&transport) {
            return Err(EnumerateError::Platform {
                transport,
                message: message.clone(),
            });
        }
        Ok(state
            .handles
            .iter()
            .filter(|h| h.transport == transport)
            .cloned()
            .collect())
    }
}

impl DeviceInfoQuery for FakeBus {
    fn open(&self, handle: &DeviceHandle) -> Result<DeviceInfo, QueryError> {
        let mut state = self.state.lock().unwrap();
        *state.open_counts.entry(handle.path.clone()).or_insert(0) += 1;

        if state.held_paths.contains(&handle.path) {
            return Err(QueryError::ExclusivelyHeld(handle.path.clone()));
        }
        state
            .info_by_path
            .get(&handle.path)
            .cloned()
            .ok_or_else(|| QueryError::Session(format!("no device at {}", handle.path)))
    }
}

impl PrivilegeCheck for FakeBus {
    fn is_elevated(&self) -> bool {
        self.state.lock().unwrap().elevated
    }
}
