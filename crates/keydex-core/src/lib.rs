//! Keydex Core - Core types for security-key discovery
//!
//! This crate provides the foundational types for the keydex system:
//! - Device handles as reported by the OS, one per exposed interface
//! - Composite devices that merge all interfaces of one physical key
//! - Device info returned by live queries (serial, firmware, capabilities)

pub mod device;
pub mod handle;

pub use device::{capability, CompositeDevice, DeviceInfo, IdentityKey, RegistryId};
pub use handle::{DeviceHandle, ParentId, Transport};
