//! Backend traits the resolution engine is generic over

use keydex_core::{DeviceHandle, DeviceInfo, Transport};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EnumerateError {
    /// The process lacks the privilege to enumerate this transport.
    /// Non-fatal: the engine treats it as "no devices on this transport".
    #[error("permission denied enumerating {0} handles")]
    PermissionDenied(Transport),
    /// Transport enumeration itself failed; other transports still proceed.
    #[error("platform error enumerating {transport}: {message}")]
    Platform {
        transport: Transport,
        message: String,
    },
}

#[derive(Error, Debug)]
pub enum QueryError {
    /// The interface is open exclusively in another process
    #[error("device {0} is exclusively held by another process")]
    ExclusivelyHeld(String),
    /// Transient platform or session error while talking to the device
    #[error("session error: {0}")]
    Session(String),
}

/// Lists raw OS handles for one transport at a time
pub trait HandleEnumerator {
    fn list_handles(&self, transport: Transport) -> Result<Vec<DeviceHandle>, EnumerateError>;
}

/// Opens a short-lived session against a handle and reads identifying info
pub trait DeviceInfoQuery {
    fn open(&self, handle: &DeviceHandle) -> Result<DeviceInfo, QueryError>;
}

/// Reports whether the current process runs elevated
pub trait PrivilegeCheck {
    fn is_elevated(&self) -> bool;
}

impl<T: HandleEnumerator + ?Sized> HandleEnumerator for std::sync::Arc<T> {
    fn list_handles(&self, transport: Transport) -> Result<Vec<DeviceHandle>, EnumerateError> {
        (**self).list_handles(transport)
    }
}

impl<T: DeviceInfoQuery + ?Sized> DeviceInfoQuery for std::sync::Arc<T> {
    fn open(&self, handle: &DeviceHandle) -> Result<DeviceInfo, QueryError> {
        (**self).open(handle)
    }
}

impl<T: PrivilegeCheck + ?Sized> PrivilegeCheck for std::sync::Arc<T> {
    fn is_elevated(&self) -> bool {
        (**self).is_elevated()
    }
}

/// Default privilege probe.
///
/// No platform probe is wired in, so this answers conservatively: on Unix
/// an effective-uid-zero check would go here, elsewhere assume unelevated
/// and let the engine skip elevation-gated transports with a warning.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessPrivilege;

impl PrivilegeCheck for ProcessPrivilege {
    fn is_elevated(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_privilege_is_unelevated() {
        assert!(!ProcessPrivilege.is_elevated());
    }

    #[test]
    fn test_error_display() {
        let err = EnumerateError::PermissionDenied(Transport::HidFido);
        assert!(err.to_string().contains("hid-fido"));

        let err = QueryError::ExclusivelyHeld("reader-0".to_string());
        assert!(err.to_string().contains("reader-0"));
    }
}
