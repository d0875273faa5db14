//! Raw device handles as reported by the OS transport layer

use serde::{Deserialize, Serialize};

/// Communication channel kind a device interface can expose
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// Keyboard-emulation OTP interface over USB HID
    HidOtp,
    /// FIDO/U2F interface over USB HID
    HidFido,
    /// CCID smart-card interface
    SmartCard,
}

impl Transport {
    /// All known transports, in enumeration order
    pub const ALL: [Transport; 3] = [Transport::HidOtp, Transport::HidFido, Transport::SmartCard];

    /// Whether enumerating this transport needs an elevated process.
    ///
    /// FIDO HID handles are only visible to administrators on some
    /// platforms; the other transports enumerate unprivileged.
    pub fn requires_elevation(&self) -> bool {
        matches!(self, Transport::HidFido)
    }
}

impl std::fmt::Display for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Transport::HidOtp => write!(f, "hid-otp"),
            Transport::HidFido => write!(f, "hid-fido"),
            Transport::SmartCard => write!(f, "smartcard"),
        }
    }
}

/// Identifier of the USB composite parent a handle hangs off
///
/// Two handles sharing a parent belong to the same physical key even when
/// the OS reports them as unrelated device nodes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParentId(pub String);

impl ParentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ParentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One OS-visible interface of a physical security key
///
/// Immutable once produced by an enumerator; absorbed into a
/// [`CompositeDevice`](crate::CompositeDevice) during resolution.
/// Structural equality is full field equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceHandle {
    /// Transport kind of this interface
    pub transport: Transport,
    /// Opaque OS path or identifier for the interface
    pub path: String,
    /// USB composite-parent identifier, when the platform reports one
    pub parent_id: Option<ParentId>,
}

impl DeviceHandle {
    /// Create a handle without parent topology information
    pub fn new(transport: Transport, path: impl Into<String>) -> Self {
        Self {
            transport,
            path: path.into(),
            parent_id: None,
        }
    }

    /// Create a handle with a known USB parent
    pub fn with_parent(
        transport: Transport,
        path: impl Into<String>,
        parent: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            path: path.into(),
            parent_id: Some(ParentId::new(parent)),
        }
    }

    /// Whether this handle and `other` hang off the same USB parent
    pub fn same_parent(&self, other: &DeviceHandle) -> bool {
        match (&self.parent_id, &other.parent_id) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }
}

impl std::fmt::Display for DeviceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.transport, self.path)
    }
}
