//! Keydex Query - Transport enumeration and live device queries
//!
//! This crate defines the narrow interfaces the resolution engine consumes:
//! listing raw device handles per transport, opening a short-lived session
//! to read identifying info, and probing process privilege. Real OS
//! backends live behind these traits; the in-memory [`FakeBus`] backend is
//! what ships here and is used for tests and simulation.

pub mod backend;
pub mod fake;

pub use backend::{
    DeviceInfoQuery, EnumerateError, HandleEnumerator, PrivilegeCheck, ProcessPrivilege,
    QueryError,
};
pub use fake::{FakeBus, FakeDevice};
