//! Keydex Resolve - Identity resolution and merge engine
//!
//! Takes the raw per-interface handles an enumerator reports and collapses
//! them into one [`CompositeDevice`](keydex_core::CompositeDevice) per
//! physical security key. Resolution runs a three-tier ladder per handle:
//! structural match against known devices, topological match on shared USB
//! parent, then a live query for the device serial. Known identities are
//! reused across passes via the identity cache.

pub mod cache;
pub mod config;
pub mod engine;

pub use cache::{CacheEntry, IdentityCache};
pub use config::{load_config, RefreshMode, ResolverConfig};
pub use engine::{EngineError, ResolutionEngine};
