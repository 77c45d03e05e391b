//! Response cache generations stored alongside the persistent store.
//!
//! This module provides:
//!
//! - Request-addressed keys (SHA-256 of method and URL)
//! - Named generations that are replaced wholesale, never pruned
//! - Atomic bulk insertion for install-time pre-caching

pub mod generations;
pub mod hash;

pub use generations::CachedResponse;
pub use hash::compute_request_key;
