//! Core types and shared functionality for the storyline offline core.
//!
//! This crate provides:
//! - The local transactional store (favorites, pending writes, push registration)
//! - Response cache generations on the same SQLite backend
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod error;
pub mod model;
pub mod store;

pub use cache::CachedResponse;
pub use config::{AppConfig, ConfigError};
pub use error::{Error, ErrorKind};
pub use model::{Favorite, NewPendingWrite, PendingWrite, PushSubscription, Story};
pub use store::{FavoriteSort, SortOrder, Store};
