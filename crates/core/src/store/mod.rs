//! Local transactional store for favorites, pending writes and the push
//! registration mirror.
//!
//! Backed by SQLite through tokio-rusqlite: every operation runs on the
//! connection's background thread inside a single `call`, so each logical
//! operation is one atomic unit. Multi-statement operations open an explicit
//! transaction.

pub mod connection;
pub mod favorites;
pub mod migrations;
pub mod pending;
pub mod subscription;

pub use connection::Store;
pub use favorites::{FavoriteSort, SortOrder};

use chrono::{DateTime, Utc};
use tokio_rusqlite::rusqlite::{self, Row, types::Type};

/// Read an RFC 3339 text column as a UTC timestamp.
pub(crate) fn timestamp_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}
