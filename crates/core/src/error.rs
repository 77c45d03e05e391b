//! Unified error types for the offline core.
//!
//! Every variant belongs to one [`ErrorKind`], which callers use to decide
//! between degrading (reads) and reporting (writes).

use tokio_rusqlite::rusqlite;

/// Unified error type for the store, cache router and reconciler.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid input parameters (e.g., empty description).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// A favorite with this story id is already stored.
    #[error("FAVORITE_EXISTS: {0}")]
    FavoriteExists(String),

    /// No cached response for the request and the network was unreachable.
    #[error("CACHE_MISS: {0}")]
    CacheMiss(String),

    /// Database operation failed.
    #[error("STORE_ERROR: {0}")]
    Database(tokio_rusqlite::Error),

    /// Migration failed to apply.
    #[error("STORE_ERROR: migration failed: {0}")]
    MigrationFailed(String),

    /// Stored data could not be encoded or decoded.
    #[error("STORE_ERROR: serialization failed: {0}")]
    Serialization(String),

    /// Invalid URL.
    #[error("INVALID_URL: {0}")]
    InvalidUrl(String),

    /// Transport-level failure (DNS, connect, reset, timeout).
    #[error("NETWORK_ERROR: {0}")]
    Network(String),

    /// HTTP error response.
    #[error("HTTP_ERROR: {0}")]
    HttpError(String),

    /// Remote API answered with `error: true`.
    #[error("API_ERROR: {0}")]
    Api(String),

    /// Pre-caching the shell manifest failed.
    #[error("INSTALL_FAILED: {0}")]
    InstallFailed(String),
}

/// Coarse classification of [`Error`] values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Transport error or non-success status; recoverable by cache fallback or deferral.
    Network,
    /// Store constraint violation such as a duplicate favorite.
    Constraint,
    /// The local store could not be opened or transacted.
    StoreUnavailable,
    /// Schema migration failure; fatal to store access.
    Upgrade,
    /// Caller supplied invalid arguments.
    Input,
    /// The remote API rejected the request.
    Remote,
}

impl Error {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidInput(_) | Error::InvalidUrl(_) => ErrorKind::Input,
            Error::FavoriteExists(_) => ErrorKind::Constraint,
            Error::Database(_) | Error::Serialization(_) => ErrorKind::StoreUnavailable,
            Error::MigrationFailed(_) => ErrorKind::Upgrade,
            Error::CacheMiss(_) | Error::Network(_) | Error::HttpError(_) | Error::InstallFailed(_) => {
                ErrorKind::Network
            }
            Error::Api(_) => ErrorKind::Remote,
        }
    }

    /// Whether this error came from the network layer.
    pub fn is_network(&self) -> bool {
        self.kind() == ErrorKind::Network
    }
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => Error::Database(tokio_rusqlite::Error::Close(c)),
            _ => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::Database(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(tokio_rusqlite::Error::Error(err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::FavoriteExists("s1".to_string());
        assert!(err.to_string().contains("FAVORITE_EXISTS"));
        assert!(err.to_string().contains("s1"));
    }

    #[test]
    fn test_error_kind() {
        assert_eq!(Error::FavoriteExists("s1".into()).kind(), ErrorKind::Constraint);
        assert_eq!(Error::Network("reset".into()).kind(), ErrorKind::Network);
        assert_eq!(Error::MigrationFailed("v9".into()).kind(), ErrorKind::Upgrade);
        assert_eq!(Error::Api("bad token".into()).kind(), ErrorKind::Remote);
        assert!(Error::HttpError("status 500".into()).is_network());
    }

    #[test]
    fn test_rusqlite_error_is_store_unavailable() {
        let err: Error = rusqlite::Error::QueryReturnedNoRows.into();
        assert_eq!(err.kind(), ErrorKind::StoreUnavailable);
    }
}
