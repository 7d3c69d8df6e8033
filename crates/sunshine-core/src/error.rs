//! Shared error types for producer and consumer nodes.
//!
//! Sync attempts never surface these to the renderer; they end up in logs.
//! `user_message()` gives the short form printed by the node binary.

use thiserror::Error;

/// Errors raised by the underlying messaging layer.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Peer unreachable: {0}")]
    Unreachable(String),
}

impl TransportError {
    pub fn user_message(&self) -> &'static str {
        match self {
            TransportError::Unreachable(_) => "Companion device is not reachable.",
        }
    }
}

/// Database/storage errors (SQLite, local state).
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Database connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Data corruption detected: {0}")]
    Corruption(String),
}

impl DatabaseError {
    pub fn user_message(&self) -> &'static str {
        match self {
            DatabaseError::ConnectionFailed(_) => "Unable to open the local snapshot store.",
            DatabaseError::QueryFailed(_) => "A snapshot store operation failed.",
            DatabaseError::Corruption(_) => {
                "Local snapshot data may be corrupted. Consider deleting it."
            }
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Configuration parse error: {0}")]
    ParseError(String),
}

impl ConfigError {
    pub fn user_message(&self) -> &'static str {
        match self {
            ConfigError::Invalid(_) => "Invalid configuration. Check your settings.",
            ConfigError::ParseError(_) => "Configuration file is malformed.",
        }
    }
}

/// Extension trait for converting rusqlite errors to our error types.
pub trait RusqliteErrorExt {
    fn into_database_error(self) -> DatabaseError;
}

impl RusqliteErrorExt for rusqlite::Error {
    fn into_database_error(self) -> DatabaseError {
        match &self {
            rusqlite::Error::SqliteFailure(_, Some(msg)) if msg.contains("corrupt") => {
                DatabaseError::Corruption(self.to_string())
            }
            rusqlite::Error::SqliteFailure(err, _)
                if err.code == rusqlite::ErrorCode::CannotOpen =>
            {
                DatabaseError::ConnectionFailed(self.to_string())
            }
            _ => DatabaseError::QueryFailed(self.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rusqlite_error_maps_to_query_failed() {
        let err = rusqlite::Error::QueryReturnedNoRows.into_database_error();
        assert!(matches!(err, DatabaseError::QueryFailed(_)));
        assert_eq!(err.user_message(), "A snapshot store operation failed.");
    }

    #[test]
    fn test_unopenable_database_maps_to_connection_failed() {
        let dir = tempfile::tempdir().unwrap();
        let err = rusqlite::Connection::open_with_flags(
            dir.path().join("missing").join("snapshot.db"),
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE,
        )
        .unwrap_err()
        .into_database_error();
        assert!(matches!(err, DatabaseError::ConnectionFailed(_)));
    }

    #[test]
    fn test_transport_message() {
        let err = TransportError::Unreachable("watch".into());
        assert_eq!(err.user_message(), "Companion device is not reachable.");
        assert!(err.to_string().contains("watch"));
    }

    #[test]
    fn test_config_messages() {
        assert_eq!(
            ConfigError::ParseError("x".into()).user_message(),
            "Configuration file is malformed."
        );
        assert!(ConfigError::Invalid("sync.node".into())
            .to_string()
            .contains("sync.node"));
    }
}
