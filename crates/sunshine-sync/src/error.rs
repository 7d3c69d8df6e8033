//! Sync attempt errors.

use std::time::Duration;

use sunshine_core::{DatabaseError, TransportError};
use sunshine_weather::{DecodeError, EncodeError, SourceError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Peer not reachable within {0:?}")]
    ConnectTimeout(Duration),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Encode error: {0}")]
    Encode(#[from] EncodeError),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Weather source error: {0}")]
    Source(#[from] SourceError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Invalid item address: {0}")]
    Address(#[from] url::ParseError),
}

impl SyncError {
    /// Whether the next scheduled sync could reasonably succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::ConnectTimeout(_) | Self::Transport(_))
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error("Stored value for {key} is corrupt: {message}")]
    Corrupt { key: &'static str, message: String },

    #[error("Store task failed: {0}")]
    Task(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        use sunshine_core::RusqliteErrorExt;
        Self::Database(err.into_database_error())
    }
}
