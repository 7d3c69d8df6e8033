//! Weather snapshot synchronization between a handheld and its companion.
//!
//! The [`Producer`] reads today's record, encodes it and pushes it over a
//! [`Transport`]. The [`Consumer`] listens for change batches and keeps the
//! latest snapshot in a [`SnapshotStore`].

pub mod consumer;
pub mod error;
pub mod memory;
pub mod producer;
pub mod session;
pub mod store;
pub mod transport;

pub use consumer::{BatchReport, Consumer};
pub use error::{StoreError, SyncError};
pub use memory::{MemoryDataLayer, MemoryLink};
pub use producer::{Producer, ProducerOptions, PublishOutcome};
pub use session::{ChannelSession, SendHandle, SessionState};
pub use store::{SnapshotStore, SqliteSnapshotStore, StoredValues};
pub use transport::{
    DataEvent, DataEventKind, DataItem, DeliveryStatus, Link, Transport, PATH_WEATHER,
};
