//! Consumer: listens for change batches and persists weather snapshots.
//!
//! Delivery is at most once. A batch that arrives while the session cannot
//! be re-established is dropped, and items that fail to decode are skipped
//! without affecting the rest of their batch.

use std::sync::Arc;
use std::time::Duration;

use sunshine_weather::decode;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::error::SyncError;
use crate::session::{ChannelSession, SessionState};
use crate::store::SnapshotStore;
use crate::transport::{DataEvent, DataEventKind, Transport, PATH_WEATHER};

/// Counts for one processed batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Snapshots written to the store.
    pub stored: usize,
    /// Weather items that could not be decoded or stored.
    pub skipped: usize,
    /// Events for other paths or of other kinds.
    pub ignored: usize,
}

pub struct Consumer<T: Transport> {
    session: ChannelSession<T>,
    store: SnapshotStore,
    connect_timeout: Duration,
}

impl<T: Transport> Consumer<T> {
    pub fn new(transport: Arc<T>, store: SnapshotStore, connect_timeout: Duration) -> Self {
        Self {
            session: ChannelSession::new(transport),
            store,
            connect_timeout,
        }
    }

    pub fn session_state(&self) -> SessionState {
        self.session.state()
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    /// Process one inbound batch.
    ///
    /// The session is re-established first if it has dropped. When that
    /// fails the whole batch is discarded and the error returned.
    pub async fn on_batch(&mut self, batch: Vec<DataEvent>) -> Result<BatchReport, SyncError> {
        if let Err(e) = self.session.ensure_connected(self.connect_timeout).await {
            tracing::warn!("Dropping batch of {} event(s): {}", batch.len(), e);
            return Err(e);
        }

        let mut report = BatchReport::default();
        for event in batch {
            if event.kind != DataEventKind::Changed || event.item.path() != PATH_WEATHER {
                report.ignored += 1;
                continue;
            }

            let snapshot = match decode(event.item.payload()) {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    tracing::warn!("Skipping malformed item {}: {}", event.item.uri(), e);
                    report.skipped += 1;
                    continue;
                }
            };

            if let Some(captured_at) = snapshot.captured_at() {
                tracing::debug!("Snapshot captured at {}", captured_at);
            }

            match self.store.write_async(snapshot).await {
                Ok(()) => report.stored += 1,
                Err(e) => {
                    tracing::error!("Failed to store snapshot from {}: {}", event.item.uri(), e);
                    report.skipped += 1;
                }
            }
        }

        tracing::debug!(
            "Batch processed: stored={} skipped={} ignored={}",
            report.stored,
            report.skipped,
            report.ignored
        );
        Ok(report)
    }

    /// Listen until `cancel` fires or the event stream closes, then release
    /// the session.
    pub async fn run(
        mut self,
        mut events: broadcast::Receiver<Vec<DataEvent>>,
        cancel: CancellationToken,
    ) {
        tracing::info!("Weather consumer listening on {}", PATH_WEATHER);
        let mut dropped_batches = 0usize;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Weather consumer cancelled");
                    break;
                }
                received = events.recv() => match received {
                    Ok(batch) => match self.on_batch(batch).await {
                        Ok(report) if report.skipped > 0 => {
                            tracing::debug!("{} item(s) skipped in batch", report.skipped);
                        }
                        Ok(_) => {}
                        Err(e) => {
                            dropped_batches += 1;
                            tracing::debug!(
                                "{} batch(es) dropped so far, last: {}",
                                dropped_batches,
                                e
                            );
                        }
                    },
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        tracing::warn!("Consumer lagged, {} batch(es) lost", missed);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::info!("Event stream closed");
                        break;
                    }
                },
            }
        }
        if dropped_batches > 0 {
            tracing::info!("Consumer stopped after dropping {} batch(es)", dropped_batches);
        }
        self.session.disconnect();
    }
}
