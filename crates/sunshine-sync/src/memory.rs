//! In-process data layer shared by a producer and a consumer.
//!
//! Stands in for the device messaging service: items are kept per URI and
//! every successful put is broadcast to listeners as a one-event batch.
//! Reachability, connect latency and put status are adjustable so that
//! failure paths can be exercised.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use sunshine_core::TransportError;
use tokio::sync::broadcast;

use crate::transport::{DataEvent, DataItem, DeliveryStatus, Link, Transport};

const EVENT_CAPACITY: usize = 64;

struct Inner {
    items: Mutex<HashMap<String, DataItem>>,
    events: broadcast::Sender<Vec<DataEvent>>,
    reachable: AtomicBool,
    connect_latency: Mutex<Duration>,
    put_status: AtomicI32,
    /// Bumped by `drop_links`; links from an older generation are dead.
    generation: AtomicU64,
    connect_attempts: AtomicUsize,
    open_links: AtomicUsize,
    puts: AtomicUsize,
}

/// Shared in-memory data layer. Cloning yields another handle to it.
#[derive(Clone)]
pub struct MemoryDataLayer {
    inner: Arc<Inner>,
}

impl MemoryDataLayer {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                items: Mutex::new(HashMap::new()),
                events,
                reachable: AtomicBool::new(true),
                connect_latency: Mutex::new(Duration::ZERO),
                put_status: AtomicI32::new(DeliveryStatus::SUCCESS.code()),
                generation: AtomicU64::new(0),
                connect_attempts: AtomicUsize::new(0),
                open_links: AtomicUsize::new(0),
                puts: AtomicUsize::new(0),
            }),
        }
    }

    /// Register a listener for inbound change batches.
    pub fn subscribe(&self) -> broadcast::Receiver<Vec<DataEvent>> {
        self.inner.events.subscribe()
    }

    /// Push a raw batch to listeners without storing anything.
    pub fn deliver(&self, batch: Vec<DataEvent>) {
        if self.inner.events.send(batch).is_err() {
            tracing::debug!("No listeners for delivered batch");
        }
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.inner.reachable.store(reachable, Ordering::SeqCst);
    }

    pub fn set_connect_latency(&self, latency: Duration) {
        *self.inner.connect_latency.lock() = latency;
    }

    /// Status code reported by subsequent puts. Non-zero puts store nothing.
    pub fn set_put_status(&self, code: i32) {
        self.inner.put_status.store(code, Ordering::SeqCst);
    }

    /// Invalidate every open link, as if the peer went away.
    pub fn drop_links(&self) {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Last item written at `uri`.
    pub fn item(&self, uri: &str) -> Option<DataItem> {
        self.inner.items.lock().get(uri).cloned()
    }

    pub fn connect_attempts(&self) -> usize {
        self.inner.connect_attempts.load(Ordering::SeqCst)
    }

    pub fn open_links(&self) -> usize {
        self.inner.open_links.load(Ordering::SeqCst)
    }

    pub fn put_count(&self) -> usize {
        self.inner.puts.load(Ordering::SeqCst)
    }
}

impl Default for MemoryDataLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for MemoryDataLayer {
    type Link = MemoryLink;

    async fn connect(&self) -> Result<MemoryLink, TransportError> {
        self.inner.connect_attempts.fetch_add(1, Ordering::SeqCst);

        let latency = *self.inner.connect_latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        if !self.inner.reachable.load(Ordering::SeqCst) {
            return Err(TransportError::Unreachable("companion".to_string()));
        }

        self.inner.open_links.fetch_add(1, Ordering::SeqCst);
        Ok(MemoryLink {
            inner: self.inner.clone(),
            generation: self.inner.generation.load(Ordering::SeqCst),
            open: AtomicBool::new(true),
        })
    }
}

/// Link handed out by [`MemoryDataLayer`].
pub struct MemoryLink {
    inner: Arc<Inner>,
    generation: u64,
    open: AtomicBool,
}

impl Link for MemoryLink {
    fn is_connected(&self) -> bool {
        self.open.load(Ordering::SeqCst)
            && self.generation == self.inner.generation.load(Ordering::SeqCst)
    }

    async fn put_item(&self, item: DataItem) -> DeliveryStatus {
        if !self.is_connected() {
            return DeliveryStatus::from_code(TRANSPORT_NOT_CONNECTED);
        }

        self.inner.puts.fetch_add(1, Ordering::SeqCst);
        let status = DeliveryStatus::from_code(self.inner.put_status.load(Ordering::SeqCst));
        if !status.is_success() {
            return status;
        }

        self.inner
            .items
            .lock()
            .insert(item.uri().to_string(), item.clone());
        if self.inner.events.send(vec![DataEvent::changed(item)]).is_err() {
            tracing::debug!("Item stored with no listeners attached");
        }
        status
    }

    fn disconnect(&self) {
        if self.open.swap(false, Ordering::SeqCst) {
            self.inner.open_links.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

/// Status reported when putting on a dead link.
pub const TRANSPORT_NOT_CONNECTED: i32 = 4000;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::PATH_WEATHER;
    use sunshine_weather::Payload;

    fn item() -> DataItem {
        DataItem::new("handheld", PATH_WEATHER, Payload::new()).unwrap()
    }

    #[tokio::test]
    async fn test_connect_and_disconnect_track_links() {
        let layer = MemoryDataLayer::new();
        let link = layer.connect().await.unwrap();
        assert!(link.is_connected());
        assert_eq!(layer.open_links(), 1);

        link.disconnect();
        link.disconnect();
        assert!(!link.is_connected());
        assert_eq!(layer.open_links(), 0);
    }

    #[tokio::test]
    async fn test_unreachable_connect_fails() {
        let layer = MemoryDataLayer::new();
        layer.set_reachable(false);
        assert!(matches!(
            layer.connect().await,
            Err(TransportError::Unreachable(_))
        ));
        assert_eq!(layer.connect_attempts(), 1);
        assert_eq!(layer.open_links(), 0);
    }

    #[tokio::test]
    async fn test_put_broadcasts_and_stores() {
        let layer = MemoryDataLayer::new();
        let mut rx = layer.subscribe();
        let link = layer.connect().await.unwrap();

        let status = link.put_item(item()).await;
        assert!(status.is_success());

        let batch = rx.recv().await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].item.path(), PATH_WEATHER);
        assert!(layer.item("wear://handheld/weather").is_some());
    }

    #[tokio::test]
    async fn test_failed_put_stores_nothing() {
        let layer = MemoryDataLayer::new();
        layer.set_put_status(8);
        let link = layer.connect().await.unwrap();

        let status = link.put_item(item()).await;
        assert_eq!(status.code(), 8);
        assert!(layer.item("wear://handheld/weather").is_none());
    }

    #[tokio::test]
    async fn test_drop_links_invalidates_existing() {
        let layer = MemoryDataLayer::new();
        let link = layer.connect().await.unwrap();
        layer.drop_links();
        assert!(!link.is_connected());

        let status = link.put_item(item()).await;
        assert_eq!(status.code(), TRANSPORT_NOT_CONNECTED);
        assert_eq!(layer.put_count(), 0);

        let fresh = layer.connect().await.unwrap();
        assert!(fresh.is_connected());
    }
}
