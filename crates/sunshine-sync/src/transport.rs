//! Messaging layer abstraction.
//!
//! A [`Transport`] opens [`Link`]s to the companion device. Items are
//! addressed by URI (`wear://<node>/<path>`); only the path is used for
//! routing.

use std::future::Future;

use sunshine_core::TransportError;
use sunshine_weather::Payload;
use url::Url;

/// Logical path of weather snapshot items.
pub const PATH_WEATHER: &str = "/weather";

const ITEM_SCHEME: &str = "wear";

/// A single atomic item written to the shared data layer.
#[derive(Debug, Clone, PartialEq)]
pub struct DataItem {
    uri: Url,
    payload: Payload,
    urgent: bool,
}

impl DataItem {
    /// Address an item at `path` on `node`.
    pub fn new(node: &str, path: &str, payload: Payload) -> Result<Self, url::ParseError> {
        let uri = Url::parse(&format!("{}://{}{}", ITEM_SCHEME, node, path))?;
        Ok(Self {
            uri,
            payload,
            urgent: false,
        })
    }

    /// Request delivery without the transport's batching delay.
    pub fn urgent(mut self) -> Self {
        self.urgent = true;
        self
    }

    pub fn uri(&self) -> &Url {
        &self.uri
    }

    pub fn path(&self) -> &str {
        self.uri.path()
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn is_urgent(&self) -> bool {
        self.urgent
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataEventKind {
    Changed,
    Deleted,
}

/// Change notification delivered to listeners.
#[derive(Debug, Clone, PartialEq)]
pub struct DataEvent {
    pub kind: DataEventKind,
    pub item: DataItem,
}

impl DataEvent {
    pub fn changed(item: DataItem) -> Self {
        Self {
            kind: DataEventKind::Changed,
            item,
        }
    }

    pub fn deleted(item: DataItem) -> Self {
        Self {
            kind: DataEventKind::Deleted,
            item,
        }
    }
}

/// Completion status of a put, as a numeric status code (0 is success).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryStatus {
    code: i32,
}

impl DeliveryStatus {
    pub const SUCCESS: DeliveryStatus = DeliveryStatus { code: 0 };

    pub fn from_code(code: i32) -> Self {
        Self { code }
    }

    pub fn code(&self) -> i32 {
        self.code
    }

    pub fn is_success(&self) -> bool {
        self.code == 0
    }
}

/// Opens connections to the companion device.
pub trait Transport: Send + Sync + 'static {
    type Link: Link;

    /// Establish a link. May wait indefinitely; callers bound it.
    fn connect(&self) -> impl Future<Output = Result<Self::Link, TransportError>> + Send;
}

/// An established connection.
pub trait Link: Send + Sync + 'static {
    /// Whether the link is still usable. Links can drop at any time.
    fn is_connected(&self) -> bool;

    /// Write an item and report its completion status.
    fn put_item(&self, item: DataItem) -> impl Future<Output = DeliveryStatus> + Send;

    /// Release the connection. Must be idempotent.
    fn disconnect(&self);
}
