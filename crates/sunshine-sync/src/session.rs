//! Channel sessions: scoped connections to the companion device.
//!
//! A session is released (disconnected) when dropped, so every exit path of
//! a sync attempt tears the connection down, including errors and panics in
//! the send completion task.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;

use crate::error::SyncError;
use crate::transport::{DataItem, DeliveryStatus, Link, Transport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Connected,
    Disconnected,
}

/// A single logical connection owned by one producer attempt or one
/// consumer listener.
pub struct ChannelSession<T: Transport> {
    transport: Arc<T>,
    link: Option<T::Link>,
    state: SessionState,
}

impl<T: Transport> ChannelSession<T> {
    /// A session that has not connected yet.
    pub fn new(transport: Arc<T>) -> Self {
        Self {
            transport,
            link: None,
            state: SessionState::Idle,
        }
    }

    /// Open a session, waiting at most `timeout` for the peer.
    pub async fn connect(transport: Arc<T>, timeout: Duration) -> Result<Self, SyncError> {
        let mut session = Self::new(transport);
        session.ensure_connected(timeout).await?;
        Ok(session)
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// True only while the underlying link is live.
    pub fn is_connected(&self) -> bool {
        self.link.as_ref().is_some_and(|link| link.is_connected())
    }

    /// Reconnect if the link is missing or dropped.
    ///
    /// On timeout or transport failure nothing stays open and the session is
    /// left `Disconnected`.
    pub async fn ensure_connected(&mut self, timeout: Duration) -> Result<(), SyncError> {
        if self.is_connected() {
            return Ok(());
        }

        self.release();
        self.state = SessionState::Connecting;

        match tokio::time::timeout(timeout, self.transport.connect()).await {
            Ok(Ok(link)) => {
                self.link = Some(link);
                self.state = SessionState::Connected;
                tracing::debug!("Channel session connected");
                Ok(())
            }
            Ok(Err(e)) => {
                self.state = SessionState::Disconnected;
                tracing::warn!("Channel session failed to connect: {}", e);
                Err(SyncError::Transport(e))
            }
            Err(_) => {
                self.state = SessionState::Disconnected;
                tracing::warn!("Channel session connect timed out after {:?}", timeout);
                Err(SyncError::ConnectTimeout(timeout))
            }
        }
    }

    /// Hand `item` to the transport without waiting for completion.
    ///
    /// The session is consumed and disconnected once the put completes. If
    /// the link dropped since connecting, nothing is sent and the returned
    /// handle never reports a status.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn send(mut self, item: DataItem) -> SendHandle {
        let (tx, rx) = oneshot::channel();

        if !self.is_connected() {
            tracing::debug!("Link dropped before send of {}, skipping", item.uri());
            self.disconnect();
            return SendHandle { rx };
        }

        tokio::spawn(async move {
            let uri = item.uri().to_string();
            let Some(link) = self.link.as_ref() else {
                return;
            };

            let status = link.put_item(item).await;
            if status.is_success() {
                tracing::debug!("Put data item {}", uri);
            } else {
                tracing::error!(
                    "Failed to put data item {}, status code: {}",
                    uri,
                    status.code()
                );
            }

            self.disconnect();
            if tx.send(status).is_err() {
                tracing::debug!("Send completion for {} dropped by caller", uri);
            }
        });

        SendHandle { rx }
    }

    pub fn disconnect(&mut self) {
        self.release();
        self.state = SessionState::Disconnected;
    }

    fn release(&mut self) {
        if let Some(link) = self.link.take() {
            link.disconnect();
        }
    }
}

impl<T: Transport> Drop for ChannelSession<T> {
    fn drop(&mut self) {
        self.release();
    }
}

/// Completion of an asynchronous send.
#[derive(Debug)]
pub struct SendHandle {
    rx: oneshot::Receiver<DeliveryStatus>,
}

impl SendHandle {
    /// Wait for the put to complete. `None` means the send was skipped or the
    /// completion task went away without reporting.
    pub async fn completion(self) -> Option<DeliveryStatus> {
        self.rx.await.ok()
    }
}
