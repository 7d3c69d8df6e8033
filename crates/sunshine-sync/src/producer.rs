//! Producer: builds today's snapshot and pushes it to the companion.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sunshine_core::SyncConfig;
use sunshine_weather::{
    encode, normalize_date, rasterize_png, IconResolver, WeatherCondition, WeatherRecordSource,
    WeatherSnapshot,
};

use crate::error::SyncError;
use crate::session::{ChannelSession, SendHandle};
use crate::transport::{DataItem, Transport, PATH_WEATHER};

/// Per-producer settings, usually taken from [`SyncConfig`].
#[derive(Debug, Clone)]
pub struct ProducerOptions {
    pub node: String,
    pub connect_timeout: Duration,
    pub debug_timestamps: bool,
    pub urgent: bool,
}

impl ProducerOptions {
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            node: config.node.clone(),
            connect_timeout: config.producer_connect_timeout(),
            debug_timestamps: config.debug_timestamps,
            urgent: config.urgent,
        }
    }
}

impl Default for ProducerOptions {
    fn default() -> Self {
        Self::from_config(&SyncConfig::default())
    }
}

/// What a publish attempt did.
#[derive(Debug)]
pub enum PublishOutcome {
    /// No weather record for today; nothing was sent.
    NoRecord,
    /// The weather id has no icon; nothing was sent.
    NoIcon { weather_id: i32 },
    /// The item was handed to the transport.
    Sent(SendHandle),
}

enum Built {
    Ready(WeatherSnapshot),
    Skip(PublishOutcome),
}

pub struct Producer<T: Transport> {
    transport: Arc<T>,
    source: Arc<dyn WeatherRecordSource>,
    icons: Arc<dyn IconResolver>,
    options: ProducerOptions,
}

impl<T: Transport> Producer<T> {
    pub fn new(
        transport: Arc<T>,
        source: Arc<dyn WeatherRecordSource>,
        icons: Arc<dyn IconResolver>,
        options: ProducerOptions,
    ) -> Self {
        Self {
            transport,
            source,
            icons,
            options,
        }
    }

    pub fn options(&self) -> &ProducerOptions {
        &self.options
    }

    /// Publish today's snapshot.
    pub async fn publish(&self) -> Result<PublishOutcome, SyncError> {
        self.publish_at(Utc::now()).await
    }

    /// Publish the snapshot for the day containing `now`.
    ///
    /// No session is opened unless there is something to send. The session
    /// is released once the send completes.
    pub async fn publish_at(&self, now: DateTime<Utc>) -> Result<PublishOutcome, SyncError> {
        let snapshot = match self.build_snapshot(now)? {
            Built::Ready(snapshot) => snapshot,
            Built::Skip(outcome) => return Ok(outcome),
        };

        let payload = encode(&snapshot, self.options.debug_timestamps)?;
        let mut item = DataItem::new(&self.options.node, PATH_WEATHER, payload)?;
        if self.options.urgent {
            item = item.urgent();
        }
        tracing::debug!("Generating data item {}", item.uri());

        let session =
            ChannelSession::connect(self.transport.clone(), self.options.connect_timeout).await?;
        tracing::info!(
            "Publishing snapshot high={} low={}",
            snapshot.high_temp(),
            snapshot.low_temp()
        );
        Ok(PublishOutcome::Sent(session.send(item)))
    }

    /// Build the snapshot for `now`, or the outcome that explains why there
    /// is nothing to send.
    fn build_snapshot(&self, now: DateTime<Utc>) -> Result<Built, SyncError> {
        let Some(record) = self.source.record_for_date(normalize_date(now))? else {
            tracing::info!("No weather record for today, skipping publish");
            return Ok(Built::Skip(PublishOutcome::NoRecord));
        };

        let weather_id = record.weather_id;
        let Some(image) = WeatherCondition::from_owm_code(weather_id)
            .and_then(|condition| self.icons.resolve(condition))
        else {
            tracing::warn!("No icon for weather id {}, skipping publish", weather_id);
            return Ok(Built::Skip(PublishOutcome::NoIcon { weather_id }));
        };

        let icon_bytes = rasterize_png(&image)?;
        let mut snapshot =
            WeatherSnapshot::from_degrees(record.max_temp, record.min_temp, icon_bytes);
        if self.options.debug_timestamps {
            snapshot = snapshot.with_captured_at(now);
        }
        Ok(Built::Ready(snapshot))
    }
}
