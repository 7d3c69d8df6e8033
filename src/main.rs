use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use sunshine_core::{Config, ConfigError};
use sunshine_sync::{
    Consumer, MemoryDataLayer, Producer, ProducerOptions, PublishOutcome, SnapshotStore,
    StoreError, SyncError,
};
use sunshine_weather::{
    normalize_date, DirectoryIcons, IconResolver, InMemorySource, PaletteIcons, WeatherRecord,
};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<()> {
    sunshine_core::init()?;

    let (config, _) = match Config::load_validated() {
        Ok(loaded) => loaded,
        Err(e) => {
            if let Some(config_err) = e.downcast_ref::<ConfigError>() {
                eprintln!("{}", config_err.user_message());
            }
            return Err(e);
        }
    };
    tracing::info!("Config directory: {}", config.config_dir.display());

    let store = match SnapshotStore::open(config.store_path()) {
        Ok(store) => store,
        Err(StoreError::Database(e)) => {
            eprintln!("{}", e.user_message());
            return Err(e.into());
        }
        Err(e) => return Err(e.into()),
    };

    // Both nodes share one in-process data layer
    let layer = Arc::new(MemoryDataLayer::new());
    let cancel = CancellationToken::new();
    let consumer = Consumer::new(
        layer.clone(),
        store.clone(),
        config.sync.consumer_connect_timeout(),
    );
    let listener = tokio::spawn(consumer.run(layer.subscribe(), cancel.clone()));

    let source = InMemorySource::new();
    source.insert(
        normalize_date(Utc::now()),
        WeatherRecord {
            weather_id: 800,
            max_temp: 75.4,
            min_temp: 58.9,
        },
    );
    let icons: Arc<dyn IconResolver> = match &config.icons.dir {
        Some(dir) => Arc::new(DirectoryIcons::new(dir.clone())),
        None => Arc::new(PaletteIcons::default()),
    };

    let producer = Producer::new(
        layer.clone(),
        Arc::new(source),
        icons,
        ProducerOptions::from_config(&config.sync),
    );

    match producer.publish().await {
        Ok(PublishOutcome::Sent(handle)) => match handle.completion().await {
            Some(status) if status.is_success() => tracing::info!("Snapshot delivered"),
            Some(status) => tracing::warn!("Delivery failed with status {}", status.code()),
            None => tracing::warn!("Send skipped, link dropped"),
        },
        Ok(outcome) => tracing::info!("Nothing published: {:?}", outcome),
        Err(SyncError::Transport(e)) => {
            tracing::warn!("Companion unavailable, will retry on next sync: {}", e);
            eprintln!("{}", e.user_message());
        }
        Err(e @ SyncError::ConnectTimeout(_)) => {
            tracing::warn!("Companion unavailable, will retry on next sync: {}", e);
        }
        Err(e) => return Err(e.into()),
    }

    let mut rendered = None;
    for _ in 0..50 {
        if let Some(snapshot) = store.read_async().await? {
            rendered = Some(snapshot);
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    cancel.cancel();
    listener.await?;

    match rendered {
        Some(snapshot) => println!(
            "High {}° / Low {}° ({} byte icon)",
            snapshot.high_temp(),
            snapshot.low_temp(),
            snapshot.icon_bytes().len()
        ),
        None => println!("No weather snapshot available"),
    }

    Ok(())
}
