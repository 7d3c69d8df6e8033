//! Weather snapshot model for Sunshine
//!
//! Holds the snapshot type shared by both devices, the wire codec, icon
//! resolution and the producer-side weather record source.

pub mod codec;
pub mod icons;
pub mod source;
pub mod types;

pub use codec::{decode, encode, Payload, PayloadValue};
pub use icons::{rasterize_png, DirectoryIcons, IconResolver, PaletteIcons};
pub use source::{normalize_date, InMemorySource, SqliteWeatherSource, WeatherRecordSource};
pub use types::*;
