//! Icon resolution and PNG rasterization for outbound snapshots.

use std::collections::HashMap;
use std::io::Cursor;
use std::path::PathBuf;

use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use parking_lot::Mutex;

use crate::types::{EncodeError, WeatherCondition};

/// Maps a weather condition to a raster image.
pub trait IconResolver: Send + Sync {
    /// Returns `None` when no image is available for the condition.
    fn resolve(&self, condition: WeatherCondition) -> Option<DynamicImage>;
}

/// Compress an image to PNG bytes.
pub fn rasterize_png(image: &DynamicImage) -> Result<Vec<u8>, EncodeError> {
    let mut buffer = Cursor::new(Vec::new());
    image
        .write_to(&mut buffer, ImageFormat::Png)
        .map_err(|e| EncodeError::Rasterize(e.to_string()))?;

    let bytes = buffer.into_inner();
    if bytes.is_empty() {
        return Err(EncodeError::EmptyIcon);
    }
    Ok(bytes)
}

/// Loads `<dir>/<icon_name>.png` on first use and keeps it in memory.
#[derive(Debug)]
pub struct DirectoryIcons {
    dir: PathBuf,
    loaded: Mutex<HashMap<WeatherCondition, DynamicImage>>,
}

impl DirectoryIcons {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            loaded: Mutex::new(HashMap::new()),
        }
    }

    fn path_for(&self, condition: WeatherCondition) -> PathBuf {
        self.dir.join(format!("{}.png", condition.icon_name()))
    }
}

impl IconResolver for DirectoryIcons {
    fn resolve(&self, condition: WeatherCondition) -> Option<DynamicImage> {
        if let Some(image) = self.loaded.lock().get(&condition) {
            return Some(image.clone());
        }

        let path = self.path_for(condition);
        match image::open(&path) {
            Ok(image) => {
                tracing::debug!("Loaded icon {}", path.display());
                self.loaded.lock().insert(condition, image.clone());
                Some(image)
            }
            Err(e) => {
                tracing::warn!("Failed to load icon {}: {}", path.display(), e);
                None
            }
        }
    }
}

/// Solid color tiles, one color per condition. Used when no icon
/// directory is configured.
#[derive(Debug, Clone, Copy)]
pub struct PaletteIcons {
    size: u32,
}

impl PaletteIcons {
    pub fn new(size: u32) -> Self {
        Self { size: size.max(1) }
    }

    fn color(condition: WeatherCondition) -> Rgba<u8> {
        match condition {
            WeatherCondition::Storm => Rgba([84, 84, 120, 255]),
            WeatherCondition::LightRain => Rgba([120, 170, 220, 255]),
            WeatherCondition::Rain => Rgba([50, 110, 200, 255]),
            WeatherCondition::Snow => Rgba([240, 245, 255, 255]),
            WeatherCondition::Fog => Rgba([180, 180, 180, 255]),
            WeatherCondition::Clear => Rgba([255, 200, 0, 255]),
            WeatherCondition::LightClouds => Rgba([210, 220, 230, 255]),
            WeatherCondition::Cloudy => Rgba([150, 160, 170, 255]),
        }
    }
}

impl Default for PaletteIcons {
    fn default() -> Self {
        Self::new(32)
    }
}

impl IconResolver for PaletteIcons {
    fn resolve(&self, condition: WeatherCondition) -> Option<DynamicImage> {
        let tile = RgbaImage::from_pixel(self.size, self.size, Self::color(condition));
        Some(DynamicImage::ImageRgba8(tile))
    }
}
