use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Weather condition categories mapped from OpenWeatherMap condition ids
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeatherCondition {
    Storm,
    LightRain,
    Rain,
    Snow,
    Fog,
    Clear,
    LightClouds,
    Cloudy,
}

impl WeatherCondition {
    /// Convert an OpenWeatherMap condition id to a WeatherCondition.
    /// See: https://openweathermap.org/weather-conditions
    ///
    /// Ranges overlap (761 is both fog and storm); the first match wins.
    /// Returns `None` for ids with no icon.
    pub fn from_owm_code(code: i32) -> Option<Self> {
        let condition = match code {
            200..=232 => Self::Storm,
            300..=321 => Self::LightRain,
            500..=504 => Self::Rain,
            511 => Self::Snow,
            520..=531 => Self::Rain,
            600..=622 => Self::Snow,
            701..=761 => Self::Fog,
            771 | 781 => Self::Storm,
            800 => Self::Clear,
            801 => Self::LightClouds,
            802..=804 => Self::Cloudy,
            900..=906 => Self::Storm,
            958..=962 => Self::Storm,
            951..=957 => Self::Clear,
            _ => return None,
        };
        Some(condition)
    }

    /// Get a human-readable description
    pub fn description(&self) -> &'static str {
        match self {
            Self::Storm => "Storm",
            Self::LightRain => "Light Rain",
            Self::Rain => "Rain",
            Self::Snow => "Snow",
            Self::Fog => "Fog",
            Self::Clear => "Clear",
            Self::LightClouds => "Light Clouds",
            Self::Cloudy => "Cloudy",
        }
    }

    /// Icon file stem, e.g. `ic_clear` for `ic_clear.png`
    pub fn icon_name(&self) -> &'static str {
        match self {
            Self::Storm => "ic_storm",
            Self::LightRain => "ic_light_rain",
            Self::Rain => "ic_rain",
            Self::Snow => "ic_snow",
            Self::Fog => "ic_fog",
            Self::Clear => "ic_clear",
            Self::LightClouds => "ic_light_clouds",
            Self::Cloudy => "ic_cloudy",
        }
    }
}

/// Today's row from the local weather database
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeatherRecord {
    pub weather_id: i32,
    pub max_temp: f64,
    pub min_temp: f64,
}

/// Truncate a floating point degree value toward zero.
///
/// Saturates at the `i32` bounds; NaN becomes 0.
pub fn truncate_degrees(value: f64) -> i32 {
    value as i32
}

/// Point-in-time bundle of temperatures and icon pushed to the companion.
///
/// `high_temp >= low_temp` is not checked; upstream values pass through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeatherSnapshot {
    high_temp: i32,
    low_temp: i32,
    icon_bytes: Vec<u8>,
    captured_at: Option<DateTime<Utc>>,
}

impl WeatherSnapshot {
    pub fn new(high_temp: i32, low_temp: i32, icon_bytes: Vec<u8>) -> Self {
        Self {
            high_temp,
            low_temp,
            icon_bytes,
            captured_at: None,
        }
    }

    /// Build from raw degree readings, truncating both.
    pub fn from_degrees(high: f64, low: f64, icon_bytes: Vec<u8>) -> Self {
        Self::new(truncate_degrees(high), truncate_degrees(low), icon_bytes)
    }

    pub fn with_captured_at(mut self, captured_at: DateTime<Utc>) -> Self {
        self.captured_at = Some(captured_at);
        self
    }

    pub fn high_temp(&self) -> i32 {
        self.high_temp
    }

    pub fn low_temp(&self) -> i32 {
        self.low_temp
    }

    pub fn icon_bytes(&self) -> &[u8] {
        &self.icon_bytes
    }

    pub fn captured_at(&self) -> Option<DateTime<Utc>> {
        self.captured_at
    }

    /// Equality on the synchronized fields, ignoring the debug timestamp.
    pub fn same_content(&self, other: &Self) -> bool {
        self.high_temp == other.high_temp
            && self.low_temp == other.low_temp
            && self.icon_bytes == other.icon_bytes
    }
}

/// Failure to turn a snapshot into a payload
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("Icon is empty")]
    EmptyIcon,
    #[error("Failed to rasterize icon: {0}")]
    Rasterize(String),
}

/// Failure to turn a payload back into a snapshot
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Missing key: {0}")]
    MissingKey(&'static str),
    #[error("Key {key} has wrong type, expected {expected}")]
    WrongType {
        key: &'static str,
        expected: &'static str,
    },
    #[error("Icon is not valid base64: {0}")]
    InvalidBase64(String),
    #[error("Icon is not a valid image: {0}")]
    InvalidImage(String),
}

/// Weather record lookup errors
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Weather database error: {0}")]
    Database(#[from] rusqlite::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_owm_code_storm() {
        assert_eq!(WeatherCondition::from_owm_code(200), Some(WeatherCondition::Storm));
        assert_eq!(WeatherCondition::from_owm_code(232), Some(WeatherCondition::Storm));
        assert_eq!(WeatherCondition::from_owm_code(781), Some(WeatherCondition::Storm));
        assert_eq!(WeatherCondition::from_owm_code(905), Some(WeatherCondition::Storm));
        assert_eq!(WeatherCondition::from_owm_code(960), Some(WeatherCondition::Storm));
    }

    #[test]
    fn test_owm_code_rain() {
        assert_eq!(WeatherCondition::from_owm_code(301), Some(WeatherCondition::LightRain));
        assert_eq!(WeatherCondition::from_owm_code(500), Some(WeatherCondition::Rain));
        assert_eq!(WeatherCondition::from_owm_code(531), Some(WeatherCondition::Rain));
    }

    #[test]
    fn test_owm_code_snow() {
        assert_eq!(WeatherCondition::from_owm_code(511), Some(WeatherCondition::Snow));
        assert_eq!(WeatherCondition::from_owm_code(600), Some(WeatherCondition::Snow));
        assert_eq!(WeatherCondition::from_owm_code(622), Some(WeatherCondition::Snow));
    }

    #[test]
    fn test_owm_code_761_is_fog() {
        assert_eq!(WeatherCondition::from_owm_code(761), Some(WeatherCondition::Fog));
        assert_eq!(WeatherCondition::from_owm_code(701), Some(WeatherCondition::Fog));
    }

    #[test]
    fn test_owm_code_clear_and_clouds() {
        assert_eq!(WeatherCondition::from_owm_code(800), Some(WeatherCondition::Clear));
        assert_eq!(WeatherCondition::from_owm_code(951), Some(WeatherCondition::Clear));
        assert_eq!(WeatherCondition::from_owm_code(801), Some(WeatherCondition::LightClouds));
        assert_eq!(WeatherCondition::from_owm_code(804), Some(WeatherCondition::Cloudy));
    }

    #[test]
    fn test_owm_code_unknown_has_no_condition() {
        assert_eq!(WeatherCondition::from_owm_code(0), None);
        assert_eq!(WeatherCondition::from_owm_code(999), None);
        assert_eq!(WeatherCondition::from_owm_code(-1), None);
    }

    #[test]
    fn test_condition_icon_name() {
        assert_eq!(WeatherCondition::Clear.icon_name(), "ic_clear");
        assert_eq!(WeatherCondition::LightRain.icon_name(), "ic_light_rain");
        assert_eq!(WeatherCondition::Storm.description(), "Storm");
    }

    #[test]
    fn test_truncation_not_rounding() {
        assert_eq!(truncate_degrees(75.4), 75);
        assert_eq!(truncate_degrees(58.9), 58);
        assert_eq!(truncate_degrees(-3.7), -3);
        assert_eq!(truncate_degrees(f64::NAN), 0);
        assert_eq!(truncate_degrees(1e12), i32::MAX);
    }

    #[test]
    fn test_snapshot_passes_inverted_range_through() {
        let snapshot = WeatherSnapshot::from_degrees(10.2, 20.8, vec![1]);
        assert_eq!(snapshot.high_temp(), 10);
        assert_eq!(snapshot.low_temp(), 20);
    }

    #[test]
    fn test_same_content_ignores_timestamp() {
        let a = WeatherSnapshot::new(1, 0, vec![9]);
        let b = a.clone().with_captured_at(Utc::now());
        assert_ne!(a, b);
        assert!(a.same_content(&b));
    }
}
