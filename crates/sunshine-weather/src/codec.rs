//! Snapshot <-> key/value payload codec.
//!
//! Wire contract: `HIGH_TEMP` and `LOW_TEMP` as doubles, `ICON` as a base64
//! string (a binary asset is also accepted on decode), and an optional
//! `TIME` in epoch milliseconds.

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{truncate_degrees, DecodeError, EncodeError, WeatherSnapshot};

pub const KEY_HIGH_TEMP: &str = "HIGH_TEMP";
pub const KEY_LOW_TEMP: &str = "LOW_TEMP";
pub const KEY_ICON: &str = "ICON";
pub const KEY_TIME: &str = "TIME";

/// A single typed payload entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum PayloadValue {
    Double(f64),
    Long(i64),
    String(String),
    Asset(Vec<u8>),
}

impl PayloadValue {
    fn type_name(&self) -> &'static str {
        match self {
            Self::Double(_) => "double",
            Self::Long(_) => "long",
            Self::String(_) => "string",
            Self::Asset(_) => "asset",
        }
    }
}

/// Flat, transport-neutral key/value map
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    entries: BTreeMap<String, PayloadValue>,
}

impl Payload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, key: impl Into<String>, value: PayloadValue) {
        self.entries.insert(key.into(), value);
    }

    pub fn put_double(&mut self, key: impl Into<String>, value: f64) {
        self.put(key, PayloadValue::Double(value));
    }

    pub fn put_long(&mut self, key: impl Into<String>, value: i64) {
        self.put(key, PayloadValue::Long(value));
    }

    pub fn put_string(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.put(key, PayloadValue::String(value.into()));
    }

    pub fn put_asset(&mut self, key: impl Into<String>, bytes: Vec<u8>) {
        self.put(key, PayloadValue::Asset(bytes));
    }

    pub fn get(&self, key: &str) -> Option<&PayloadValue> {
        self.entries.get(key)
    }

    /// JSON form used by byte-oriented transports.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

/// Encode a snapshot. `include_time` adds the `TIME` entry, using the
/// snapshot's capture time or now.
pub fn encode(snapshot: &WeatherSnapshot, include_time: bool) -> Result<Payload, EncodeError> {
    if snapshot.icon_bytes().is_empty() {
        return Err(EncodeError::EmptyIcon);
    }

    let mut payload = Payload::new();
    payload.put_double(KEY_HIGH_TEMP, f64::from(snapshot.high_temp()));
    payload.put_double(KEY_LOW_TEMP, f64::from(snapshot.low_temp()));
    payload.put_string(KEY_ICON, STANDARD.encode(snapshot.icon_bytes()));

    if include_time {
        let at = snapshot.captured_at().unwrap_or_else(Utc::now);
        payload.put_long(KEY_TIME, at.timestamp_millis());
    }

    Ok(payload)
}

/// Decode a payload, validating that the icon parses as an image.
pub fn decode(payload: &Payload) -> Result<WeatherSnapshot, DecodeError> {
    let high = read_double(payload, KEY_HIGH_TEMP)?;
    let low = read_double(payload, KEY_LOW_TEMP)?;

    let icon_bytes = match payload.get(KEY_ICON) {
        Some(PayloadValue::String(encoded)) => decode_icon_text(encoded)?,
        Some(PayloadValue::Asset(bytes)) => bytes.clone(),
        Some(_) => {
            return Err(DecodeError::WrongType {
                key: KEY_ICON,
                expected: "string or asset",
            })
        }
        None => return Err(DecodeError::MissingKey(KEY_ICON)),
    };

    image::load_from_memory(&icon_bytes).map_err(|e| DecodeError::InvalidImage(e.to_string()))?;

    let mut snapshot =
        WeatherSnapshot::new(truncate_degrees(high), truncate_degrees(low), icon_bytes);

    match payload.get(KEY_TIME) {
        Some(PayloadValue::Long(ms)) => {
            if let Some(at) = DateTime::<Utc>::from_timestamp_millis(*ms) {
                snapshot = snapshot.with_captured_at(at);
            }
        }
        Some(other) => {
            tracing::debug!("Ignoring {} entry of type {}", KEY_TIME, other.type_name());
        }
        None => {}
    }

    Ok(snapshot)
}

/// Base64 text may arrive wrapped at 76 columns.
fn decode_icon_text(encoded: &str) -> Result<Vec<u8>, DecodeError> {
    let compact: Vec<u8> = encoded
        .bytes()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    STANDARD
        .decode(compact)
        .map_err(|e| DecodeError::InvalidBase64(e.to_string()))
}

fn read_double(payload: &Payload, key: &'static str) -> Result<f64, DecodeError> {
    match payload.get(key) {
        Some(PayloadValue::Double(value)) => Ok(*value),
        Some(_) => Err(DecodeError::WrongType {
            key,
            expected: "double",
        }),
        None => Err(DecodeError::MissingKey(key)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::icons::{rasterize_png, IconResolver, PaletteIcons};
    use crate::types::WeatherCondition;

    fn sun_png() -> Vec<u8> {
        let icon = PaletteIcons::new(8).resolve(WeatherCondition::Clear).unwrap();
        rasterize_png(&icon).unwrap()
    }

    #[test]
    fn test_encode_writes_wire_keys() {
        let snapshot = WeatherSnapshot::new(75, 58, sun_png());
        let payload = encode(&snapshot, false).unwrap();

        assert_eq!(payload.get(KEY_HIGH_TEMP), Some(&PayloadValue::Double(75.0)));
        assert_eq!(payload.get(KEY_LOW_TEMP), Some(&PayloadValue::Double(58.0)));
        assert!(matches!(payload.get(KEY_ICON), Some(PayloadValue::String(_))));
        assert_eq!(payload.get(KEY_TIME), None);
    }

    #[test]
    fn test_encode_debug_adds_time() {
        let at = DateTime::<Utc>::from_timestamp_millis(1_483_000_000_000).unwrap();
        let snapshot = WeatherSnapshot::new(1, 0, sun_png()).with_captured_at(at);
        let payload = encode(&snapshot, true).unwrap();
        assert_eq!(
            payload.get(KEY_TIME),
            Some(&PayloadValue::Long(1_483_000_000_000))
        );
    }

    #[test]
    fn test_encode_empty_icon_fails() {
        let snapshot = WeatherSnapshot::new(1, 0, Vec::new());
        assert!(matches!(encode(&snapshot, false), Err(EncodeError::EmptyIcon)));
    }

    #[test]
    fn test_round_trip_preserves_icon_bytes() {
        let icon = sun_png();
        let snapshot = WeatherSnapshot::new(-4, -12, icon.clone());
        let decoded = decode(&encode(&snapshot, false).unwrap()).unwrap();
        assert_eq!(decoded, snapshot);
        assert_eq!(decoded.icon_bytes(), icon.as_slice());
    }

    #[test]
    fn test_round_trip_keeps_time_only_when_debug() {
        let at = DateTime::<Utc>::from_timestamp_millis(1_700_000_000_123).unwrap();
        let snapshot = WeatherSnapshot::new(3, 2, sun_png()).with_captured_at(at);

        let plain = decode(&encode(&snapshot, false).unwrap()).unwrap();
        assert_eq!(plain.captured_at(), None);
        assert!(plain.same_content(&snapshot));

        let debug = decode(&encode(&snapshot, true).unwrap()).unwrap();
        assert_eq!(debug, snapshot);
    }

    #[test]
    fn test_decode_truncates_temperatures() {
        let mut payload = Payload::new();
        payload.put_double(KEY_HIGH_TEMP, 75.4);
        payload.put_double(KEY_LOW_TEMP, 58.9);
        payload.put_string(KEY_ICON, STANDARD.encode(sun_png()));

        let snapshot = decode(&payload).unwrap();
        assert_eq!(snapshot.high_temp(), 75);
        assert_eq!(snapshot.low_temp(), 58);
    }

    #[test]
    fn test_decode_accepts_binary_asset() {
        let icon = sun_png();
        let mut payload = Payload::new();
        payload.put_double(KEY_HIGH_TEMP, 10.0);
        payload.put_double(KEY_LOW_TEMP, 5.0);
        payload.put_asset(KEY_ICON, icon.clone());

        let snapshot = decode(&payload).unwrap();
        assert_eq!(snapshot.icon_bytes(), icon.as_slice());
    }

    #[test]
    fn test_decode_missing_key() {
        let mut payload = Payload::new();
        payload.put_double(KEY_HIGH_TEMP, 1.0);
        payload.put_string(KEY_ICON, STANDARD.encode(sun_png()));
        assert!(matches!(
            decode(&payload),
            Err(DecodeError::MissingKey(KEY_LOW_TEMP))
        ));
    }

    #[test]
    fn test_decode_wrong_type() {
        let mut payload = encode(&WeatherSnapshot::new(1, 0, sun_png()), false).unwrap();
        payload.put_string(KEY_HIGH_TEMP, "hot");
        assert!(matches!(
            decode(&payload),
            Err(DecodeError::WrongType { key: KEY_HIGH_TEMP, .. })
        ));
    }

    #[test]
    fn test_decode_accepts_line_wrapped_base64() {
        let icon = rasterize_png(&PaletteIcons::new(32).resolve(WeatherCondition::Clear).unwrap())
            .unwrap();
        let encoded = STANDARD.encode(&icon);
        assert!(encoded.len() > 76);
        let wrapped = encoded
            .as_bytes()
            .chunks(76)
            .map(|line| std::str::from_utf8(line).unwrap())
            .collect::<Vec<_>>()
            .join("\n")
            + "\n";

        let mut payload = Payload::new();
        payload.put_double(KEY_HIGH_TEMP, 75.4);
        payload.put_double(KEY_LOW_TEMP, 58.9);
        payload.put_string(KEY_ICON, wrapped);

        let snapshot = decode(&payload).unwrap();
        assert_eq!(snapshot.icon_bytes(), icon.as_slice());
        assert_eq!(snapshot.high_temp(), 75);
    }

    #[test]
    fn test_decode_rejects_bad_base64() {
        let mut payload = encode(&WeatherSnapshot::new(1, 0, sun_png()), false).unwrap();
        payload.put_string(KEY_ICON, "not base64!!");
        assert!(matches!(decode(&payload), Err(DecodeError::InvalidBase64(_))));
    }

    #[test]
    fn test_decode_rejects_non_image_bytes() {
        let mut payload = encode(&WeatherSnapshot::new(1, 0, sun_png()), false).unwrap();
        payload.put_string(KEY_ICON, STANDARD.encode(b"definitely not a png"));
        assert!(matches!(decode(&payload), Err(DecodeError::InvalidImage(_))));
    }

    #[test]
    fn test_payload_json_round_trip() {
        let payload = encode(&WeatherSnapshot::new(20, 11, sun_png()), true).unwrap();
        let json = payload.to_json().unwrap();
        assert!(json.contains("HIGH_TEMP"));
        assert_eq!(Payload::from_json(&json).unwrap(), payload);
    }
}
