use std::ops::RangeInclusive;

use serde::Serialize;
use serde_json::Number;

pub const TEMPERATURE_CELSIUS_RANGE: RangeInclusive<f64> = -40.0..=85.0;
pub const HUMIDITY_PERCENT_RANGE: RangeInclusive<f64> = 0.0..=100.0;
pub const LIGHT_LUX_RANGE: RangeInclusive<f64> = 0.0..=200_000.0;

/// Canonical sensor record, serialized with the backend's field names.
///
/// Values keep the number exactly as received, so `65` is posted as `65`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorReading {
    #[serde(rename = "suhu")]
    pub temperature: Number,

    pub humidity: Number,

    #[serde(rename = "lux")]
    pub light: Number,
}
