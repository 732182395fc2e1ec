use std::ops::RangeInclusive;

use serde_json::{Number, Value};

use crate::error::NormalizeError;
use crate::sensor::{
    HUMIDITY_PERCENT_RANGE, JsonObject, LIGHT_LUX_RANGE, SensorReading, TEMPERATURE_CELSIUS_RANGE,
};

// Earlier keys win when a payload carries both spellings.
const TEMPERATURE_KEYS: &[&str] = &["temperature", "suhu"];
const HUMIDITY_KEYS: &[&str] = &["humidity"];
const LIGHT_KEYS: &[&str] = &["lux", "light"];

pub fn normalize(data: &JsonObject) -> Result<SensorReading, NormalizeError> {
    let (Some(temperature), Some(humidity), Some(light)) = (
        resolve(data, TEMPERATURE_KEYS),
        resolve(data, HUMIDITY_KEYS),
        resolve(data, LIGHT_KEYS),
    ) else {
        let mut received_keys: Vec<String> = data.keys().cloned().collect();
        received_keys.sort();
        return Err(NormalizeError::Incomplete { received_keys });
    };

    Ok(SensorReading {
        temperature: checked("temperature", temperature, TEMPERATURE_CELSIUS_RANGE)?,
        humidity: checked("humidity", humidity, HUMIDITY_PERCENT_RANGE)?,
        light: checked("light", light, LIGHT_LUX_RANGE)?,
    })
}

fn resolve<'a>(data: &'a JsonObject, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|key| data.get(*key))
}

fn checked(
    field: &'static str,
    value: &Value,
    range: RangeInclusive<f64>,
) -> Result<Number, NormalizeError> {
    let Value::Number(number) = value else {
        return Err(NormalizeError::NotNumeric { field });
    };

    let Some(as_float) = number.as_f64() else {
        return Err(NormalizeError::NotNumeric { field });
    };
    if !range.contains(&as_float) {
        return Err(NormalizeError::OutOfRange {
            field,
            value: as_float,
        });
    }

    Ok(number.clone())
}
