use serde_json::{Map, Value};

use crate::error::DecodeError;

pub type JsonObject = Map<String, Value>;

/// Decodes any UTF-8 JSON payload as received from the broker.
pub fn decode_value(payload: &[u8]) -> Result<Value, DecodeError> {
    let text = std::str::from_utf8(payload)?;

    Ok(serde_json::from_str(text)?)
}

/// Like [`decode_value`], but only JSON objects are accepted.
pub fn decode_object(payload: &[u8]) -> Result<JsonObject, DecodeError> {
    match decode_value(payload)? {
        Value::Object(object) => Ok(object),
        other => Err(DecodeError::NotObject(other.to_string())),
    }
}
