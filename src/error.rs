use reqwest::StatusCode;
use thiserror::Error;

/// Inbound payload could not be decoded into a JSON object.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("payload is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("payload is not a JSON object: {0}")]
    NotObject(String),
}

#[derive(Debug, Error, PartialEq)]
pub enum NormalizeError {
    #[error(
        "incomplete sensor data, expected suhu/temperature, humidity, lux/light; received keys: {received_keys:?}"
    )]
    Incomplete { received_keys: Vec<String> },

    #[error("sensor field `{field}` is not a number")]
    NotNumeric { field: &'static str },

    #[error("sensor field `{field}` out of range: {value}")]
    OutOfRange { field: &'static str, value: f64 },
}

#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("backend request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("backend rejected data: {status}")]
    Rejected { status: StatusCode },
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("giving up after {attempts} consecutive connection failures: {last_error}")]
    ReconnectExhausted {
        attempts: u32,
        last_error: rumqttc::ConnectionError,
    },
}

/// Anything that can go wrong while handling one inbound message.
#[derive(Debug, Error)]
pub enum HandleError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Normalize(#[from] NormalizeError),

    #[error(transparent)]
    Forward(#[from] ForwardError),
}
