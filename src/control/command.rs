use chrono::{DateTime, FixedOffset, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlCommand {
    pub relay: bool,

    pub timestamp: DateTime<FixedOffset>,
}

impl ControlCommand {
    pub fn new(relay: bool, timestamp: DateTime<FixedOffset>) -> Self {
        Self { relay, timestamp }
    }

    /// Command stamped with the current time in `timezone`.
    pub fn now(relay: bool, timezone: Tz) -> Self {
        Self::new(relay, Utc::now().with_timezone(&timezone).fixed_offset())
    }

    pub fn to_payload(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    pub fn state_label(&self) -> &'static str {
        if self.relay { "ON" } else { "OFF" }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::*;

    #[test]
    fn payload_shape() {
        let timestamp = DateTime::parse_from_rfc3339("2025-11-02T08:30:00+07:00").unwrap();
        let command = ControlCommand::new(true, timestamp);

        let value: Value = serde_json::from_slice(&command.to_payload().unwrap()).unwrap();

        assert_eq!(value["relay"], Value::Bool(true));
        assert_eq!(value["timestamp"], "2025-11-02T08:30:00+07:00");
        assert_eq!(value.as_object().unwrap().len(), 2);
    }

    #[test]
    fn timestamp_uses_timezone_offset() {
        let command = ControlCommand::now(false, chrono_tz::Asia::Jakarta);

        assert_eq!(command.timestamp.offset().local_minus_utc(), 7 * 3600);
        assert_eq!(command.state_label(), "OFF");
    }

    #[test]
    fn payload_round_trips_through_json() {
        let command = ControlCommand::now(true, Tz::UTC);

        let decoded: ControlCommand =
            serde_json::from_slice(&command.to_payload().unwrap()).unwrap();

        assert_eq!(decoded, command);
    }
}
