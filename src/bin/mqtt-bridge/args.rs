use std::time::Duration;

use chrono_tz::Tz;
use clap::Parser;
use hidroponik_bridge::config::{
    BridgeConfig, DEFAULT_BACKEND_URL, DEFAULT_BROKER_HOST, DEFAULT_BROKER_PORT,
    DEFAULT_CONTROL_TOPIC, DEFAULT_SENSOR_TOPIC, default_client_id,
};
use hidroponik_bridge::session::ReconnectPolicy;

#[derive(Debug, Parser)]
pub struct Args {
    #[arg(long, env = "MQTT_BROKER_HOST", default_value = DEFAULT_BROKER_HOST)]
    pub broker_host: String,

    #[arg(long, env = "MQTT_BROKER_PORT", default_value_t = DEFAULT_BROKER_PORT)]
    pub broker_port: u16,

    /// Defaults to a freshly generated id per process.
    #[arg(long, env = "MQTT_CLIENT_ID")]
    pub client_id: Option<String>,

    #[arg(long, env = "MQTT_KEEP_ALIVE_SECS", default_value_t = 60)]
    pub keep_alive_secs: u64,

    #[arg(long, env = "MQTT_SENSOR_TOPIC", default_value = DEFAULT_SENSOR_TOPIC)]
    pub sensor_topic: String,

    #[arg(long, env = "MQTT_CONTROL_TOPIC", default_value = DEFAULT_CONTROL_TOPIC)]
    pub control_topic: String,

    #[arg(long, env = "BACKEND_URL", default_value = DEFAULT_BACKEND_URL)]
    pub backend_url: String,

    #[arg(long, env = "TZ", default_value = "UTC")]
    pub timezone: Tz,

    /// 0 keeps retrying forever.
    #[arg(long, default_value_t = 0)]
    pub max_reconnect_attempts: u32,

    #[arg(long, default_value_t = 1)]
    pub reconnect_initial_delay_secs: u64,

    #[arg(long, default_value_t = 60)]
    pub reconnect_max_delay_secs: u64,

    #[arg(long, default_value_t = 5)]
    pub reconnect_alert_after: u32,
}

impl Args {
    pub fn into_config(self) -> BridgeConfig {
        BridgeConfig {
            broker_host: self.broker_host,
            broker_port: self.broker_port,
            client_id: self.client_id.unwrap_or_else(default_client_id),
            keep_alive: Duration::from_secs(self.keep_alive_secs),
            sensor_topic: self.sensor_topic,
            control_topic: self.control_topic,
            backend_url: self.backend_url,
            timezone: self.timezone,
            reconnect: ReconnectPolicy {
                initial_delay: Duration::from_secs(self.reconnect_initial_delay_secs),
                max_delay: Duration::from_secs(self.reconnect_max_delay_secs),
                max_attempts: self.max_reconnect_attempts,
                alert_after: self.reconnect_alert_after,
            },
        }
    }
}
