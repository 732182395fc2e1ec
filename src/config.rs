use std::time::Duration;

use anyhow::{Context as _, Result, bail};
use chrono_tz::Tz;
use url::Url;
use uuid::Uuid;

use crate::session::ReconnectPolicy;

pub const DEFAULT_BROKER_HOST: &str = "broker.hivemq.com";
pub const DEFAULT_BROKER_PORT: u16 = 1883;
pub const DEFAULT_SENSOR_TOPIC: &str = "hidroponik/sensor/data";
pub const DEFAULT_CONTROL_TOPIC: &str = "hidroponik/control/relay";
pub const DEFAULT_BACKEND_URL: &str = "http://localhost:3000/api/data_sensor";
pub const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(60);

const CLIENT_ID_PREFIX: &str = "hidroponik-bridge";

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub broker_host: String,

    pub broker_port: u16,

    pub client_id: String,

    pub keep_alive: Duration,

    pub sensor_topic: String,

    pub control_topic: String,

    pub backend_url: String,

    pub timezone: Tz,

    pub reconnect: ReconnectPolicy,
}

impl BridgeConfig {
    pub fn validate(&self) -> Result<()> {
        if self.broker_host.trim().is_empty() {
            bail!("broker host must not be empty");
        }
        if self.broker_port == 0 {
            bail!("broker port must not be 0");
        }
        if self.client_id.trim().is_empty() {
            bail!("client id must not be empty");
        }
        if self.sensor_topic == self.control_topic {
            bail!(
                "sensor and control topics must differ: {}",
                self.sensor_topic
            );
        }
        if self.reconnect.initial_delay.is_zero() {
            bail!("reconnect initial delay must be greater than 0");
        }
        if self.reconnect.max_delay < self.reconnect.initial_delay {
            bail!(
                "reconnect max delay ({:?}) must not be shorter than the initial delay ({:?})",
                self.reconnect.max_delay,
                self.reconnect.initial_delay
            );
        }
        let backend_url = Url::parse(&self.backend_url)
            .with_context(|| format!("invalid backend URL: {}", self.backend_url))?;
        match backend_url.scheme() {
            "http" | "https" => {}
            scheme => bail!("unsupported backend URL scheme: {scheme}"),
        }

        Ok(())
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            broker_host: DEFAULT_BROKER_HOST.to_string(),
            broker_port: DEFAULT_BROKER_PORT,
            client_id: default_client_id(),
            keep_alive: DEFAULT_KEEP_ALIVE,
            sensor_topic: DEFAULT_SENSOR_TOPIC.to_string(),
            control_topic: DEFAULT_CONTROL_TOPIC.to_string(),
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            timezone: Tz::UTC,
            reconnect: ReconnectPolicy::default(),
        }
    }
}

/// Unique per process, so several bridges can share a broker without evicting each other.
pub fn default_client_id() -> String {
    format!("{CLIENT_ID_PREFIX}-{}", Uuid::new_v4().simple())
}
