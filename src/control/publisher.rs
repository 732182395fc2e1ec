use std::future::Future;

use anyhow::{Context as _, Result};
use chrono_tz::Tz;
use rumqttc::{AsyncClient, QoS};
use tracing::info;

use crate::control::ControlCommand;

/// Outbound side of the broker connection.
pub trait ControlSink: Send + Sync {
    /// Fire-and-forget publish; returns once the message is queued.
    fn send(&self, topic: &str, payload: Vec<u8>) -> impl Future<Output = Result<()>> + Send;
}

impl ControlSink for AsyncClient {
    async fn send(&self, topic: &str, payload: Vec<u8>) -> Result<()> {
        self.publish(topic, QoS::AtMostOnce, false, payload)
            .await
            .with_context(|| format!("failed to publish to {topic}"))
    }
}

#[derive(Debug, Clone)]
pub struct ControlPublisher<S> {
    sink: S,
    topic: String,
    timezone: Tz,
}

impl<S: ControlSink> ControlPublisher<S> {
    pub fn new(sink: S, topic: impl Into<String>, timezone: Tz) -> Self {
        Self {
            sink,
            topic: topic.into(),
            timezone,
        }
    }

    pub async fn publish(&self, relay: bool) -> Result<ControlCommand> {
        let command = ControlCommand::now(relay, self.timezone);
        let payload = command
            .to_payload()
            .context("failed to serialize control command")?;

        self.sink.send(&self.topic, payload).await?;
        info!(topic = %self.topic, "published control: relay={}", command.state_label());

        Ok(command)
    }
}
