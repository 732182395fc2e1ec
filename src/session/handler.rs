use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use rumqttc::ConnectionError;
use tracing::{debug, error, info, warn};

use crate::error::{ForwardError, HandleError};
use crate::ingest::{Forward, Forwarded};
use crate::sensor::{decode_object, decode_value, normalize};

/// Reacts to broker session events. Implementations must not fail: every
/// error is dealt with inside the handler.
pub trait EventHandler: Send {
    fn on_connect(&mut self);

    fn on_message(&mut self, topic: &str, payload: &[u8]) -> impl Future<Output = ()> + Send;

    fn on_disconnect(&mut self, reason: &ConnectionError);
}

#[derive(Debug, Default)]
pub struct HandlerStats {
    received: AtomicU64,
    forwarded: AtomicU64,
    dropped: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub received: u64,
    pub forwarded: u64,
    pub dropped: u64,
}

impl HandlerStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            forwarded: self.forwarded.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

/// Routes sensor telemetry to the backend and logs control echoes.
#[derive(Debug)]
pub struct BridgeHandler<F> {
    sensor_topic: String,
    control_topic: String,
    forwarder: F,
    stats: Arc<HandlerStats>,
}

impl<F: Forward> BridgeHandler<F> {
    pub fn new(
        sensor_topic: impl Into<String>,
        control_topic: impl Into<String>,
        forwarder: F,
    ) -> Self {
        Self {
            sensor_topic: sensor_topic.into(),
            control_topic: control_topic.into(),
            forwarder,
            stats: Arc::default(),
        }
    }

    pub fn stats(&self) -> Arc<HandlerStats> {
        self.stats.clone()
    }

    async fn handle_sensor(&self, payload: &[u8]) -> Result<Forwarded, HandleError> {
        let data = decode_object(payload)?;
        let reading = normalize(&data)?;

        Ok(self.forwarder.forward(reading).await?)
    }

    fn handle_control(&self, payload: &[u8]) -> Result<(), HandleError> {
        let command = decode_value(payload)?;
        info!("control command received: {command}");

        Ok(())
    }
}

impl<F: Forward> EventHandler for BridgeHandler<F> {
    fn on_connect(&mut self) {
        info!(
            "subscribing to topics: {}, {}",
            self.sensor_topic, self.control_topic
        );
    }

    async fn on_message(&mut self, topic: &str, payload: &[u8]) {
        self.stats.received.fetch_add(1, Ordering::Relaxed);
        info!(
            %topic,
            payload = %String::from_utf8_lossy(payload),
            "received message"
        );

        let result = if topic == self.sensor_topic {
            self.handle_sensor(payload).await.map(|_| true)
        } else if topic == self.control_topic {
            self.handle_control(payload).map(|_| false)
        } else {
            debug!(%topic, "ignoring message on unexpected topic");
            Ok(false)
        };

        match result {
            Ok(true) => {
                self.stats.forwarded.fetch_add(1, Ordering::Relaxed);
            }
            Ok(false) => {}
            Err(err) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                report(topic, payload, &err);
            }
        }
    }

    fn on_disconnect(&mut self, reason: &ConnectionError) {
        warn!("disconnected from MQTT broker: {reason}");
    }
}

fn report(topic: &str, payload: &[u8], err: &HandleError) {
    match err {
        HandleError::Decode(err) => {
            warn!(%topic, "invalid JSON: {}: {err}", String::from_utf8_lossy(payload));
        }
        HandleError::Normalize(err) => warn!(%topic, "invalid data format: {err}"),
        HandleError::Forward(ForwardError::Rejected { status }) => {
            error!(%topic, "failed to save data: {status}");
        }
        HandleError::Forward(err @ ForwardError::Transport(_)) => {
            error!(%topic, "backend request error: {err}");
        }
    }
}
