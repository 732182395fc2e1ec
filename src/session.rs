mod handler;
mod reconnect;
mod state;

pub use handler::*;
pub use reconnect::*;
pub use state::*;

use std::any::Any;
use std::panic::AssertUnwindSafe;

use futures::FutureExt as _;
use rumqttc::{AsyncClient, ConnectionError, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use tokio::time::sleep;
use tracing::{debug, error, info, trace, warn};

use crate::config::BridgeConfig;
use crate::error::SessionError;

const REQUEST_CHANNEL_CAPACITY: usize = 32;

/// One broker connection, its subscriptions, and the handler fed by it.
pub struct BrokerSession<H> {
    client: AsyncClient,
    eventloop: EventLoop,
    handler: H,
    topics: Vec<String>,
    /// Topics whose SUBSCRIBE is not yet queued on the request channel.
    pending_subscriptions: Vec<String>,
    broker: String,
    backoff: Backoff,
    state: SessionState,
}

impl<H: EventHandler> BrokerSession<H> {
    pub fn new(config: &BridgeConfig, handler: H) -> Self {
        let mut options = MqttOptions::new(
            config.client_id.clone(),
            config.broker_host.clone(),
            config.broker_port,
        );
        options.set_keep_alive(config.keep_alive);
        options.set_clean_session(true);

        let (client, eventloop) = AsyncClient::new(options, REQUEST_CHANNEL_CAPACITY);

        Self {
            client,
            eventloop,
            handler,
            topics: vec![config.sensor_topic.clone(), config.control_topic.clone()],
            pending_subscriptions: Vec::new(),
            broker: format!("{}:{}", config.broker_host, config.broker_port),
            backoff: Backoff::new(config.reconnect),
            state: SessionState::default(),
        }
    }

    /// Handle for publishing and disconnecting from other tasks.
    pub fn client(&self) -> AsyncClient {
        self.client.clone()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Drives the connection until a client-initiated disconnect or until the
    /// reconnect policy gives up.
    pub async fn run(mut self) -> Result<(), SessionError> {
        self.transition(SessionEvent::Start);
        info!(broker = %self.broker, "connecting to MQTT broker");

        loop {
            self.request_subscriptions();

            let event = match self.eventloop.poll().await {
                Ok(event) => event,
                Err(err) => {
                    self.connection_lost(err).await?;
                    continue;
                }
            };

            match event {
                Event::Incoming(Packet::ConnAck(_)) => {
                    self.transition(SessionEvent::ConnAck);
                    self.backoff.reset();
                    info!(broker = %self.broker, "connected to MQTT broker");
                    self.pending_subscriptions = self.topics.clone();
                    self.request_subscriptions();
                    self.handler.on_connect();
                }
                Event::Incoming(Packet::Publish(publish)) => {
                    let delivered =
                        AssertUnwindSafe(self.handler.on_message(&publish.topic, &publish.payload))
                            .catch_unwind()
                            .await;
                    if let Err(panic) = delivered {
                        error!(
                            topic = %publish.topic,
                            "message handler panicked: {}",
                            panic_message(panic.as_ref())
                        );
                    }
                }
                Event::Incoming(Packet::SubAck(ack)) => {
                    debug!(pkid = ack.pkid, "subscription acknowledged");
                }
                Event::Outgoing(Outgoing::Disconnect) => {
                    info!(broker = %self.broker, "disconnected from MQTT broker");
                    return Ok(());
                }
                other => trace!("mqtt event: {other:?}"),
            }
        }
    }

    /// Queues outstanding SUBSCRIBEs. A full request channel leaves the rest
    /// pending until the next loop iteration has drained it.
    fn request_subscriptions(&mut self) {
        while let Some(topic) = self.pending_subscriptions.first() {
            // Never await here: the request channel is drained by this same loop.
            match self.client.try_subscribe(topic.as_str(), QoS::AtMostOnce) {
                Ok(()) => {
                    debug!(%topic, "subscribe requested");
                    self.pending_subscriptions.remove(0);
                }
                Err(err) => {
                    debug!(%topic, "request channel full, subscribe deferred: {err}");
                    return;
                }
            }
        }
    }

    async fn connection_lost(&mut self, err: ConnectionError) -> Result<(), SessionError> {
        self.transition(SessionEvent::NetworkError);
        self.pending_subscriptions.clear();
        self.handler.on_disconnect(&err);

        let delay = match self.backoff.failure() {
            Retry::After(delay) => delay,
            Retry::GiveUp => {
                error!(
                    broker = %self.broker,
                    attempts = self.backoff.failures(),
                    "giving up on MQTT broker"
                );
                return Err(SessionError::ReconnectExhausted {
                    attempts: self.backoff.failures(),
                    last_error: err,
                });
            }
        };

        if self.backoff.should_alert() {
            error!(
                broker = %self.broker,
                failures = self.backoff.failures(),
                "MQTT broker still unreachable"
            );
        }
        warn!("attempting to reconnect in {delay:?}");
        sleep(delay).await;
        self.transition(SessionEvent::Start);

        Ok(())
    }

    fn transition(&mut self, event: SessionEvent) {
        match self.state.on(event) {
            Some(next) => {
                debug!(from = %self.state, to = %next, "session state changed");
                self.state = next;
            }
            None => debug!(state = %self.state, ?event, "ignored session event"),
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use tokio::io::{AsyncReadExt as _, AsyncWriteExt as _};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::sync::mpsc::{UnboundedSender, unbounded_channel};
    use tokio::time::timeout;

    use super::*;

    const SENSOR_TOPIC: &str = "hidroponik/sensor/data";
    const CONTROL_TOPIC: &str = "hidroponik/control/relay";
    const CONNACK: [u8; 4] = [0x20, 0x02, 0x00, 0x00];
    const WAIT: Duration = Duration::from_secs(10);

    #[derive(Debug, Default)]
    struct Counts {
        connects: AtomicU32,
        messages: AtomicU32,
        disconnects: AtomicU32,
    }

    struct RecordingHandler {
        counts: Arc<Counts>,
        delivered: Option<UnboundedSender<(String, Vec<u8>)>>,
    }

    impl RecordingHandler {
        fn new(counts: Arc<Counts>) -> Self {
            Self {
                counts,
                delivered: None,
            }
        }
    }

    impl EventHandler for RecordingHandler {
        fn on_connect(&mut self) {
            self.counts.connects.fetch_add(1, Ordering::Relaxed);
        }

        async fn on_message(&mut self, topic: &str, payload: &[u8]) {
            if payload == b"boom" {
                panic!("handler failed on {topic}");
            }

            self.counts.messages.fetch_add(1, Ordering::Relaxed);
            if let Some(delivered) = &self.delivered {
                let _ = delivered.send((topic.to_string(), payload.to_vec()));
            }
        }

        fn on_disconnect(&mut self, _reason: &ConnectionError) {
            self.counts.disconnects.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn local_config(port: u16, max_attempts: u32) -> BridgeConfig {
        BridgeConfig {
            broker_host: "127.0.0.1".to_string(),
            broker_port: port,
            reconnect: ReconnectPolicy {
                initial_delay: Duration::from_millis(10),
                max_delay: Duration::from_millis(20),
                max_attempts,
                alert_after: 2,
            },
            ..BridgeConfig::default()
        }
    }

    /// What a single broker connection saw from the client.
    #[derive(Debug, Default)]
    struct ConnectionLog {
        publishes: usize,
        subscriptions: Vec<String>,
        disconnected: bool,
    }

    async fn read_packet(stream: &mut TcpStream) -> io::Result<(u8, Vec<u8>)> {
        let header = stream.read_u8().await?;

        let mut remaining = 0usize;
        let mut shift = 0;
        loop {
            let byte = stream.read_u8().await?;
            remaining |= ((byte & 0x7f) as usize) << shift;
            if byte & 0x80 == 0 {
                break;
            }
            shift += 7;
        }

        let mut body = vec![0; remaining];
        stream.read_exact(&mut body).await?;

        Ok((header, body))
    }

    fn publish_packet(topic: &str, payload: &[u8]) -> Vec<u8> {
        let mut body = (topic.len() as u16).to_be_bytes().to_vec();
        body.extend_from_slice(topic.as_bytes());
        body.extend_from_slice(payload);

        let mut packet = vec![0x30];
        let mut remaining = body.len();
        loop {
            let mut byte = (remaining % 128) as u8;
            remaining /= 128;
            if remaining > 0 {
                byte |= 0x80;
            }
            packet.push(byte);
            if remaining == 0 {
                break;
            }
        }
        packet.extend_from_slice(&body);
        packet
    }

    /// Minimal MQTT 3.1.1 broker side of one connection: acks CONNECT and
    /// SUBSCRIBE, and sends `deliveries` once both bridge topics are subscribed.
    async fn serve_connection(
        stream: &mut TcpStream,
        deliveries: &[(&str, &[u8])],
    ) -> io::Result<ConnectionLog> {
        let (header, _) = read_packet(stream).await?;
        assert_eq!(header & 0xf0, 0x10, "expected CONNECT");
        stream.write_all(&CONNACK).await?;

        let mut log = ConnectionLog::default();
        let mut delivered = false;
        loop {
            let (header, body) = match read_packet(stream).await {
                Ok(packet) => packet,
                Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => return Ok(log),
                Err(err) => return Err(err),
            };

            match header & 0xf0 {
                0x30 => log.publishes += 1,
                0x80 => {
                    let len = u16::from_be_bytes([body[2], body[3]]) as usize;
                    log.subscriptions
                        .push(String::from_utf8(body[4..4 + len].to_vec()).unwrap());
                    stream.write_all(&[0x90, 0x03, body[0], body[1], 0x00]).await?;
                }
                0xc0 => stream.write_all(&[0xd0, 0x00]).await?,
                0xe0 => {
                    log.disconnected = true;
                    return Ok(log);
                }
                other => panic!("unexpected packet type {other:#04x}"),
            }

            let subscribed = [SENSOR_TOPIC, CONTROL_TOPIC]
                .iter()
                .all(|topic| log.subscriptions.iter().any(|s| s == topic));
            if subscribed && !delivered {
                for (topic, payload) in deliveries {
                    stream.write_all(&publish_packet(topic, payload)).await?;
                }
                delivered = true;
            }
        }
    }

    #[test]
    fn new_session_starts_disconnected() {
        let session = BrokerSession::new(
            &BridgeConfig::default(),
            RecordingHandler::new(Arc::default()),
        );

        assert_eq!(session.state(), SessionState::Disconnected);
        assert_eq!(session.topics, vec![SENSOR_TOPIC, CONTROL_TOPIC]);
        assert!(session.pending_subscriptions.is_empty());
    }

    #[tokio::test]
    async fn gives_up_when_broker_is_unreachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let counts = Arc::new(Counts::default());
        let session = BrokerSession::new(
            &local_config(port, 3),
            RecordingHandler::new(counts.clone()),
        );

        let result = timeout(WAIT, session.run())
            .await
            .expect("session should give up before the timeout");

        assert!(matches!(
            result,
            Err(SessionError::ReconnectExhausted { attempts: 3, .. })
        ));
        assert_eq!(counts.disconnects.load(Ordering::Relaxed), 3);
        assert_eq!(counts.connects.load(Ordering::Relaxed), 0);
        assert_eq!(counts.messages.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn subscribes_delivers_and_disconnects_with_full_request_channel() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let counts = Arc::new(Counts::default());
        let (tx, mut delivered) = unbounded_channel();
        let handler = RecordingHandler {
            counts: counts.clone(),
            delivered: Some(tx),
        };
        let session = BrokerSession::new(&local_config(port, 0), handler);
        let client = session.client();

        // Control commands queued while offline leave no room for SUBSCRIBE at ConnAck.
        for _ in 0..REQUEST_CHANNEL_CAPACITY {
            client
                .try_publish(CONTROL_TOPIC, QoS::AtMostOnce, false, br#"{"relay":true}"#.to_vec())
                .unwrap();
        }

        let broker = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            serve_connection(
                &mut stream,
                &[(SENSOR_TOPIC, &br#"{"suhu": 20, "humidity": 50, "lux": 10}"#[..])],
            )
            .await
            .unwrap()
        });
        let session_task = tokio::spawn(session.run());

        let (topic, payload) = timeout(WAIT, delivered.recv()).await.unwrap().unwrap();
        assert_eq!(topic, SENSOR_TOPIC);
        assert_eq!(payload, br#"{"suhu": 20, "humidity": 50, "lux": 10}"#);

        client.disconnect().await.unwrap();
        let result = timeout(WAIT, session_task).await.unwrap().unwrap();
        assert!(result.is_ok());

        let log = timeout(WAIT, broker).await.unwrap().unwrap();
        assert_eq!(log.publishes, REQUEST_CHANNEL_CAPACITY);
        assert_eq!(log.subscriptions, vec![SENSOR_TOPIC, CONTROL_TOPIC]);
        assert!(log.disconnected);
        assert_eq!(counts.connects.load(Ordering::Relaxed), 1);
        assert_eq!(counts.disconnects.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn handler_panic_does_not_end_session() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let counts = Arc::new(Counts::default());
        let (tx, mut delivered) = unbounded_channel();
        let handler = RecordingHandler {
            counts: counts.clone(),
            delivered: Some(tx),
        };
        let session = BrokerSession::new(&local_config(port, 0), handler);
        let client = session.client();

        let broker = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            serve_connection(
                &mut stream,
                &[(CONTROL_TOPIC, &b"boom"[..]), (SENSOR_TOPIC, &b"{}"[..])],
            )
            .await
            .unwrap()
        });
        let session_task = tokio::spawn(session.run());

        let (topic, _) = timeout(WAIT, delivered.recv()).await.unwrap().unwrap();
        assert_eq!(topic, SENSOR_TOPIC);

        client.disconnect().await.unwrap();
        assert!(timeout(WAIT, session_task).await.unwrap().unwrap().is_ok());
        assert!(timeout(WAIT, broker).await.unwrap().unwrap().disconnected);
        assert_eq!(counts.messages.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn successful_connack_resets_backoff() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        // Refuse, accept then drop, refuse. With two attempts allowed the session
        // only reaches the third connection if ConnAck cleared the first failure.
        let broker = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            drop(stream);

            let (mut stream, _) = listener.accept().await.unwrap();
            read_packet(&mut stream).await.unwrap();
            stream.write_all(&CONNACK).await.unwrap();
            drop(stream);

            let (stream, _) = listener.accept().await.unwrap();
            drop(stream);
        });

        let counts = Arc::new(Counts::default());
        let session = BrokerSession::new(
            &local_config(port, 2),
            RecordingHandler::new(counts.clone()),
        );

        let result = timeout(WAIT, session.run()).await.unwrap();

        assert!(matches!(
            result,
            Err(SessionError::ReconnectExhausted { attempts: 2, .. })
        ));
        assert_eq!(counts.connects.load(Ordering::Relaxed), 1);
        assert_eq!(counts.disconnects.load(Ordering::Relaxed), 3);
        broker.abort();
    }
}
