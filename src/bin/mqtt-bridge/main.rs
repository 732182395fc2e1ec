mod args;

use std::process::ExitCode;

use anyhow::{Context as _, Result};
use args::Args;
use clap::Parser as _;
use hidroponik_bridge::{
    console::{run_console, spawn_stdin_reader},
    control::ControlPublisher,
    error::SessionError,
    ingest::HttpForwarder,
    session::{BridgeHandler, BrokerSession, StatsSnapshot},
};
use tokio::{
    signal::ctrl_c,
    task::{JoinError, JoinHandle},
    time::{Duration, timeout},
};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt as _, util::SubscriberInitExt as _};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{e:#}");
            ExitCode::from(1)
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn run() -> Result<ExitCode> {
    let config = Args::parse().into_config();
    config.validate().context("invalid configuration")?;

    info!(
        broker = %format!("{}:{}", config.broker_host, config.broker_port),
        client_id = %config.client_id,
        backend = %config.backend_url,
        topic = %config.sensor_topic,
        "MQTT bridge starting"
    );

    let forwarder = HttpForwarder::new(config.backend_url.clone());
    let handler = BridgeHandler::new(
        config.sensor_topic.clone(),
        config.control_topic.clone(),
        forwarder,
    );
    let stats = handler.stats();

    let session = BrokerSession::new(&config, handler);
    let client = session.client();
    let mut session_task = tokio::spawn(session.run());

    let publisher =
        ControlPublisher::new(client.clone(), config.control_topic.clone(), config.timezone);

    let mut lines = spawn_stdin_reader();
    info!("type 'on' to switch the relay on, 'off' to switch it off, 'exit' to stop reading input");
    let interrupted = tokio::select! {
        () = run_console(&mut lines, &publisher) => {
            info!("MQTT bridge is running, press Ctrl+C to exit");
            false
        }
        result = ctrl_c() => {
            result.context("failed to listen for interrupt")?;
            true
        }
        result = &mut session_task => return finish(result, stats.snapshot()),
    };

    if !interrupted {
        tokio::select! {
            result = ctrl_c() => result.context("failed to listen for interrupt")?,
            result = &mut session_task => return finish(result, stats.snapshot()),
        }
    }

    info!("shutting down MQTT bridge");
    if let Err(err) = client.disconnect().await {
        warn!("failed to request broker disconnect: {err}");
    }
    stop(session_task).await;

    let snapshot = stats.snapshot();
    info!(
        received = snapshot.received,
        forwarded = snapshot.forwarded,
        dropped = snapshot.dropped,
        "MQTT bridge stopped"
    );

    Ok(ExitCode::SUCCESS)
}

async fn stop<T>(mut task: JoinHandle<T>) {
    if timeout(SHUTDOWN_GRACE, &mut task).await.is_err() {
        task.abort();
    }
}

fn finish(
    result: Result<Result<(), SessionError>, JoinError>,
    snapshot: StatsSnapshot,
) -> Result<ExitCode> {
    info!(
        received = snapshot.received,
        forwarded = snapshot.forwarded,
        dropped = snapshot.dropped,
        "broker session ended"
    );

    match result.context("broker session task failed")? {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(err) => {
            error!("{err}");
            Ok(ExitCode::from(1))
        }
    }
}
