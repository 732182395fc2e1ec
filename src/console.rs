use std::io::{BufRead as _, stdin};
use std::thread;

use tokio::sync::mpsc::{Receiver, channel};
use tracing::{debug, error, warn};

use crate::control::{ControlPublisher, ControlSink};

const LINE_BUFFER: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorCommand {
    On,
    Off,
    Exit,
}

impl OperatorCommand {
    /// `None` for anything that is not a known command word.
    pub fn parse(line: &str) -> Option<Self> {
        match line.trim().to_lowercase().as_str() {
            "on" => Some(OperatorCommand::On),
            "off" => Some(OperatorCommand::Off),
            "exit" => Some(OperatorCommand::Exit),
            _ => None,
        }
    }
}

/// Reads stdin on a dedicated thread. The channel closes at end of input.
pub fn spawn_stdin_reader() -> Receiver<String> {
    let (tx, rx) = channel(LINE_BUFFER);

    thread::spawn(move || {
        for line in stdin().lock().lines() {
            let line = match line {
                Ok(line) => line,
                Err(err) => {
                    warn!("failed to read operator input: {err}");
                    break;
                }
            };

            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });

    rx
}

/// Handles operator commands until `exit` or until the input closes.
pub async fn run_console<S: ControlSink>(
    lines: &mut Receiver<String>,
    publisher: &ControlPublisher<S>,
) {
    while let Some(line) = lines.recv().await {
        let relay = match OperatorCommand::parse(&line) {
            Some(OperatorCommand::On) => true,
            Some(OperatorCommand::Off) => false,
            Some(OperatorCommand::Exit) => return,
            None => {
                debug!(input = %line.trim(), "ignoring unknown operator input");
                continue;
            }
        };

        if let Err(err) = publisher.publish(relay).await {
            error!("failed to publish control command: {err:#}");
        }
    }
}
