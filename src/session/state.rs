use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// Connection attempt started, initially or after a backoff pause.
    Start,
    /// Broker acknowledged the handshake.
    ConnAck,
    /// Transport or protocol failure.
    NetworkError,
}

impl SessionState {
    /// Next state, or `None` if `event` has no meaning in this state.
    pub fn on(self, event: SessionEvent) -> Option<SessionState> {
        match (self, event) {
            (SessionState::Disconnected, SessionEvent::Start) => Some(SessionState::Connecting),
            (SessionState::Connecting, SessionEvent::ConnAck) => Some(SessionState::Connected),
            (SessionState::Connecting | SessionState::Connected, SessionEvent::NetworkError) => {
                Some(SessionState::Disconnected)
            }
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connecting => "connecting",
            SessionState::Connected => "connected",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
