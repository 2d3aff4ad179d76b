use std::fmt;

use chrono::{DateTime, Local};

/// Timestamp layout used for every received chat line, on screen and on disk.
pub const TIMESTAMP_FORMAT: &str = "%d.%m.%y %H:%M:%S";

/// Lifecycle of one side (read or send) of the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Initiated,
    Established,
    Closed,
}

/// Events published to the presentation layer on the status queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusUpdate {
    ReadStateChanged(ConnectionState),
    SendStateChanged(ConnectionState),
    NicknameReceived(String),
    /// The server minted a token for a freshly registered account. This is
    /// the only copy; the receiver is responsible for storing it.
    NewTokenIssued(String),
    /// The server asked for a nickname and none was configured. The answer is
    /// expected on the nickname queue.
    NicknameRequested,
}

/// A line of chat as received from the broadcast stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub received_at: DateTime<Local>,
    pub text: String,
}

impl ChatMessage {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            received_at: Local::now(),
            text: text.into(),
        }
    }
}

impl fmt::Display for ChatMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}",
            self.received_at.format(TIMESTAMP_FORMAT),
            self.text
        )
    }
}

/// Which activity proved the connection alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PulseSource {
    Broadcast,
    Submission,
    KeepAlive,
    Handshake,
}

/// Liveness signal consumed only by the watchdog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pulse {
    pub source: PulseSource,
}
