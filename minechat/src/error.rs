use std::{fmt, io, time::Duration};

use thiserror::Error;

/// Which of the two server connections a failure refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Broadcast,
    Command,
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stream::Broadcast => f.write_str("broadcast"),
            Stream::Command => f.write_str("command"),
        }
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    /// The server answered the token with `null`. Retrying with the same
    /// credentials is pointless; the account has to be registered again.
    #[error("the server did not recognise the account token; register a new account")]
    InvalidToken,

    #[error("no sign of life from the server for {0:?}")]
    ConnectionLost(Duration),

    #[error("{0} stream closed by the server")]
    StreamClosed(Stream),

    #[error("unexpected server reply during handshake: {0}")]
    UnexpectedReply(String),

    #[error("the presentation layer stopped listening")]
    PresentationClosed,

    #[error("network error: {0}")]
    Io(#[from] io::Error),
}

impl SessionError {
    /// Transient faults are retried by the session after the reconnect delay.
    pub fn is_retryable(&self) -> bool {
        match self {
            SessionError::ConnectionLost(_)
            | SessionError::StreamClosed(_)
            | SessionError::UnexpectedReply(_)
            | SessionError::Io(_) => true,
            SessionError::InvalidToken | SessionError::PresentationClosed => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_faults_are_retryable() {
        let refused = io::Error::from(io::ErrorKind::ConnectionRefused);
        assert!(SessionError::from(refused).is_retryable());
        assert!(SessionError::ConnectionLost(Duration::from_secs(3)).is_retryable());
        assert!(SessionError::StreamClosed(Stream::Broadcast).is_retryable());
    }

    #[test]
    fn invalid_token_is_fatal() {
        assert!(!SessionError::InvalidToken.is_retryable());
        assert!(!SessionError::PresentationClosed.is_retryable());
    }
}
