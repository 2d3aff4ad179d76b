//! Keepalive and watchdog for one connection attempt.
//!
//! The broadcast stream can stay silent for a long time, so the keepalive
//! posts an empty message on the command stream and waits for the server's
//! answer. Every successful read or write on either stream sends a
//! [`Pulse`]; the watchdog gives up once pulses stop for longer than its
//! timeout. This is the only place a stuck-but-open connection is detected.

use std::{convert::Infallible, time::Duration};

use tokio::{
    io::AsyncBufRead,
    sync::mpsc::{UnboundedReceiver, UnboundedSender},
    time::{sleep, timeout},
};
use tracing::{trace, warn};

use crate::{
    channels::{PulseSender, StatusSender},
    error::{SessionError, Stream},
    events::{ConnectionState, Pulse, PulseSource, StatusUpdate},
    protocol::read_line_lossy,
};

pub async fn keep_alive<R>(
    reader: &mut R,
    outbound: &UnboundedSender<String>,
    pulses: &PulseSender,
    interval: Duration,
) -> Result<Infallible, SessionError>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        outbound
            .send(String::new())
            .map_err(|_| SessionError::PresentationClosed)?;

        let Some(reply) = read_line_lossy(reader).await? else {
            return Err(SessionError::StreamClosed(Stream::Command));
        };
        trace!(%reply, "keepalive answered");
        pulses.pulse(Pulse {
            source: PulseSource::KeepAlive,
        });

        sleep(interval).await;
    }
}

pub async fn watchdog(
    mut pulses: UnboundedReceiver<Pulse>,
    limit: Duration,
    status: &StatusSender,
) -> Result<Infallible, SessionError> {
    loop {
        match timeout(limit, pulses.recv()).await {
            Ok(Some(pulse)) => trace!(source = ?pulse.source, "connection is alive"),
            Ok(None) => {
                // Every pulse sender is gone, so nothing can prove liveness.
                return Err(SessionError::ConnectionLost(limit));
            }
            Err(_) => {
                warn!(?limit, "no pulse from the server, dropping the connection");
                status.report(StatusUpdate::ReadStateChanged(ConnectionState::Closed));
                status.report(StatusUpdate::SendStateChanged(ConnectionState::Closed));
                return Err(SessionError::ConnectionLost(limit));
            }
        }
    }
}
