//! The connection lifecycle.
//!
//! A [`Session`] loops `Connecting → Authenticating → Active` forever. While
//! active it runs a cohort of five futures (broadcast listener, submission
//! loop, keepalive, watchdog, history writer) inside one `select!`: the
//! first member to finish decides the outcome and the others are dropped
//! with it, before the streams are closed. Retryable failures wait out the
//! reconnect delay and start over; an invalid token or a vanished
//! presentation layer ends the loop.

use std::{convert::Infallible, future::Future, time::Duration};

use tokio::{
    io::{AsyncBufRead, AsyncWrite, AsyncWriteExt, BufReader},
    select,
    sync::mpsc::{UnboundedReceiver, UnboundedSender},
    time::sleep,
};
use tracing::{debug, info, warn};

use crate::{
    auth::{Credentials, Handshake, authenticate},
    channels::{Presentation, PulseSender, SessionChannels, channels, pulse_channel},
    connector::Connector,
    error::{SessionError, Stream},
    events::{ChatMessage, ConnectionState, Pulse, PulseSource, StatusUpdate},
    history::{self, HistoryFile},
    liveness::{keep_alive, watchdog},
    protocol::{ServerEvent, classify, read_line_lossy, write_message},
};

/// Timing of the liveness checks and of reconnects.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub watchdog_timeout: Duration,
    pub keepalive_interval: Duration,
    pub reconnect_delay: Duration,
}

impl SessionConfig {
    /// Pause between keepalives, kept well inside the watchdog bound so an
    /// idle but healthy connection always pulses before the watchdog fires.
    pub fn keepalive_period(&self) -> Duration {
        self.keepalive_interval.min(self.watchdog_timeout / 2)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            watchdog_timeout: Duration::from_secs(3),
            keepalive_interval: Duration::from_secs(2),
            reconnect_delay: Duration::from_secs(5),
        }
    }
}

pub struct Session<C> {
    connector: C,
    config: SessionConfig,
    credentials: Credentials,
    history: HistoryFile,
    channels: SessionChannels,
}

impl<C: Connector> Session<C> {
    /// Build a session and the presentation layer's end of its queues.
    pub fn new(
        connector: C,
        config: SessionConfig,
        credentials: Credentials,
        history: HistoryFile,
    ) -> (Self, Presentation) {
        let (channels, presentation) = channels();
        let session = Self {
            connector,
            config,
            credentials,
            history,
            channels,
        };
        (session, presentation)
    }

    /// The current account token, including one issued during registration.
    pub fn token(&self) -> Option<&str> {
        self.credentials.token.as_deref()
    }

    /// Keep the connection up until `shutdown` resolves.
    ///
    /// Only non-retryable failures are returned: an invalid token, or a
    /// presentation layer that stopped answering.
    pub async fn run_until<F>(&mut self, shutdown: F) -> Result<(), SessionError>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            let error = select! {
                _ = &mut shutdown => {
                    info!("session shutting down");
                    self.report_closed();
                    return Ok(());
                }
                outcome = self.attempt() => match outcome {
                    Ok(never) => match never {},
                    Err(error) => error,
                },
            };

            // The watchdog already reported the closed state itself.
            if !matches!(error, SessionError::ConnectionLost(_)) {
                self.report_closed();
            }

            if !error.is_retryable() {
                warn!(%error, "session stopped");
                return Err(error);
            }

            warn!(%error, delay = ?self.config.reconnect_delay, "connection lost, reconnecting");
            select! {
                _ = &mut shutdown => {
                    info!("session shutting down");
                    return Ok(());
                }
                _ = sleep(self.config.reconnect_delay) => {}
            }
        }
    }

    /// Like [`run_until`](Self::run_until), but a rejected token is dropped
    /// and the next attempt registers a new account instead of giving up.
    pub async fn run_registering_until<F>(&mut self, shutdown: F) -> Result<(), SessionError>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            match self.run_until(shutdown.as_mut()).await {
                Err(SessionError::InvalidToken) if self.credentials.token.is_some() => {
                    warn!("account token rejected, registering a new account");
                    self.credentials.token = None;
                }
                outcome => return outcome,
            }
        }
    }

    pub async fn run_until_ctrl_c(&mut self) -> Result<(), SessionError> {
        self.run_registering_until(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = ?err, "failed to install ctrl-c handler");
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    fn report_closed(&self) {
        let status = &self.channels.status;
        status.report(StatusUpdate::ReadStateChanged(ConnectionState::Closed));
        status.report(StatusUpdate::SendStateChanged(ConnectionState::Closed));
    }

    /// One connection attempt. Never returns successfully; the error says why
    /// the connection ended.
    async fn attempt(&mut self) -> Result<Infallible, SessionError> {
        let Self {
            connector,
            config,
            credentials,
            history,
            channels,
        } = self;
        let status = &channels.status;

        status.report(StatusUpdate::ReadStateChanged(ConnectionState::Initiated));
        status.report(StatusUpdate::SendStateChanged(ConnectionState::Initiated));

        let mut broadcast = BufReader::new(connector.open_broadcast().await?);
        status.report(StatusUpdate::ReadStateChanged(ConnectionState::Established));
        let (command_reader, mut command_writer) = connector.open_command().await?;
        let mut command_reader = BufReader::new(command_reader);

        let (pulses, pulse_rx) = pulse_channel();
        let mut handshake = Handshake {
            status,
            pulses: &pulses,
            nicknames: &mut channels.nicknames,
        };
        authenticate(
            &mut command_reader,
            &mut command_writer,
            credentials,
            &mut handshake,
        )
        .await?;
        status.report(StatusUpdate::SendStateChanged(ConnectionState::Established));

        let outcome = select! {
            result = listen_broadcast(&mut broadcast, &channels.display, &channels.history_tx, &pulses) => result,
            result = submit_messages(&mut command_writer, &mut channels.outbound_rx, &pulses) => result,
            result = keep_alive(&mut command_reader, &channels.outbound_tx, &pulses, config.keepalive_period()) => result,
            result = watchdog(pulse_rx, config.watchdog_timeout, status) => result,
            result = history::drain(&mut channels.history_rx, history) => result,
        };

        if let Err(error) = command_writer.shutdown().await {
            debug!(?error, "failed to shut down the command stream cleanly");
        }
        outcome
    }
}

/// Forward chat lines from the broadcast stream to the display and history
/// queues.
pub async fn listen_broadcast<R>(
    reader: &mut R,
    display: &UnboundedSender<ChatMessage>,
    history: &UnboundedSender<ChatMessage>,
    pulses: &PulseSender,
) -> Result<Infallible, SessionError>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let Some(line) = read_line_lossy(reader).await? else {
            return Err(SessionError::StreamClosed(Stream::Broadcast));
        };
        pulses.pulse(Pulse {
            source: PulseSource::Broadcast,
        });

        match classify(&line) {
            Some(ServerEvent::Chat(text)) => {
                let message = ChatMessage::new(text);
                if history.send(message.clone()).is_err() {
                    debug!("history queue has no receiver");
                }
                if display.send(message).is_err() {
                    debug!("display queue has no receiver");
                }
            }
            Some(event) => debug!(?event, "ignoring non-chat line on the broadcast stream"),
            None => {}
        }
    }
}

/// Post queued messages, each terminated by a blank line.
pub async fn submit_messages<W>(
    writer: &mut W,
    outbound: &mut UnboundedReceiver<String>,
    pulses: &PulseSender,
) -> Result<Infallible, SessionError>
where
    W: AsyncWrite + Unpin,
{
    loop {
        let Some(text) = outbound.recv().await else {
            return Err(SessionError::PresentationClosed);
        };
        write_message(writer, &text).await?;
        pulses.pulse(Pulse {
            source: PulseSource::Submission,
        });
    }
}
