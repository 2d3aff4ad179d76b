//! Short-lived operations that do not need a full session: registering an
//! account, posting a single message, and logging the broadcast stream to
//! disk.

use std::{convert::Infallible, time::Duration};

use tokio::{
    io::{AsyncWriteExt, BufReader},
    select,
    sync::mpsc::{UnboundedReceiver, unbounded_channel},
    time::sleep,
};
use tracing::{info, warn};

use crate::{
    auth::{Credentials, Handshake, authenticate},
    channels::{pulse_channel, status_channel},
    connector::Connector,
    error::SessionError,
    events::ChatMessage,
    history::{self, HistoryFile},
    protocol::write_message,
    session::listen_broadcast,
};

/// A freshly created account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub token: String,
    pub nickname: Option<String>,
}

/// Register `nickname` and return the token the server issued.
pub async fn register<C: Connector>(
    connector: &C,
    nickname: &str,
) -> Result<Registration, SessionError> {
    let mut credentials = Credentials::new(None, Some(nickname.to_string()));
    let (reader, mut writer) = connector.open_command().await?;
    let mut reader = BufReader::new(reader);

    let (status, _status_rx) = status_channel();
    let (pulses, _pulse_rx) = pulse_channel();
    let (_nickname_tx, mut nicknames) = unbounded_channel();
    let mut handshake = Handshake {
        status: &status,
        pulses: &pulses,
        nicknames: &mut nicknames,
    };
    let nickname = authenticate(&mut reader, &mut writer, &mut credentials, &mut handshake).await?;
    let _ = writer.shutdown().await;

    let token = credentials.token.ok_or_else(|| {
        SessionError::UnexpectedReply("registration finished without a token".to_string())
    })?;
    info!(?nickname, "account registered");
    Ok(Registration { token, nickname })
}

/// Log in with `token`, post `text`, and disconnect.
pub async fn send_message<C: Connector>(
    connector: &C,
    token: &str,
    text: &str,
) -> Result<(), SessionError> {
    let mut credentials = Credentials::new(Some(token.to_string()), None);
    if credentials.token.is_none() {
        return Err(SessionError::InvalidToken);
    }
    let (reader, mut writer) = connector.open_command().await?;
    let mut reader = BufReader::new(reader);

    let (status, _status_rx) = status_channel();
    let (pulses, _pulse_rx) = pulse_channel();
    let (_nickname_tx, mut nicknames) = unbounded_channel();
    let mut handshake = Handshake {
        status: &status,
        pulses: &pulses,
        nicknames: &mut nicknames,
    };
    authenticate(&mut reader, &mut writer, &mut credentials, &mut handshake).await?;

    write_message(&mut writer, text).await?;
    writer.shutdown().await?;
    info!("message posted");
    Ok(())
}

/// Append every broadcast chat line to `history` and hand it to `echo`,
/// reconnecting after `reconnect_delay` whenever the stream drops.
pub async fn listen<C, F>(
    connector: &C,
    history: &HistoryFile,
    reconnect_delay: Duration,
    mut echo: F,
) -> Result<Infallible, SessionError>
where
    C: Connector,
    F: FnMut(&ChatMessage),
{
    let (display_tx, mut display_rx) = unbounded_channel();
    let (history_tx, mut history_rx) = unbounded_channel();

    loop {
        let attempt = async {
            let mut reader = BufReader::new(connector.open_broadcast().await?);
            let (pulses, _pulse_rx) = pulse_channel();
            select! {
                result = listen_broadcast(&mut reader, &display_tx, &history_tx, &pulses) => result,
                result = history::drain(&mut history_rx, history) => result,
                result = echo_messages(&mut display_rx, &mut echo) => result,
            }
        };

        match attempt.await {
            Ok(never) => match never {},
            Err(error) if error.is_retryable() => {
                warn!(%error, delay = ?reconnect_delay, "broadcast stream lost, reconnecting");
                sleep(reconnect_delay).await;
            }
            Err(error) => return Err(error),
        }
    }
}

async fn echo_messages<F>(
    messages: &mut UnboundedReceiver<ChatMessage>,
    echo: &mut F,
) -> Result<Infallible, SessionError>
where
    F: FnMut(&ChatMessage),
{
    loop {
        let Some(message) = messages.recv().await else {
            return Err(SessionError::PresentationClosed);
        };
        echo(&message);
    }
}
