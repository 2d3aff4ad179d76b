//! Login and registration handshake on the command stream.

use tokio::{
    io::{AsyncBufRead, AsyncWrite},
    sync::mpsc::UnboundedReceiver,
};
use tracing::{debug, info};

use crate::{
    channels::{PulseSender, StatusSender},
    error::{SessionError, Stream},
    events::{Pulse, PulseSource, StatusUpdate},
    protocol::{ServerEvent, classify, read_line_lossy, strip_line_breaks, write_line},
};

/// Account credentials. Blank values count as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub token: Option<String>,
    pub nickname: Option<String>,
}

impl Credentials {
    pub fn new(token: Option<String>, nickname: Option<String>) -> Self {
        Self {
            token: non_blank(token),
            nickname: non_blank(nickname),
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

/// Side channels the handshake reports through.
pub struct Handshake<'a> {
    pub status: &'a StatusSender,
    pub pulses: &'a PulseSender,
    /// Answers to [`StatusUpdate::NicknameRequested`].
    pub nicknames: &'a mut UnboundedReceiver<String>,
}

/// Drive the handshake until the server invites us to post.
///
/// A token minted during registration is stored in `credentials` and
/// reported as [`StatusUpdate::NewTokenIssued`]. Returns the nickname the
/// server confirmed, if it sent one.
pub async fn authenticate<R, W>(
    reader: &mut R,
    writer: &mut W,
    credentials: &mut Credentials,
    handshake: &mut Handshake<'_>,
) -> Result<Option<String>, SessionError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut awaiting_reply = false;
    let mut confirmed_nickname = None;

    loop {
        let Some(line) = read_line_lossy(reader).await? else {
            return Err(SessionError::StreamClosed(Stream::Command));
        };
        handshake.pulses.pulse(Pulse {
            source: PulseSource::Handshake,
        });

        let Some(event) = classify(&line) else {
            continue;
        };

        match event {
            ServerEvent::RegistrationPrompt => {
                let nickname = match &credentials.nickname {
                    Some(nickname) => nickname.clone(),
                    None => request_nickname(handshake).await?,
                };
                debug!(%nickname, "registering account");
                write_line(writer, &nickname).await?;
                awaiting_reply = true;
            }
            ServerEvent::AuthPrompt => match credentials.token.as_deref() {
                Some(token) => {
                    debug!("sending account token");
                    write_line(writer, token).await?;
                    awaiting_reply = true;
                }
                None => {
                    // An empty answer asks the server for a new account.
                    debug!("no account token, asking to register");
                    write_line(writer, "").await?;
                }
            },
            ServerEvent::InvalidToken if awaiting_reply => {
                return Err(SessionError::InvalidToken);
            }
            ServerEvent::TokenIssued { token, nickname } if awaiting_reply => {
                if credentials.token.as_deref() != Some(token.as_str()) {
                    info!("server issued a new account token");
                    handshake
                        .status
                        .report(StatusUpdate::NewTokenIssued(token.clone()));
                    credentials.token = Some(token);
                }
                if let Some(nickname) = nickname {
                    confirmed_nickname = Some(confirm_nickname(handshake, credentials, nickname));
                }
                awaiting_reply = false;
            }
            ServerEvent::Identified { nickname } if awaiting_reply => {
                confirmed_nickname = Some(confirm_nickname(handshake, credentials, nickname));
                awaiting_reply = false;
            }
            ServerEvent::InvalidToken
            | ServerEvent::TokenIssued { .. }
            | ServerEvent::Identified { .. } => {
                return Err(SessionError::UnexpectedReply(line));
            }
            ServerEvent::ReadyToPost => {
                info!(nickname = ?confirmed_nickname, "handshake complete");
                return Ok(confirmed_nickname);
            }
            ServerEvent::Chat(text) => debug!(%text, "server notice during handshake"),
        }
    }
}

fn confirm_nickname(
    handshake: &Handshake<'_>,
    credentials: &mut Credentials,
    nickname: String,
) -> String {
    handshake
        .status
        .report(StatusUpdate::NicknameReceived(nickname.clone()));
    credentials.nickname = Some(nickname.clone());
    nickname
}

async fn request_nickname(handshake: &mut Handshake<'_>) -> Result<String, SessionError> {
    handshake.status.report(StatusUpdate::NicknameRequested);
    loop {
        let answer = handshake
            .nicknames
            .recv()
            .await
            .ok_or(SessionError::PresentationClosed)?;
        let nickname = strip_line_breaks(&answer).trim().to_string();
        if !nickname.is_empty() {
            return Ok(nickname);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::{pulse_channel, status_channel};
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt, BufReader},
        sync::mpsc::unbounded_channel,
    };

    struct Outcome {
        result: Result<Option<String>, SessionError>,
        wire: String,
        statuses: Vec<StatusUpdate>,
        credentials: Credentials,
    }

    /// Feed the scripted server lines, run the handshake, and collect what
    /// the client wrote and reported.
    async fn run_handshake(
        server_lines: &[&str],
        mut credentials: Credentials,
        nickname_answers: &[&str],
    ) -> Outcome {
        let (client, mut server) = tokio::io::duplex(4096);
        let (client_reader, mut client_writer) = tokio::io::split(client);
        let mut client_reader = BufReader::new(client_reader);

        for line in server_lines {
            server.write_all(line.as_bytes()).await.expect("script");
        }
        server.shutdown().await.expect("half-close");

        let (status, mut status_rx) = status_channel();
        let (pulses, _pulse_rx) = pulse_channel();
        let (nickname_tx, mut nicknames) = unbounded_channel();
        for answer in nickname_answers {
            nickname_tx.send(answer.to_string()).expect("nickname");
        }
        drop(nickname_tx);

        let mut handshake = Handshake {
            status: &status,
            pulses: &pulses,
            nicknames: &mut nicknames,
        };
        let result = authenticate(
            &mut client_reader,
            &mut client_writer,
            &mut credentials,
            &mut handshake,
        )
        .await;

        drop(client_writer);
        drop(client_reader);
        let mut wire = String::new();
        server.read_to_string(&mut wire).await.expect("wire");

        let mut statuses = Vec::new();
        while let Ok(update) = status_rx.try_recv() {
            statuses.push(update);
        }

        Outcome {
            result,
            wire,
            statuses,
            credentials,
        }
    }

    fn with_token(token: &str) -> Credentials {
        Credentials::new(Some(token.to_string()), None)
    }

    #[tokio::test]
    async fn token_login_reaches_ready() {
        let outcome = run_handshake(
            &[
                "Hello %username%! Enter your personal hash or leave it empty to create new account.\n",
                "{\"nickname\": \"Alice\", \"account_hash\": \"secret\"}\n",
                "Welcome to chat! Post your message below. End it with an empty line.\n",
            ],
            with_token("secret"),
            &[],
        )
        .await;

        assert_eq!(outcome.result.expect("login"), Some("Alice".to_string()));
        assert_eq!(outcome.wire, "secret\n");
        assert_eq!(
            outcome.statuses,
            [StatusUpdate::NicknameReceived("Alice".into())]
        );
    }

    #[tokio::test]
    async fn null_reply_is_an_invalid_token() {
        let outcome = run_handshake(
            &["Enter your personal hash\n", "null\n", "Post your message below\n"],
            with_token("stale"),
            &[],
        )
        .await;

        assert!(matches!(outcome.result, Err(SessionError::InvalidToken)));
        assert!(outcome.statuses.is_empty());
    }

    #[tokio::test]
    async fn nickname_reply_reports_exactly_once() {
        let outcome = run_handshake(
            &[
                "Enter your personal hash\n",
                "{\"nickname\": \"Alice\"}\n",
                "Post your message below\n",
            ],
            with_token("secret"),
            &[],
        )
        .await;

        assert!(outcome.result.is_ok());
        assert_eq!(
            outcome.statuses,
            [StatusUpdate::NicknameReceived("Alice".into())]
        );
    }

    #[tokio::test]
    async fn registration_surfaces_the_new_token() {
        let outcome = run_handshake(
            &[
                "Enter your personal hash or leave it empty to create new account.\n",
                "Enter preferred nickname below:\n",
                "{\"nickname\": \"Bob\", \"account_hash\": \"fresh-token\"}\n",
                "Welcome to chat! Post your message below.\n",
            ],
            Credentials::new(None, Some("Bo\nb".into())),
            &[],
        )
        .await;

        assert_eq!(outcome.result.expect("register"), Some("Bob".to_string()));
        assert_eq!(outcome.wire, "\nBob\n");
        assert_eq!(
            outcome.statuses,
            [
                StatusUpdate::NewTokenIssued("fresh-token".into()),
                StatusUpdate::NicknameReceived("Bob".into()),
            ]
        );
        assert_eq!(outcome.credentials.token.as_deref(), Some("fresh-token"));
    }

    #[tokio::test]
    async fn missing_nickname_is_requested_from_the_presentation_layer() {
        let outcome = run_handshake(
            &[
                "Enter preferred nickname below:\n",
                "{\"nickname\": \"Carol\", \"account_hash\": \"t\"}\n",
                "Post your message below\n",
            ],
            Credentials::default(),
            &["  ", "Carol\n"],
        )
        .await;

        assert!(outcome.result.is_ok());
        assert_eq!(outcome.wire, "Carol\n");
        assert_eq!(outcome.statuses[0], StatusUpdate::NicknameRequested);
    }

    #[tokio::test]
    async fn nickname_request_fails_without_a_presentation_layer() {
        let outcome = run_handshake(
            &["Enter preferred nickname below:\n"],
            Credentials::default(),
            &[],
        )
        .await;

        assert!(matches!(
            outcome.result,
            Err(SessionError::PresentationClosed)
        ));
    }

    #[tokio::test]
    async fn closed_stream_before_ready_is_retryable() {
        let outcome = run_handshake(&["Enter your personal hash\n"], with_token("t"), &[]).await;

        let error = outcome.result.expect_err("stream closed");
        assert!(matches!(error, SessionError::StreamClosed(Stream::Command)));
        assert!(error.is_retryable());
    }

    #[tokio::test]
    async fn account_reply_without_credentials_is_unexpected() {
        let outcome = run_handshake(&["null\n"], with_token("t"), &[]).await;

        assert!(matches!(
            outcome.result,
            Err(SessionError::UnexpectedReply(_))
        ));
    }

    #[test]
    fn blank_credentials_count_as_absent() {
        let credentials = Credentials::new(Some("  ".into()), Some(String::new()));
        assert_eq!(credentials, Credentials::default());
    }
}
