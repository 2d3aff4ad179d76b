//! Line-oriented terminal front end.
//!
//! Talks to the session only through the [`Presentation`] queues: chat and
//! status lines go to stdout, stdin lines go to the outbound queue.

use anyhow::Result;
use tokio::{
    io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader},
    select,
    sync::mpsc::UnboundedSender,
};
use tracing::debug;

use crate::{
    channels::Presentation,
    events::{ConnectionState, StatusUpdate},
};

/// How many saved lines to show when the console starts.
pub const HISTORY_PREVIEW: usize = 20;

pub async fn run(presentation: Presentation, previous_lines: &[String]) -> Result<()> {
    let Presentation {
        mut messages,
        mut status,
        outbound,
        nicknames,
    } = presentation;

    let skip = previous_lines.len().saturating_sub(HISTORY_PREVIEW);
    for line in &previous_lines[skip..] {
        write_stdout(line).await?;
    }

    let mut stdin = BufReader::new(tokio::io::stdin());
    let mut input = String::new();
    let mut awaiting_nickname = false;

    loop {
        input.clear();
        select! {
            message = messages.recv() => match message {
                Some(message) => write_stdout(&message.to_string()).await?,
                None => break,
            },
            update = status.recv() => match update {
                Some(update) => {
                    if update == StatusUpdate::NicknameRequested {
                        awaiting_nickname = true;
                    }
                    write_stdout(&render_status(&update)).await?;
                }
                None => break,
            },
            bytes_read = stdin.read_line(&mut input) => {
                if bytes_read? == 0 {
                    break;
                }
                let text = input.trim_end_matches(['\r', '\n']);
                if text.eq_ignore_ascii_case("/quit") {
                    write_stdout("*** leaving chat").await?;
                    break;
                }
                if !forward_input(text, &mut awaiting_nickname, &outbound, &nicknames) {
                    debug!("session is gone, closing the console");
                    break;
                }
            }
        }
    }

    Ok(())
}

/// Queue a typed line as the requested nickname or as a chat message.
/// Returns `false` once the session has dropped its end of the queue.
fn forward_input(
    text: &str,
    awaiting_nickname: &mut bool,
    outbound: &UnboundedSender<String>,
    nicknames: &UnboundedSender<String>,
) -> bool {
    if text.trim().is_empty() {
        return true;
    }
    let queue = if *awaiting_nickname { nicknames } else { outbound };
    if queue.send(text.to_string()).is_err() {
        return false;
    }
    *awaiting_nickname = false;
    true
}

pub fn render_status(update: &StatusUpdate) -> String {
    match update {
        StatusUpdate::ReadStateChanged(state) => format!("*** reading: {}", render_state(*state)),
        StatusUpdate::SendStateChanged(state) => format!("*** sending: {}", render_state(*state)),
        StatusUpdate::NicknameReceived(nickname) => format!("*** logged in as {nickname}"),
        StatusUpdate::NewTokenIssued(token) => format!(
            "*** new account token: {token} (save it and pass it with --token or TOKEN next time)"
        ),
        StatusUpdate::NicknameRequested => "*** choose a nickname:".to_string(),
    }
}

fn render_state(state: ConnectionState) -> &'static str {
    match state {
        ConnectionState::Initiated => "connecting",
        ConnectionState::Established => "connected",
        ConnectionState::Closed => "disconnected",
    }
}

async fn write_stdout(line: &str) -> io::Result<()> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(line.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await
}
