use std::io;

use serde::Deserialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub const REGISTRATION_PROMPT: &str = "Enter preferred nickname below";
pub const AUTH_PROMPT: &str = "Enter your personal hash";
pub const READY_PROMPT: &str = "Post your message below";

const LINE_ENDINGS: &[char] = &['\n', '\r'];

/// Longest line handed out by [`read_line_lossy`]; anything past it arrives
/// as a further line.
pub const MAX_LINE_BYTES: usize = 8 * 1024;

/// What a line of server text means to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    RegistrationPrompt,
    AuthPrompt,
    ReadyToPost,
    InvalidToken,
    /// Account reply carrying a token, usually together with the nickname.
    TokenIssued {
        token: String,
        nickname: Option<String>,
    },
    Identified {
        nickname: String,
    },
    Chat(String),
}

#[derive(Debug, Deserialize)]
struct AccountReply {
    account_hash: Option<String>,
    nickname: Option<String>,
}

/// Classify one decoded fragment of server text.
///
/// Prompts are matched by substring before any JSON parsing. Returns `None`
/// for fragments that are blank once trimmed.
pub fn classify(fragment: &str) -> Option<ServerEvent> {
    if fragment.contains(REGISTRATION_PROMPT) {
        return Some(ServerEvent::RegistrationPrompt);
    }
    if fragment.contains(AUTH_PROMPT) {
        return Some(ServerEvent::AuthPrompt);
    }
    if fragment.contains(READY_PROMPT) {
        return Some(ServerEvent::ReadyToPost);
    }

    let text = fragment.trim();
    if text.is_empty() {
        return None;
    }

    match serde_json::from_str::<serde_json::Value>(text) {
        Ok(serde_json::Value::Null) => Some(ServerEvent::InvalidToken),
        Ok(value @ serde_json::Value::Object(_)) => Some(
            account_event(value).unwrap_or_else(|| ServerEvent::Chat(text.to_string())),
        ),
        _ => Some(ServerEvent::Chat(text.to_string())),
    }
}

fn account_event(value: serde_json::Value) -> Option<ServerEvent> {
    let reply: AccountReply = serde_json::from_value(value).ok()?;
    match reply {
        AccountReply {
            account_hash: Some(token),
            nickname,
        } => Some(ServerEvent::TokenIssued { token, nickname }),
        AccountReply {
            account_hash: None,
            nickname: Some(nickname),
        } => Some(ServerEvent::Identified { nickname }),
        _ => None,
    }
}

/// Replace embedded line breaks with spaces so a message stays one line.
pub fn single_line(text: &str) -> String {
    text.replace("\r\n", " ").replace(['\n', '\r'], " ")
}

/// Drop embedded line breaks from a handshake field (nickname, token).
pub fn strip_line_breaks(field: &str) -> String {
    field.replace(['\n', '\r'], "")
}

/// Read one `\n`-terminated line, decoding invalid UTF-8 permissively.
///
/// Returns `Ok(None)` at end of stream. A final unterminated fragment is
/// returned as a line, and so is every [`MAX_LINE_BYTES`] chunk of an
/// overlong one.
pub async fn read_line_lossy<R>(reader: &mut R) -> io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    let mut buffer = Vec::new();
    let bytes = (&mut *reader)
        .take(MAX_LINE_BYTES as u64)
        .read_until(b'\n', &mut buffer)
        .await?;
    if bytes == 0 {
        return Ok(None);
    }

    let line = String::from_utf8_lossy(&buffer);
    Ok(Some(line.trim_end_matches(LINE_ENDINGS).to_string()))
}

/// Write a handshake field terminated by a single newline.
pub async fn write_line<W>(writer: &mut W, field: &str) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut encoded = strip_line_breaks(field).into_bytes();
    encoded.push(b'\n');
    writer.write_all(&encoded).await?;
    writer.flush().await
}

/// Write a chat message terminated by a blank line, the server's message
/// delimiter.
pub async fn write_message<W>(writer: &mut W, text: &str) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut encoded = single_line(text).into_bytes();
    encoded.extend_from_slice(b"\n\n");
    writer.write_all(&encoded).await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, BufReader};

    #[test]
    fn prompts_win_over_json() {
        assert_eq!(
            classify("Hello! Enter your personal hash or leave it empty to create new account.\n"),
            Some(ServerEvent::AuthPrompt)
        );
        assert_eq!(
            classify("Enter preferred nickname below:\n"),
            Some(ServerEvent::RegistrationPrompt)
        );
        assert_eq!(
            classify("Welcome to chat! Post your message below. End it with an empty line.\n"),
            Some(ServerEvent::ReadyToPost)
        );
    }

    #[test]
    fn registration_prompt_has_priority_over_auth_prompt() {
        let both = format!("{AUTH_PROMPT} / {REGISTRATION_PROMPT}");
        assert_eq!(classify(&both), Some(ServerEvent::RegistrationPrompt));
    }

    #[test]
    fn null_means_invalid_token() {
        assert_eq!(classify("null\n"), Some(ServerEvent::InvalidToken));
    }

    #[test]
    fn account_reply_with_hash_issues_token() {
        let event = classify(r#"{"nickname": "Alice", "account_hash": "abc-123"}"#);
        assert_eq!(
            event,
            Some(ServerEvent::TokenIssued {
                token: "abc-123".into(),
                nickname: Some("Alice".into()),
            })
        );
    }

    #[test]
    fn nickname_only_reply_identifies() {
        assert_eq!(
            classify(r#"{"nickname": "Alice"}"#),
            Some(ServerEvent::Identified {
                nickname: "Alice".into()
            })
        );
    }

    #[test]
    fn unrelated_json_and_plain_text_are_chat() {
        assert_eq!(
            classify(r#"{"weather": "sunny"}"#),
            Some(ServerEvent::Chat(r#"{"weather": "sunny"}"#.into()))
        );
        assert_eq!(classify("42"), Some(ServerEvent::Chat("42".into())));
        assert_eq!(
            classify("  hello there \n"),
            Some(ServerEvent::Chat("hello there".into()))
        );
    }

    #[test]
    fn blank_fragments_are_dropped() {
        assert_eq!(classify(""), None);
        assert_eq!(classify(" \r\n"), None);
    }

    #[tokio::test]
    async fn read_line_replaces_invalid_utf8() {
        let (mut writer, reader) = tokio::io::duplex(64);
        let mut reader = BufReader::new(reader);
        writer
            .write_all(b"caf\xc3\xa9 \xff ok\r\ntail")
            .await
            .expect("write");
        drop(writer);

        let first = read_line_lossy(&mut reader).await.expect("read");
        assert_eq!(first.as_deref(), Some("café \u{fffd} ok"));
        let second = read_line_lossy(&mut reader).await.expect("read");
        assert_eq!(second.as_deref(), Some("tail"));
        assert_eq!(read_line_lossy(&mut reader).await.expect("read"), None);
    }

    #[tokio::test]
    async fn overlong_lines_are_cut_into_bounded_pieces() {
        let mut wire = vec![b'a'; MAX_LINE_BYTES + 10];
        wire.extend_from_slice(b"\nok\n");
        let mut reader: &[u8] = &wire;

        let first = read_line_lossy(&mut reader).await.expect("read").expect("line");
        assert_eq!(first.len(), MAX_LINE_BYTES);
        let rest = read_line_lossy(&mut reader).await.expect("read");
        assert_eq!(rest, Some("a".repeat(10)));
        let next = read_line_lossy(&mut reader).await.expect("read");
        assert_eq!(next.as_deref(), Some("ok"));
    }

    #[tokio::test]
    async fn message_framing_flattens_newlines() {
        let (mut writer, mut reader) = tokio::io::duplex(64);
        write_message(&mut writer, "two\nlines").await.expect("write");
        write_line(&mut writer, "ni\nck\n").await.expect("write");
        drop(writer);

        let mut wire = String::new();
        reader.read_to_string(&mut wire).await.expect("read");
        assert_eq!(wire, "two lines\n\nnick\n");
    }
}
