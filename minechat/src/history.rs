use std::{
    convert::Infallible,
    io,
    path::{Path, PathBuf},
};

use tokio::{fs::OpenOptions, io::AsyncWriteExt, sync::mpsc::UnboundedReceiver};
use tracing::warn;

use crate::{error::SessionError, events::ChatMessage};

/// Append-only chat history on disk.
///
/// The file is opened for every write and closed right after, so it can be
/// rotated or inspected while the client runs.
#[derive(Debug, Clone)]
pub struct HistoryFile {
    path: PathBuf,
}

impl HistoryFile {
    /// Check that the file can be created and appended to.
    pub async fn open(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append(&self, line: &str) -> io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        let mut encoded = line.as_bytes().to_vec();
        encoded.push(b'\n');
        file.write_all(&encoded).await?;
        file.flush().await
    }

    /// Read the stored lines back, replacing malformed UTF-8.
    pub async fn load(&self) -> io::Result<Vec<String>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(error) => return Err(error),
        };
        Ok(String::from_utf8_lossy(&bytes)
            .lines()
            .map(str::to_string)
            .collect())
    }
}

/// Persist every queued chat message. Write failures are logged and the
/// message is dropped; they never end the session.
pub async fn drain(
    queue: &mut UnboundedReceiver<ChatMessage>,
    history: &HistoryFile,
) -> Result<Infallible, SessionError> {
    loop {
        let Some(message) = queue.recv().await else {
            return Err(SessionError::PresentationClosed);
        };
        if let Err(error) = history.append(&message.to_string()).await {
            warn!(path = %history.path().display(), ?error, "failed to save chat history");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::TIMESTAMP_FORMAT;
    use chrono::NaiveDateTime;
    use tokio::sync::mpsc::unbounded_channel;

    #[tokio::test]
    async fn appended_messages_read_back_in_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let history = HistoryFile::open(dir.path().join("history.txt"))
            .await
            .expect("open");

        let texts: Vec<String> = (0..5).map(|index| format!("message {index}")).collect();
        for text in &texts {
            history
                .append(&ChatMessage::new(text.clone()).to_string())
                .await
                .expect("append");
        }

        let lines = history.load().await.expect("load");
        assert_eq!(lines.len(), texts.len());
        for (line, text) in lines.iter().zip(&texts) {
            let (stamp, body) = line
                .strip_prefix('[')
                .and_then(|rest| rest.split_once("] "))
                .expect("timestamp prefix");
            assert!(NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT).is_ok());
            assert_eq!(body, text);
        }
    }

    #[tokio::test]
    async fn load_tolerates_malformed_bytes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("history.txt");
        tokio::fs::write(&path, b"ok\n\xffbad\n").await.expect("seed");

        let history = HistoryFile::open(&path).await.expect("open");
        let lines = history.load().await.expect("load");
        assert_eq!(lines, ["ok", "\u{fffd}bad"]);
    }

    #[tokio::test]
    async fn open_fails_for_unwritable_location() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing_parent = dir.path().join("missing").join("history.txt");
        assert!(HistoryFile::open(missing_parent).await.is_err());
    }

    #[tokio::test]
    async fn drain_survives_write_failures() {
        let dir = tempfile::tempdir().expect("tempdir");
        let history = HistoryFile::open(dir.path().join("history.txt"))
            .await
            .expect("open");
        let broken = HistoryFile {
            path: dir.path().join("gone").join("history.txt"),
        };

        let (tx, mut rx) = unbounded_channel();
        tx.send(ChatMessage::new("lost")).expect("send");
        drop(tx);
        let result = drain(&mut rx, &broken).await;
        assert!(matches!(result, Err(SessionError::PresentationClosed)));

        let (tx, mut rx) = unbounded_channel();
        tx.send(ChatMessage::new("kept")).expect("send");
        drop(tx);
        let _ = drain(&mut rx, &history).await;
        let lines = history.load().await.expect("load");
        assert_eq!(lines.len(), 1);
        assert!(lines[0].ends_with("] kept"));
    }
}
