use std::{future::Future, io};

use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpStream,
};
use tracing::info;

pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Opens the two server connections for one connection attempt.
pub trait Connector: Send + Sync {
    /// The read-only stream carrying everybody's chat.
    fn open_broadcast(&self) -> impl Future<Output = io::Result<BoxedReader>> + Send;

    /// The read-write stream used for the handshake and for posting.
    fn open_command(&self) -> impl Future<Output = io::Result<(BoxedReader, BoxedWriter)>> + Send;
}

#[derive(Debug, Clone)]
pub struct TcpConnector {
    pub host: String,
    pub reading_port: u16,
    pub sending_port: u16,
}

impl TcpConnector {
    pub fn new(host: impl Into<String>, reading_port: u16, sending_port: u16) -> Self {
        Self {
            host: host.into(),
            reading_port,
            sending_port,
        }
    }
}

impl Connector for TcpConnector {
    async fn open_broadcast(&self) -> io::Result<BoxedReader> {
        let stream = TcpStream::connect((self.host.as_str(), self.reading_port)).await?;
        info!(host = %self.host, port = self.reading_port, "broadcast stream connected");
        Ok(Box::new(stream))
    }

    async fn open_command(&self) -> io::Result<(BoxedReader, BoxedWriter)> {
        let stream = TcpStream::connect((self.host.as_str(), self.sending_port)).await?;
        info!(host = %self.host, port = self.sending_port, "command stream connected");
        let (reader, writer) = stream.into_split();
        Ok((Box::new(reader), Box::new(writer)))
    }
}
