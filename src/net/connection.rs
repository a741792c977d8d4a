//! Message framing shared by the server and the client.
//!
//! A message is a sequence of text lines; the line that ends with the
//! [`END_OF_MESSAGE`] marker terminates it. On receive, the marker is
//! stripped and the accumulated lines are joined with `\n`. The marker is
//! reserved: a payload line ending with it terminates the message early,
//! so payloads must not contain it.

use std::net::SocketAddr;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

use crate::net::NetError;

/// Marker terminating one framed message.
pub const END_OF_MESSAGE: &str = "[<EOM>]";

/// Writes one framed message: the body, the marker, a newline.
pub(crate) async fn write_message<W>(writer: &mut W, message: &str) -> Result<(), NetError>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(message.as_bytes()).await?;
    writer.write_all(END_OF_MESSAGE.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}

/// Reads one framed message, stripping the marker and joining lines with
/// `\n`. Returns whatever accumulated if the stream ends before a marker.
pub(crate) async fn read_message<R>(reader: &mut R) -> Result<String, NetError>
where
    R: AsyncBufRead + Unpin,
{
    let mut message = String::new();
    let mut line = String::new();
    let mut first = true;
    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            break;
        }
        let content = line.strip_suffix('\n').unwrap_or(&line);
        let content = content.strip_suffix('\r').unwrap_or(content);
        if !first {
            message.push('\n');
        }
        first = false;
        match content.strip_suffix(END_OF_MESSAGE) {
            Some(body) => {
                message.push_str(body);
                break;
            }
            None => message.push_str(content),
        }
    }
    Ok(message)
}

/// One side of an established client/server exchange. Owned by exactly one
/// handler at a time.
pub struct Connection {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    peer: SocketAddr,
}

impl Connection {
    /// Wraps an established stream.
    pub fn new(stream: TcpStream) -> Result<Self, NetError> {
        let peer = stream.peer_addr()?;
        let (read_half, write_half) = stream.into_split();
        Ok(Self {
            reader: BufReader::new(read_half),
            writer: write_half,
            peer,
        })
    }

    /// The peer's socket address.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Sends one framed message to the peer.
    pub async fn send(&mut self, message: &str) -> Result<(), NetError> {
        tracing::debug!("sending framed message to {}", self.peer);
        write_message(&mut self.writer, message).await
    }

    /// Receives one framed message from the peer.
    pub async fn receive(&mut self) -> Result<String, NetError> {
        tracing::debug!("receiving framed message from {}", self.peer);
        read_message(&mut self.reader).await
    }

    /// Flushes and shuts the write half down; the peer observes EOF.
    pub async fn close(mut self) -> Result<(), NetError> {
        self.writer.shutdown().await?;
        Ok(())
    }
}
