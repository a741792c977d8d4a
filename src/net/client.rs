//! One-shot client for the analysis server.

use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::net::{Address, Connection, NetError};

/// Bound on the reachability probe when connecting.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// A client connected to a running server.
///
/// The connection is spent after one send/receive exchange; later sends
/// yield no reply.
pub struct Client {
    connection: Connection,
    spent: bool,
}

impl Client {
    /// Connects to the server at `address` (`HOST::PORT`).
    ///
    /// Fails with [`NetError::Unreachable`] if the peer does not accept the
    /// connection within [`CONNECT_TIMEOUT`].
    pub async fn connect(address: &str) -> Result<Self, NetError> {
        let address = address.parse::<Address>()?;
        let connect = TcpStream::connect((address.host.as_str(), address.port));
        let stream = match timeout(CONNECT_TIMEOUT, connect).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                tracing::debug!("connecting to {} failed: {}", address, e);
                return Err(NetError::Unreachable {
                    address,
                    timeout: CONNECT_TIMEOUT,
                });
            }
            Err(_) => {
                return Err(NetError::Unreachable {
                    address,
                    timeout: CONNECT_TIMEOUT,
                })
            }
        };
        let connection = Connection::new(stream)?;
        tracing::debug!("client connected to {}", connection.peer_addr());
        Ok(Self {
            connection,
            spent: false,
        })
    }

    /// Sends one framed message and returns the framed reply, or `None` if
    /// the connection was already spent.
    pub async fn send(&mut self, message: &str) -> Result<Option<String>, NetError> {
        if self.spent {
            return Ok(None);
        }
        self.connection.send(message).await?;
        let reply = self.connection.receive().await?;
        self.spent = true;
        Ok(Some(reply))
    }

    /// Releases the underlying stream.
    pub async fn close(self) -> Result<(), NetError> {
        self.connection.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_malformed_address_rejected() {
        let result = Client::connect("127.0.0.1:3141").await;
        assert!(matches!(result, Err(NetError::MalformedAddress(_))));
    }

    #[tokio::test]
    async fn test_port_out_of_range_rejected() {
        let result = Client::connect("127.0.0.1::123456").await;
        assert!(matches!(result, Err(NetError::InvalidPort(_))));
    }

    #[tokio::test]
    async fn test_unreachable_peer_fails_probe() {
        // Bind and drop a listener so the port is known to refuse.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let result = Client::connect(&format!("127.0.0.1::{}", port)).await;
        assert!(matches!(result, Err(NetError::Unreachable { .. })));
    }
}
