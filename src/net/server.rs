//! Single-listener request/response server.
//!
//! Each inbound connection carries one framed message. The message is handed
//! to the configured [`ServerTask`]; its execution summary is sent back as
//! the framed reply. A message that trim-equals [`SHUTDOWN_COMMAND`] is
//! answered with `Shutting down` and terminates the server after the reply
//! is flushed. Connections are handled sequentially, one at a time.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::net::{Address, Connection, NetError};

/// Message content (after trimming whitespace) that instructs the server to
/// shut down.
pub const SHUTDOWN_COMMAND: &str = "shutdown";

/// Reply sent to the client that requested the shutdown.
const SHUTDOWN_REPLY: &str = "Shutting down";

/// The task a server executes for every received message.
///
/// `execute` must contain its own failures; whatever the client should learn
/// about the outcome belongs in the execution summary.
#[async_trait]
pub trait ServerTask: Send + 'static {
    /// Processes one received message body.
    async fn execute(&mut self, input: &str);

    /// Textual result of the most recent execution, sent back as the reply.
    fn execution_summary(&self) -> String;
}

/// Guards against a second live server instance in this process. Cleared
/// when the serve loop terminates.
static RUNNING: AtomicBool = AtomicBool::new(false);

/// Handle to a running server.
pub struct Server {
    local_addr: SocketAddr,
    shutdown_tx: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

impl Server {
    /// Binds the listener and spawns the serve loop.
    ///
    /// `address` is a `HOST::PORT` string; `None` uses `127.0.0.1::3141`.
    /// Fails with [`NetError::AlreadyRunning`] while another instance lives.
    pub async fn start<T: ServerTask>(address: Option<&str>, task: T) -> Result<Self, NetError> {
        let address = match address {
            Some(raw) => raw.parse::<Address>()?,
            None => Address::default(),
        };

        if RUNNING
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(NetError::AlreadyRunning);
        }

        let bound = async {
            let listener = TcpListener::bind((address.host.as_str(), address.port)).await?;
            let local_addr = listener.local_addr()?;
            Ok::<_, std::io::Error>((listener, local_addr))
        }
        .await;
        let (listener, local_addr) = match bound {
            Ok(bound) => bound,
            Err(e) => {
                RUNNING.store(false, Ordering::Release);
                return Err(e.into());
            }
        };

        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let handle = tokio::spawn(serve(listener, task, shutdown_rx));
        tracing::info!("server listening on {}", local_addr);

        Ok(Self {
            local_addr,
            shutdown_tx,
            handle,
        })
    }

    /// The address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Best-effort shutdown: unblocks the accept loop so the listener
    /// closes. An in-flight handler finishes first.
    pub async fn stop(&self) {
        let _ = self.shutdown_tx.send(()).await;
    }

    /// Waits until the serve loop has terminated.
    pub async fn join(self) {
        let _ = self.handle.await;
    }
}

async fn serve<T: ServerTask>(
    listener: TcpListener,
    mut task: T,
    mut shutdown_rx: mpsc::Receiver<()>,
) {
    let mut shutdown = false;
    while !shutdown {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, _)) => {
                    if let Err(e) = handle_connection(stream, &mut task, &mut shutdown).await {
                        tracing::warn!("connection handling failed: {}", e);
                    }
                }
                Err(e) => tracing::warn!("accepting a connection failed: {}", e),
            },
            _ = shutdown_rx.recv() => shutdown = true,
        }
    }
    drop(listener);
    RUNNING.store(false, Ordering::Release);
    tracing::info!("server terminated");
}

/// Receives one message, dispatches it, replies, closes the connection.
async fn handle_connection<T: ServerTask>(
    stream: TcpStream,
    task: &mut T,
    shutdown: &mut bool,
) -> Result<(), NetError> {
    let mut connection = Connection::new(stream)?;
    tracing::info!("receiving message from {}", connection.peer_addr());
    let message = connection.receive().await?;
    if message.trim() == SHUTDOWN_COMMAND {
        tracing::info!("shutdown requested by {}", connection.peer_addr());
        connection.send(SHUTDOWN_REPLY).await?;
        *shutdown = true;
    } else {
        task.execute(&message).await;
        connection.send(&task.execution_summary()).await?;
    }
    connection.close().await
}
