//! Newline-delimited TCP echo transport
//!
//! Each message is the send time in nanoseconds since the connection's base
//! instant, written as one line. The target echoes the line back and the
//! connection reports the round trip. The socket lives in a spawned task;
//! the [`Connection`] handle feeds it commands over a channel so sends never
//! block the pacer on socket I/O.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::debug;

use super::{ClientFactory, Connection, ConnectionListener};
use crate::error::TransportError;

/// Factory for [`TcpConnection`]s
#[derive(Clone, Debug, Default)]
pub struct TcpClientFactory;

impl TcpClientFactory {
    pub fn new() -> Self {
        Self
    }
}

impl ClientFactory for TcpClientFactory {
    fn new_client(
        &self,
        endpoint: &str,
        listener: Arc<dyn ConnectionListener>,
    ) -> Box<dyn Connection> {
        Box::new(TcpConnection::new(endpoint, listener))
    }
}

enum Command {
    Send(u128),
    Close,
}

/// One TCP link to the target
pub struct TcpConnection {
    endpoint: String,
    listener: Arc<dyn ConnectionListener>,
    base: Instant,
    commands: Option<mpsc::UnboundedSender<Command>>,
}

impl TcpConnection {
    pub fn new(endpoint: impl Into<String>, listener: Arc<dyn ConnectionListener>) -> Self {
        Self {
            endpoint: endpoint.into(),
            listener,
            base: Instant::now(),
            commands: None,
        }
    }
}

#[async_trait]
impl Connection for TcpConnection {
    async fn connect(&mut self) -> Result<(), TransportError> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.commands = Some(tx);

        tokio::spawn(drive(
            self.endpoint.clone(),
            self.listener.clone(),
            self.base,
            rx,
        ));
        Ok(())
    }

    async fn send_timestamp(&mut self) -> Result<(), TransportError> {
        let commands = self.commands.as_ref().ok_or(TransportError::NotConnected)?;
        let stamp = self.base.elapsed().as_nanos();
        commands
            .send(Command::Send(stamp))
            .map_err(|_| TransportError::SendFailed("connection task has ended".to_string()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        match self.commands.take() {
            Some(commands) => commands
                .send(Command::Close)
                .map_err(|_| TransportError::CloseFailed("connection already ended".to_string())),
            None => Ok(()),
        }
    }
}

/// Socket task: connect, then multiplex outbound commands and inbound echoes
async fn drive(
    endpoint: String,
    listener: Arc<dyn ConnectionListener>,
    base: Instant,
    mut commands: mpsc::UnboundedReceiver<Command>,
) {
    let stream = match TcpStream::connect(&endpoint).await {
        Ok(stream) => stream,
        Err(e) => {
            listener.on_error(TransportError::ConnectFailed(endpoint, e.to_string()));
            return;
        }
    };
    let _ = stream.set_nodelay(true);
    listener.on_open();

    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Send(stamp)) => {
                    let line = format!("{stamp}\n");
                    if let Err(e) = write_half.write_all(line.as_bytes()).await {
                        listener.on_error(TransportError::SendFailed(e.to_string()));
                        listener.on_close();
                        return;
                    }
                }
                Some(Command::Close) | None => {
                    let _ = write_half.shutdown().await;
                    debug!("closed connection to {}", endpoint);
                    return;
                }
            },
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    listener.on_message(&line);
                    if let Some(elapsed) = roundtrip(base, &line) {
                        listener.message_arrived_with_roundtrip(elapsed);
                    }
                }
                Ok(None) => {
                    listener.on_close();
                    return;
                }
                Err(e) => {
                    listener.on_error(e.into());
                    listener.on_close();
                    return;
                }
            },
        }
    }
}

/// Round trip for an echoed stamp, `None` if the line is not one of ours
fn roundtrip(base: Instant, line: &str) -> Option<Duration> {
    let sent: u128 = line.trim().parse().ok()?;
    let now = base.elapsed().as_nanos();
    let nanos = now.checked_sub(sent)?;
    Some(Duration::from_nanos(u64::try_from(nanos).ok()?))
}
