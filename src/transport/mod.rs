//! Transport collaborator contract
//!
//! The engine never talks to sockets itself. A [`ClientFactory`] builds
//! [`Connection`]s, and each connection reports back through the
//! [`ConnectionListener`] it was created with. The engine's listener turns
//! every callback into a [`ConnectionEvent`] on a channel, which the run
//! controller consumes serially.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::trace;

use crate::error::TransportError;

#[cfg(test)]
pub mod mock;
pub mod tcp;

pub use tcp::TcpClientFactory;

/// Callbacks a connection delivers while it lives
pub trait ConnectionListener: Send + Sync {
    /// The session is established
    fn on_open(&self);

    /// The connection closed
    fn on_close(&self);

    /// A transport error occurred
    fn on_error(&self, error: TransportError);

    /// Raw inbound payload
    fn on_message(&self, raw: &str);

    /// An echoed timestamp came back after `elapsed`
    fn message_arrived_with_roundtrip(&self, elapsed: Duration);
}

/// One logical link to the target
#[async_trait]
pub trait Connection: Send {
    /// Start opening the connection; completion is reported to the listener
    async fn connect(&mut self) -> Result<(), TransportError>;

    /// Send one message carrying the current send time
    async fn send_timestamp(&mut self) -> Result<(), TransportError>;

    /// Release the connection
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Builds connections against an endpoint
pub trait ClientFactory: Send + Sync {
    fn new_client(&self, endpoint: &str, listener: Arc<dyn ConnectionListener>)
        -> Box<dyn Connection>;
}

/// Notification from one connection, tagged with its pool index
#[derive(Clone, Debug, PartialEq)]
pub enum ConnectionEvent {
    Opened { id: usize },
    Closed { id: usize },
    Error { id: usize, error: TransportError },
    RoundTrip { id: usize, elapsed: Duration },
}

#[cfg(test)]
impl ConnectionEvent {
    pub fn id(&self) -> usize {
        match self {
            ConnectionEvent::Opened { id }
            | ConnectionEvent::Closed { id }
            | ConnectionEvent::Error { id, .. }
            | ConnectionEvent::RoundTrip { id, .. } => *id,
        }
    }
}

/// Listener that forwards callbacks onto the level's event channel
pub struct EventListener {
    id: usize,
    events: mpsc::UnboundedSender<ConnectionEvent>,
}

impl EventListener {
    pub fn new(id: usize, events: mpsc::UnboundedSender<ConnectionEvent>) -> Self {
        Self { id, events }
    }

    fn emit(&self, event: ConnectionEvent) {
        // The receiver goes away once the level is torn down; late callbacks
        // from closing connections are irrelevant by then.
        let _ = self.events.send(event);
    }
}

impl ConnectionListener for EventListener {
    fn on_open(&self) {
        self.emit(ConnectionEvent::Opened { id: self.id });
    }

    fn on_close(&self) {
        self.emit(ConnectionEvent::Closed { id: self.id });
    }

    fn on_error(&self, error: TransportError) {
        self.emit(ConnectionEvent::Error { id: self.id, error });
    }

    fn on_message(&self, raw: &str) {
        trace!("connection {} message: {}", self.id, raw);
    }

    fn message_arrived_with_roundtrip(&self, elapsed: Duration) {
        self.emit(ConnectionEvent::RoundTrip {
            id: self.id,
            elapsed,
        });
    }
}
