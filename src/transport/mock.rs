//! Scriptable in-memory transport for tests

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{ClientFactory, Connection, ConnectionListener};
use crate::error::TransportError;

/// How mock connections behave
#[derive(Clone, Debug, Default)]
pub struct MockBehavior {
    /// Round trip reported for every echoed message
    pub latency: Duration,
    /// Echo from a spawned task after this long instead of inline
    pub echo_delay: Option<Duration>,
    /// Client indices that report an error instead of opening
    pub fail_open: HashSet<usize>,
    /// Connections never report open
    pub never_open: bool,
    /// Every connection reports open twice
    pub duplicate_open: bool,
    /// The first N clients created never echo
    pub silent_first_clients: usize,
    /// The Nth send overall (1-based) closes its connection instead of echoing
    pub close_on_send: Option<u64>,
    /// The Nth send overall (1-based) fails
    pub fail_on_send: Option<u64>,
    /// The Nth send overall (1-based) reports an error but still echoes
    pub error_on_send: Option<u64>,
    /// Every close reports a failure
    pub fail_close: bool,
}

/// Shared counters observed by tests
#[derive(Debug, Default)]
pub struct MockLog {
    pub created: AtomicUsize,
    pub closed: AtomicUsize,
    pub send_count: AtomicU64,
    /// Client index of every send, in order
    pub sends: Mutex<Vec<usize>>,
}

impl MockLog {
    pub fn sends(&self) -> Vec<usize> {
        self.sends.lock().unwrap().clone()
    }
}

pub struct MockFactory {
    behavior: MockBehavior,
    log: Arc<MockLog>,
}

impl MockFactory {
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            log: Arc::new(MockLog::default()),
        }
    }

    pub fn echo() -> Self {
        Self::new(MockBehavior::default())
    }

    pub fn log(&self) -> Arc<MockLog> {
        self.log.clone()
    }
}

impl ClientFactory for MockFactory {
    fn new_client(
        &self,
        _endpoint: &str,
        listener: Arc<dyn ConnectionListener>,
    ) -> Box<dyn Connection> {
        let index = self.log.created.fetch_add(1, Ordering::SeqCst);
        Box::new(MockConnection {
            index,
            behavior: self.behavior.clone(),
            listener,
            log: self.log.clone(),
        })
    }
}

pub struct MockConnection {
    index: usize,
    behavior: MockBehavior,
    listener: Arc<dyn ConnectionListener>,
    log: Arc<MockLog>,
}

#[async_trait]
impl Connection for MockConnection {
    async fn connect(&mut self) -> Result<(), TransportError> {
        if self.behavior.fail_open.contains(&self.index) {
            self.listener.on_error(TransportError::ConnectFailed(
                "mock".to_string(),
                "refused".to_string(),
            ));
        } else if !self.behavior.never_open {
            self.listener.on_open();
            if self.behavior.duplicate_open {
                self.listener.on_open();
            }
        }
        Ok(())
    }

    async fn send_timestamp(&mut self) -> Result<(), TransportError> {
        let nth = self.log.send_count.fetch_add(1, Ordering::SeqCst) + 1;
        if self.behavior.fail_on_send == Some(nth) {
            return Err(TransportError::SendFailed("mock write failure".to_string()));
        }

        self.log.sends.lock().unwrap().push(self.index);

        if self.behavior.error_on_send == Some(nth) {
            self.listener
                .on_error(TransportError::Io("mock transient error".to_string()));
        }

        if self.behavior.close_on_send == Some(nth) {
            self.listener.on_close();
        } else if self.index >= self.behavior.silent_first_clients {
            match self.behavior.echo_delay {
                Some(delay) => {
                    let listener = self.listener.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        listener.message_arrived_with_roundtrip(delay);
                    });
                }
                None => self
                    .listener
                    .message_arrived_with_roundtrip(self.behavior.latency),
            }
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.log.closed.fetch_add(1, Ordering::SeqCst);
        if self.behavior.fail_close {
            return Err(TransportError::CloseFailed("mock".to_string()));
        }
        Ok(())
    }
}
