//! Connection pool for one concurrency level
//!
//! Opens the level's connections, blocks on the open barrier, and tears
//! everything down when the level ends.

mod barrier;

use barrier::{BarrierState, OpenBarrier};

use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::error::PoolError;
use crate::transport::{ClientFactory, Connection, ConnectionEvent, EventListener};

/// Connections for one level plus the channel their events arrive on
pub struct ConnectionPool {
    connections: Vec<Box<dyn Connection>>,
    events: mpsc::UnboundedReceiver<ConnectionEvent>,
}

impl ConnectionPool {
    /// Create `size` connections and wait until all of them report open
    ///
    /// Whatever was created is closed again before an error is returned.
    pub async fn open(
        factory: &dyn ClientFactory,
        endpoint: &str,
        size: usize,
        open_timeout: Duration,
    ) -> Result<Self, PoolError> {
        let (tx, events) = mpsc::unbounded_channel();
        let mut pool = Self {
            connections: Vec::with_capacity(size),
            events,
        };

        for id in 0..size {
            let listener = Arc::new(EventListener::new(id, tx.clone()));
            let mut connection = factory.new_client(endpoint, listener);
            let started = connection.connect().await;
            pool.connections.push(connection);

            if let Err(source) = started {
                pool.close_all().await;
                return Err(PoolError::Connect { id, source });
            }
        }
        drop(tx);

        debug!("Started {} connections to {}, waiting for open", size, endpoint);

        if let Err(e) = pool.await_open(open_timeout).await {
            pool.close_all().await;
            return Err(e);
        }

        info!("All {} connections opened", size);
        Ok(pool)
    }

    async fn await_open(&mut self, open_timeout: Duration) -> Result<(), PoolError> {
        let mut barrier = OpenBarrier::new(self.connections.len());
        if barrier.is_released() {
            return Ok(());
        }

        let events = &mut self.events;
        let wait = async {
            while let Some(event) = events.recv().await {
                if barrier.observe(&event)? == BarrierState::Released {
                    return Ok(());
                }
            }
            Err(PoolError::EventsClosed)
        };

        let outcome = timeout(open_timeout, wait).await;
        match outcome {
            Ok(result) => result,
            Err(_) => Err(PoolError::OpenTimeout {
                opened: barrier.opened(),
                expected: barrier.expected(),
                timeout: open_timeout,
            }),
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Borrow the connections and the event channel at the same time
    pub fn split(
        &mut self,
    ) -> (
        &mut [Box<dyn Connection>],
        &mut mpsc::UnboundedReceiver<ConnectionEvent>,
    ) {
        (&mut self.connections, &mut self.events)
    }

    /// Close every connection concurrently, returning the number of failures
    pub async fn close_all(&mut self) -> usize {
        let connections = std::mem::take(&mut self.connections);
        let total = connections.len();

        let results = join_all(
            connections
                .into_iter()
                .enumerate()
                .map(|(id, mut connection)| async move { (id, connection.close().await) }),
        )
        .await;

        let mut failures = 0;
        for (id, result) in results {
            if let Err(e) = result {
                warn!("Failed to close connection {}: {}", id, e);
                failures += 1;
            }
        }

        debug!("Closed {} connections ({} failures)", total, failures);
        failures
    }
}
