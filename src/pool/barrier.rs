//! Open barrier
//!
//! Counts distinct open acknowledgments for one pool and releases exactly
//! once, when every connection has reported open.

use tracing::warn;

use crate::error::PoolError;
use crate::transport::ConnectionEvent;

/// Barrier progress after an event
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BarrierState {
    Pending,
    Released,
}

#[derive(Debug)]
pub struct OpenBarrier {
    opened: Vec<bool>,
    count: usize,
    released: bool,
}

impl OpenBarrier {
    pub fn new(expected: usize) -> Self {
        Self {
            opened: vec![false; expected],
            count: 0,
            released: expected == 0,
        }
    }

    pub fn expected(&self) -> usize {
        self.opened.len()
    }

    pub fn opened(&self) -> usize {
        self.count
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Feed one connection event into the barrier
    ///
    /// A repeated open from a connection already counted is ignored. An open
    /// from an index outside the pool can never be legitimate and is
    /// reported as [`PoolError::UnknownConnection`]. Errors and closes
    /// before release abort the barrier.
    pub fn observe(&mut self, event: &ConnectionEvent) -> Result<BarrierState, PoolError> {
        match event {
            ConnectionEvent::Opened { id } => self.signal(*id),
            ConnectionEvent::Error { id, error } if !self.released => Err(PoolError::OpenFailed {
                id: *id,
                reason: error.to_string(),
            }),
            ConnectionEvent::Closed { id } if !self.released => Err(PoolError::OpenFailed {
                id: *id,
                reason: "closed before opening".to_string(),
            }),
            _ => Ok(self.state()),
        }
    }

    fn signal(&mut self, id: usize) -> Result<BarrierState, PoolError> {
        let size = self.opened.len();
        let slot = self
            .opened
            .get_mut(id)
            .ok_or(PoolError::UnknownConnection { id, size })?;

        if *slot {
            warn!("Duplicate open signal from connection {}", id);
            return Ok(self.state());
        }

        *slot = true;
        self.count += 1;
        if self.count == size {
            self.released = true;
        }
        Ok(self.state())
    }

    fn state(&self) -> BarrierState {
        if self.released {
            BarrierState::Released
        } else {
            BarrierState::Pending
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;

    #[test]
    fn test_releases_only_when_all_open() {
        let mut barrier = OpenBarrier::new(3);

        for id in [2, 0] {
            let state = barrier.observe(&ConnectionEvent::Opened { id }).unwrap();
            assert_eq!(state, BarrierState::Pending);
        }
        assert_eq!(barrier.opened(), 2);

        let state = barrier.observe(&ConnectionEvent::Opened { id: 1 }).unwrap();
        assert_eq!(state, BarrierState::Released);
        assert!(barrier.is_released());
    }

    #[test]
    fn test_duplicate_open_does_not_release_early() {
        let mut barrier = OpenBarrier::new(2);

        barrier.observe(&ConnectionEvent::Opened { id: 0 }).unwrap();
        let state = barrier.observe(&ConnectionEvent::Opened { id: 0 }).unwrap();

        assert_eq!(state, BarrierState::Pending);
        assert_eq!(barrier.opened(), 1);
    }

    #[test]
    fn test_late_open_after_release_is_tolerated() {
        let mut barrier = OpenBarrier::new(1);
        barrier.observe(&ConnectionEvent::Opened { id: 0 }).unwrap();

        let state = barrier.observe(&ConnectionEvent::Opened { id: 0 }).unwrap();
        assert_eq!(state, BarrierState::Released);
        assert_eq!(barrier.opened(), 1);
    }

    #[test]
    fn test_unknown_connection_is_fatal() {
        let mut barrier = OpenBarrier::new(2);
        let err = barrier
            .observe(&ConnectionEvent::Opened { id: 5 })
            .unwrap_err();

        assert!(err.is_fatal());
    }

    #[test]
    fn test_error_during_open_aborts() {
        let mut barrier = OpenBarrier::new(2);
        barrier.observe(&ConnectionEvent::Opened { id: 0 }).unwrap();

        let err = barrier
            .observe(&ConnectionEvent::Error {
                id: 1,
                error: TransportError::NotConnected,
            })
            .unwrap_err();
        assert!(matches!(err, PoolError::OpenFailed { id: 1, .. }));
        assert!(!err.is_fatal());

        let mut barrier = OpenBarrier::new(1);
        let err = barrier
            .observe(&ConnectionEvent::Closed { id: 0 })
            .unwrap_err();
        assert!(matches!(err, PoolError::OpenFailed { id: 0, .. }));
    }

    #[test]
    fn test_empty_barrier_is_released() {
        let barrier = OpenBarrier::new(0);
        assert!(barrier.is_released());
        assert_eq!(barrier.expected(), 0);
    }
}
