//! Rate-controlled dispatch
//!
//! Spreads an exact number of sends over a window using an ideal interval
//! plus a carried timing error. Every send adds `ideal - actual` to the
//! carried error; whenever the error covers at least one timer tick the
//! pacer sleeps it off and subtracts what the sleep actually took. Over- and
//! undersleeps are paid back on later sends, so the long-run rate stays exact
//! even though individual sleeps are coarse.

use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::debug;

use crate::error::DispatchError;
use crate::transport::Connection;

/// Smallest sleep worth requesting from the tokio timer (millisecond wheel)
pub const DEFAULT_SLEEP_GRANULARITY: Duration = Duration::from_millis(1);

/// Outcome of one dispatch window
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DispatchReport {
    /// Messages sent
    pub sent: u64,
    /// Wall time the window took
    pub elapsed: Duration,
    /// Messages per second, with elapsed time floored to one second
    pub effective_rate: f64,
}

/// Number of messages a window of `duration` holds at `rate` per second
pub fn messages_for(rate: u32, duration: Duration) -> u64 {
    (rate as u128 * duration.as_millis() / 1000) as u64
}

/// Round-robin pacer over a level's connections
#[derive(Debug)]
pub struct RateController {
    cursor: usize,
    granularity: Duration,
}

impl RateController {
    pub fn new() -> Self {
        Self {
            cursor: 0,
            granularity: DEFAULT_SLEEP_GRANULARITY,
        }
    }

    /// Set the minimum carried error that triggers a sleep
    #[cfg(test)]
    pub fn with_sleep_granularity(mut self, granularity: Duration) -> Self {
        self.granularity = granularity;
        self
    }

    /// Send `rate * duration` messages evenly across `duration`
    pub async fn dispatch_at_rate(
        &mut self,
        connections: &mut [Box<dyn Connection>],
        rate: u32,
        duration: Duration,
    ) -> Result<DispatchReport, DispatchError> {
        if connections.is_empty() {
            return Err(DispatchError::EmptyPool);
        }

        let total = messages_for(rate, duration);
        let started = Instant::now();
        if total == 0 {
            return Ok(DispatchReport {
                sent: 0,
                elapsed: Duration::ZERO,
                effective_rate: 0.0,
            });
        }

        let ideal = (duration.as_nanos() / total as u128) as i128;
        let threshold = (self.granularity.as_nanos() as i128).max(1);
        let mut carried: i128 = 0;
        let mut remaining = total;

        while remaining > 0 {
            while remaining > 0 && carried < threshold {
                let send_start = Instant::now();
                self.send_next(connections).await?;
                remaining -= 1;
                carried += ideal - send_start.elapsed().as_nanos() as i128;
            }

            while remaining > 0 && carried >= threshold {
                let wait_start = Instant::now();
                sleep(Duration::from_nanos(carried as u64)).await;
                carried -= wait_start.elapsed().as_nanos() as i128;
            }
        }

        let elapsed = started.elapsed();
        let effective_rate = total as f64 / elapsed.as_secs_f64().max(1.0);

        debug!(
            "Dispatched {} messages in {}ms ({:.1}/s, target {}/s)",
            total,
            elapsed.as_millis(),
            effective_rate,
            rate
        );

        Ok(DispatchReport {
            sent: total,
            elapsed,
            effective_rate,
        })
    }

    async fn send_next(
        &mut self,
        connections: &mut [Box<dyn Connection>],
    ) -> Result<(), DispatchError> {
        let id = self.cursor % connections.len();
        self.cursor = (id + 1) % connections.len();

        connections[id]
            .send_timestamp()
            .await
            .map_err(|source| DispatchError::Transport { id, source })
    }
}

impl Default for RateController {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::{MockBehavior, MockFactory};
    use crate::transport::{ClientFactory, ConnectionEvent, EventListener};
    use std::sync::Arc;
    use tokio::sync::mpsc;

    fn connections(
        factory: &MockFactory,
        count: usize,
    ) -> (
        Vec<Box<dyn Connection>>,
        mpsc::UnboundedReceiver<ConnectionEvent>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let conns = (0..count)
            .map(|id| factory.new_client("mock", Arc::new(EventListener::new(id, tx.clone()))))
            .collect();
        (conns, rx)
    }

    #[test]
    fn test_messages_for() {
        assert_eq!(messages_for(40, Duration::from_millis(1000)), 40);
        assert_eq!(messages_for(40, Duration::from_millis(500)), 20);
        assert_eq!(messages_for(3, Duration::from_millis(100)), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sends_exact_count_round_robin() {
        let factory = MockFactory::echo();
        let (mut conns, _rx) = connections(&factory, 7);
        let mut pacer = RateController::new();

        let report = pacer
            .dispatch_at_rate(&mut conns, 40, Duration::from_millis(1000))
            .await
            .unwrap();

        assert_eq!(report.sent, 40);
        let sends = factory.log().sends();
        assert_eq!(sends.len(), 40);
        for (i, conn) in sends.iter().enumerate() {
            assert_eq!(*conn, i % 7);
        }
        for pair in sends.windows(2) {
            assert_ne!(pair[0], pair[1]);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cursor_carries_across_windows() {
        let factory = MockFactory::echo();
        let (mut conns, _rx) = connections(&factory, 3);
        let mut pacer = RateController::new();

        for _ in 0..2 {
            pacer
                .dispatch_at_rate(&mut conns, 2, Duration::from_millis(1000))
                .await
                .unwrap();
        }

        assert_eq!(factory.log().sends(), vec![0, 1, 2, 0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_effective_rate_tracks_target() {
        let factory = MockFactory::echo();
        let (mut conns, _rx) = connections(&factory, 25);
        let mut pacer = RateController::new();

        for rate in [1, 41, 333, 2000] {
            let first = pacer
                .dispatch_at_rate(&mut conns, rate, Duration::from_millis(1000))
                .await
                .unwrap();
            let second = pacer
                .dispatch_at_rate(&mut conns, rate, Duration::from_millis(1000))
                .await
                .unwrap();

            let tolerance = rate as f64 * 0.01;
            assert!((first.effective_rate - rate as f64).abs() <= tolerance);
            assert!((first.effective_rate - second.effective_rate).abs() <= tolerance);
            assert!(first.elapsed <= Duration::from_millis(1005));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_is_spread_over_duration() {
        let factory = MockFactory::echo();
        let (mut conns, _rx) = connections(&factory, 2);
        let mut pacer = RateController::new();

        let report = pacer
            .dispatch_at_rate(&mut conns, 10, Duration::from_millis(2000))
            .await
            .unwrap();

        // 20 sends, 19 gaps of 100ms
        assert_eq!(report.sent, 20);
        assert!(report.elapsed >= Duration::from_millis(1900));
        assert!(report.elapsed <= Duration::from_millis(1905));
        assert!((report.effective_rate - 20.0 / report.elapsed.as_secs_f64()).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_coarse_granularity_keeps_count() {
        let factory = MockFactory::echo();
        let (mut conns, _rx) = connections(&factory, 4);
        let mut pacer = RateController::new().with_sleep_granularity(Duration::from_millis(10));

        let report = pacer
            .dispatch_at_rate(&mut conns, 500, Duration::from_millis(1000))
            .await
            .unwrap();

        // Sends are batched between sleeps but none are dropped
        assert_eq!(report.sent, 500);
        assert_eq!(factory.log().sends().len(), 500);
        assert!(report.elapsed <= Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_failure_propagates() {
        let factory = MockFactory::new(MockBehavior {
            fail_on_send: Some(3),
            ..Default::default()
        });
        let (mut conns, _rx) = connections(&factory, 2);
        let mut pacer = RateController::new();

        let err = pacer
            .dispatch_at_rate(&mut conns, 10, Duration::from_millis(1000))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Transport { id: 0, .. }));
    }

    #[tokio::test]
    async fn test_empty_pool_and_zero_count() {
        let mut pacer = RateController::new();
        let mut empty: Vec<Box<dyn Connection>> = Vec::new();
        assert!(matches!(
            pacer
                .dispatch_at_rate(&mut empty, 10, Duration::from_millis(1000))
                .await,
            Err(DispatchError::EmptyPool)
        ));

        let factory = MockFactory::echo();
        let (mut conns, _rx) = connections(&factory, 1);
        let report = pacer
            .dispatch_at_rate(&mut conns, 0, Duration::from_millis(1000))
            .await
            .unwrap();
        assert_eq!(report.sent, 0);
    }
}
