//! Ramp state machine
//!
//! For every concurrency level: open the pool, then step the message rate up
//! until a connection is lost, a step's round trips time out, or the load
//! reaches the ceiling. Each step dispatches several pacer windows while
//! consuming connection events, then waits a bounded time for the remaining
//! round trips. Only steps whose every message came back are recorded.

use chrono::Utc;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, error, info, warn};

use super::ramp::RampState;
use crate::config::RunConfig;
use crate::error::{DispatchError, RunError};
use crate::pacer::RateController;
use crate::pool::ConnectionPool;
use crate::results::{LevelReport, LoadPointResult, ResultSink, RunReport, StopReason};
use crate::stats::LatencyStatistics;
use crate::transport::{ClientFactory, ConnectionEvent};

/// How one step ended
#[derive(Clone, Debug, PartialEq)]
enum StepOutcome {
    Success(LoadPointResult),
    Timeout,
    Lost,
}

/// What a single connection event means to the running step
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum EventEffect {
    Sample,
    Ignored,
    Lost,
}

enum WaitOutcome {
    Complete,
    Lost,
}

/// Drives every concurrency level of a run in sequence
pub struct RunController<S: ResultSink> {
    factory: Arc<dyn ClientFactory>,
    config: RunConfig,
    sink: S,
}

impl<S: ResultSink> RunController<S> {
    pub fn new(factory: Arc<dyn ClientFactory>, config: RunConfig, sink: S) -> Self {
        Self {
            factory,
            config,
            sink,
        }
    }

    #[cfg(test)]
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Run every configured level
    ///
    /// Lost connections, timeouts and open failures only end their level.
    /// An error is returned only for a broken invariant.
    pub async fn run(&mut self) -> Result<RunReport, RunError> {
        self.config.validate()?;

        let started_at = Utc::now();
        let levels = self.config.concurrency_levels.clone();
        info!(
            "Starting run against {} with levels {:?}",
            self.config.endpoint, levels
        );

        let mut reports = Vec::with_capacity(levels.len());
        for concurrency in levels {
            let report = self.run_level(concurrency).await?;
            info!(
                "Concurrency {} done: {} load points, stopped by {}",
                concurrency,
                report.results.len(),
                report.stop_reason
            );
            reports.push(report);
        }

        Ok(RunReport {
            endpoint: self.config.endpoint.clone(),
            started_at,
            completed_at: Utc::now(),
            levels: reports,
        })
    }

    /// Open, ramp, and tear down one level
    pub async fn run_level(&mut self, concurrency: u32) -> Result<LevelReport, RunError> {
        info!("---------------- CONCURRENCY {} ----------------", concurrency);
        let level_start = Instant::now();
        let mut ramp = RampState::new(
            concurrency,
            self.config.starting_rate,
            self.config.ramp_constant,
            self.config.rate_ceiling,
        );

        let opened = ConnectionPool::open(
            self.factory.as_ref(),
            &self.config.endpoint,
            concurrency as usize,
            self.config.open_timeout(),
        )
        .await;

        let mut pool = match opened {
            Ok(pool) => pool,
            Err(e) if e.is_fatal() => {
                error!("Concurrency {}: {}, aborting run", concurrency, e);
                return Err(e.into());
            }
            Err(e) => {
                warn!("Concurrency {}: {}", concurrency, e);
                return Ok(LevelReport {
                    concurrency,
                    results: Vec::new(),
                    stop_reason: StopReason::OpenFailed,
                    final_rate: ramp.target_rate(),
                    duration_ms: level_start.elapsed().as_millis() as u64,
                });
            }
        };

        let ramped = self.ramp(&mut pool, &mut ramp).await;
        pool.close_all().await;
        let results = ramped?;

        if results.is_empty() {
            info!("Concurrency {} produced no load points", concurrency);
        }
        self.record(&results);

        Ok(LevelReport {
            concurrency,
            results,
            stop_reason: ramp.stop_reason(),
            final_rate: ramp.target_rate(),
            duration_ms: level_start.elapsed().as_millis() as u64,
        })
    }

    async fn ramp(
        &self,
        pool: &mut ConnectionPool,
        ramp: &mut RampState,
    ) -> Result<Vec<LoadPointResult>, RunError> {
        let mut pacer = RateController::new();
        let mut results = Vec::new();

        while ramp.should_continue() {
            match self.run_step(pool, &mut pacer, ramp).await? {
                StepOutcome::Success(result) => {
                    info!(
                        "{} connections at {}: rate {:.3} {}",
                        ramp.concurrency(),
                        ramp.target_rate(),
                        result.effective_rate,
                        result.stats.format_summary()
                    );
                    results.push(result);
                }
                StepOutcome::Timeout => {
                    info!(
                        "{} connections at {}: failed, not all messages received in {}ms",
                        ramp.concurrency(),
                        ramp.target_rate(),
                        self.config.reception_timeout_ms
                    );
                    return Ok(results);
                }
                StepOutcome::Lost => {
                    warn!(
                        "{} connections at {}: lost a connection, ending level",
                        ramp.concurrency(),
                        ramp.target_rate()
                    );
                    return Ok(results);
                }
            }

            ramp.advance();
            sleep(self.config.settle_interval()).await;
        }

        Ok(results)
    }

    /// One load point: dispatch, then wait for the round trips
    async fn run_step(
        &self,
        pool: &mut ConnectionPool,
        pacer: &mut RateController,
        ramp: &mut RampState,
    ) -> Result<StepOutcome, RunError> {
        let rate = ramp.target_rate();
        let windows = self.config.windows_per_step;
        let window = self.config.window();
        let (connections, events) = pool.split();

        // Anything still queued belongs to an earlier step
        let mut samples = LatencyStatistics::new();
        if drain(events, &mut samples) == EventEffect::Lost {
            ramp.mark_lost();
            return Ok(StepOutcome::Lost);
        }
        if !samples.is_empty() {
            debug!("Discarded {} stale round trips", samples.count());
            samples.reset();
        }

        let sends = async {
            let mut sent = 0u64;
            let mut rate_sum = 0.0;
            for _ in 0..windows {
                let report = pacer.dispatch_at_rate(connections, rate, window).await?;
                sent += report.sent;
                rate_sum += report.effective_rate;
            }
            Ok::<_, DispatchError>((sent, rate_sum / windows as f64))
        };
        tokio::pin!(sends);

        let dispatched = loop {
            tokio::select! {
                biased;
                event = events.recv() => {
                    let effect = match event {
                        Some(event) => apply(event, &mut samples),
                        None => EventEffect::Lost,
                    };
                    if effect == EventEffect::Lost {
                        ramp.mark_lost();
                        return Ok(StepOutcome::Lost);
                    }
                }
                result = &mut sends => break result,
            }
        };

        let (sent, effective_rate) = match dispatched {
            Ok(totals) => totals,
            Err(e) => {
                warn!("Dispatch at rate {} failed: {}", rate, e);
                ramp.mark_lost();
                return Ok(StepOutcome::Lost);
            }
        };

        ramp.arm_timeout();
        if drain(events, &mut samples) == EventEffect::Lost {
            ramp.mark_lost();
            return Ok(StepOutcome::Lost);
        }

        if samples.count() < sent {
            let wait = async {
                while let Some(event) = events.recv().await {
                    if apply(event, &mut samples) == EventEffect::Lost {
                        return WaitOutcome::Lost;
                    }
                    if samples.count() >= sent {
                        return WaitOutcome::Complete;
                    }
                }
                WaitOutcome::Lost
            };

            match timeout(self.config.reception_timeout(), wait).await {
                Err(_) => {
                    debug!("Received {}/{} round trips", samples.count(), sent);
                    return Ok(StepOutcome::Timeout);
                }
                Ok(WaitOutcome::Lost) => {
                    ramp.mark_lost();
                    return Ok(StepOutcome::Lost);
                }
                Ok(WaitOutcome::Complete) => {}
            }
        }
        ramp.clear_timeout();

        let stats = samples.summary().ok_or_else(|| {
            RunError::Invariant(format!("step at rate {rate} completed without samples"))
        })?;

        Ok(StepOutcome::Success(LoadPointResult {
            concurrency: ramp.concurrency(),
            target_rate: rate,
            effective_rate,
            stats,
        }))
    }

    /// Hand a finished level's results to the sink
    fn record(&mut self, results: &[LoadPointResult]) {
        for result in results {
            if let Err(e) = self.sink.record(result) {
                warn!(
                    "Failed to record result for {} at {:.1}: {}",
                    result.concurrency, result.effective_rate, e
                );
            }
        }
        if !results.is_empty() {
            info!("Wrote {} results", results.len());
        }
    }
}

fn apply(event: ConnectionEvent, samples: &mut LatencyStatistics) -> EventEffect {
    match event {
        ConnectionEvent::RoundTrip { elapsed, .. } => {
            samples.add_duration(elapsed);
            EventEffect::Sample
        }
        ConnectionEvent::Opened { id } => {
            debug!("Ignoring late open signal from connection {}", id);
            EventEffect::Ignored
        }
        ConnectionEvent::Error { id, error } => {
            warn!("Connection {} error: {}", id, error);
            EventEffect::Ignored
        }
        ConnectionEvent::Closed { id } => {
            warn!("Lost connection {}", id);
            EventEffect::Lost
        }
    }
}

/// Apply every event that is already queued
fn drain(
    events: &mut mpsc::UnboundedReceiver<ConnectionEvent>,
    samples: &mut LatencyStatistics,
) -> EventEffect {
    let mut effect = EventEffect::Ignored;
    while let Ok(event) = events.try_recv() {
        match apply(event, samples) {
            EventEffect::Lost => return EventEffect::Lost,
            EventEffect::Sample => effect = EventEffect::Sample,
            EventEffect::Ignored => {}
        }
    }
    effect
}
