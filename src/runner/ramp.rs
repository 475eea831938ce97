//! Per-level ramp state

use crate::results::StopReason;

/// Rate increment per step for a level: `max(1, ramp_constant / concurrency)`
pub fn rate_increment(ramp_constant: u32, concurrency: u32) -> u32 {
    (ramp_constant / concurrency.max(1)).max(1)
}

/// Mutable state of one level's ramp, owned by the control flow
#[derive(Clone, Debug)]
pub struct RampState {
    concurrency: u32,
    target_rate: u32,
    increment: u32,
    ceiling: u64,
    lost_connection: bool,
    reception_timeout: bool,
}

impl RampState {
    pub fn new(concurrency: u32, starting_rate: u32, ramp_constant: u32, ceiling: u64) -> Self {
        Self {
            concurrency,
            target_rate: starting_rate,
            increment: rate_increment(ramp_constant, concurrency),
            ceiling,
            lost_connection: false,
            reception_timeout: false,
        }
    }

    pub fn concurrency(&self) -> u32 {
        self.concurrency
    }

    pub fn target_rate(&self) -> u32 {
        self.target_rate
    }

    /// Messages per second the target receives at the current rate
    pub fn load(&self) -> u64 {
        self.target_rate as u64 * self.concurrency as u64
    }

    pub fn should_continue(&self) -> bool {
        !self.lost_connection && !self.reception_timeout && self.load() < self.ceiling
    }

    /// Move to the next step's rate
    pub fn advance(&mut self) {
        self.target_rate = self.target_rate.saturating_add(self.increment);
    }

    pub fn mark_lost(&mut self) {
        self.lost_connection = true;
    }

    /// Assume the step timed out until its round trips prove otherwise
    pub fn arm_timeout(&mut self) {
        self.reception_timeout = true;
    }

    pub fn clear_timeout(&mut self) {
        self.reception_timeout = false;
    }

    pub fn stop_reason(&self) -> StopReason {
        if self.lost_connection {
            StopReason::LostConnection
        } else if self.reception_timeout {
            StopReason::ReceptionTimeout
        } else {
            StopReason::RateCeiling
        }
    }
}
