//! Streaming latency accumulator
//!
//! Uses Welford's online algorithm so samples never need to be retained.
//! Standard deviation is the sample (n - 1) form.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Summary of a latency distribution in milliseconds
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LatencySummary {
    /// Number of samples
    pub n: u64,
    /// Minimum latency
    pub min: f64,
    /// Maximum latency
    pub max: f64,
    /// Mean latency
    pub mean: f64,
    /// Sample standard deviation
    pub std_dev: f64,
}

impl LatencySummary {
    /// Format as summary string
    pub fn format_summary(&self) -> String {
        format!(
            "n={} min={:.2}ms mean={:.2}ms max={:.2}ms std={:.2}ms",
            self.n, self.min, self.mean, self.max, self.std_dev
        )
    }
}

/// Streaming accumulator over an unordered set of samples
#[derive(Clone, Debug, Default)]
pub struct LatencyStatistics {
    n: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl LatencyStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one sample in milliseconds
    pub fn add(&mut self, sample_ms: f64) {
        self.n += 1;

        if self.n == 1 {
            self.min = sample_ms;
            self.max = sample_ms;
        } else {
            self.min = self.min.min(sample_ms);
            self.max = self.max.max(sample_ms);
        }

        let delta = sample_ms - self.mean;
        self.mean += delta / self.n as f64;
        self.m2 += delta * (sample_ms - self.mean);
    }

    /// Add one round trip
    pub fn add_duration(&mut self, elapsed: Duration) {
        self.add(elapsed.as_secs_f64() * 1000.0);
    }

    /// Number of samples seen so far
    pub fn count(&self) -> u64 {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    /// Drop all samples
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Summarize the samples, `None` when nothing was recorded
    pub fn summary(&self) -> Option<LatencySummary> {
        if self.n == 0 {
            return None;
        }

        let std_dev = if self.n > 1 {
            (self.m2 / (self.n - 1) as f64).sqrt()
        } else {
            0.0
        };

        Some(LatencySummary {
            n: self.n,
            min: self.min,
            max: self.max,
            mean: self.mean,
            std_dev,
        })
    }
}

impl Extend<f64> for LatencyStatistics {
    fn extend<I: IntoIterator<Item = f64>>(&mut self, iter: I) {
        for sample in iter {
            self.add(sample);
        }
    }
}
