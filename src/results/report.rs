//! Run and level reports

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::stats::LatencySummary;

/// Latency statistics gathered at one (concurrency, rate) load point
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LoadPointResult {
    /// Connections open during the step
    pub concurrency: u32,
    /// Target send rate across the pool for the step
    pub target_rate: u32,
    /// Average achieved send rate over the step
    pub effective_rate: f64,
    /// Round-trip statistics in milliseconds
    pub stats: LatencySummary,
}

impl LoadPointResult {
    /// One comma separated record: `concurrency,rate,n,min,mean,max,stddev`
    pub fn to_record(&self) -> [String; 7] {
        [
            self.concurrency.to_string(),
            format!("{:.6}", self.effective_rate),
            self.stats.n.to_string(),
            format!("{:.6}", self.stats.min),
            format!("{:.6}", self.stats.mean),
            format!("{:.6}", self.stats.max),
            format!("{:.6}", self.stats.std_dev),
        ]
    }
}

/// Why ramping stopped for a level
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// `rate * concurrency` reached the configured ceiling
    RateCeiling,
    /// Round trips for a step did not all arrive in time
    ReceptionTimeout,
    /// A connection closed, errored, or failed a send mid-run
    LostConnection,
    /// The level's connections never all opened
    OpenFailed,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopReason::RateCeiling => "rate ceiling",
            StopReason::ReceptionTimeout => "reception timeout",
            StopReason::LostConnection => "lost connection",
            StopReason::OpenFailed => "open failed",
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of one concurrency level
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LevelReport {
    pub concurrency: u32,
    pub results: Vec<LoadPointResult>,
    pub stop_reason: StopReason,
    /// Target rate when ramping stopped
    pub final_rate: u32,
    pub duration_ms: u64,
}

impl LevelReport {
    /// Highest effective rate that still completed every round trip
    pub fn peak(&self) -> Option<&LoadPointResult> {
        self.results
            .iter()
            .max_by(|a, b| a.effective_rate.total_cmp(&b.effective_rate))
    }
}

/// Outcome of a whole run
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunReport {
    pub endpoint: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub levels: Vec<LevelReport>,
}

impl RunReport {
    /// Total load points recorded across levels
    pub fn total_results(&self) -> usize {
        self.levels.iter().map(|l| l.results.len()).sum()
    }

    /// Level whose peak sustained the highest aggregate message rate
    pub fn best_level(&self) -> Option<&LevelReport> {
        self.levels
            .iter()
            .filter(|l| l.peak().is_some())
            .max_by(|a, b| {
                let a = aggregate_rate(a);
                let b = aggregate_rate(b);
                a.total_cmp(&b)
            })
    }
}

fn aggregate_rate(level: &LevelReport) -> f64 {
    level
        .peak()
        .map(|p| p.effective_rate * level.concurrency as f64)
        .unwrap_or(0.0)
}
