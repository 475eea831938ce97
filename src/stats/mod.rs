//! Latency statistics
//!
//! Streaming summary of round-trip samples collected during one ramp step.

mod latency;

pub use latency::{LatencyStatistics, LatencySummary};
