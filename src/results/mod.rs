//! Load point results
//!
//! Result records, per-level and per-run reports, and the sinks that
//! persist records as they are produced.

mod report;
mod sink;

pub use report::{LevelReport, LoadPointResult, RunReport, StopReason};
pub use sink::{CsvResultSink, ResultSink};

#[cfg(test)]
pub use sink::MemorySink;
