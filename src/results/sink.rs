//! Result sinks
//!
//! A sink receives every load point as soon as its level finishes. The CSV
//! sink appends one headerless record per load point to a log named after
//! the run's start time and flushes after each record.

use chrono::{DateTime, Utc};
use std::fs::{self, File, OpenOptions};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::LoadPointResult;
use crate::error::SinkError;

/// Durable recorder of load point results
pub trait ResultSink: Send {
    fn record(&mut self, result: &LoadPointResult) -> Result<(), SinkError>;
}

/// CSV log of `concurrency,rate,n,min,mean,max,stddev` lines
pub struct CsvResultSink {
    path: PathBuf,
    writer: csv::Writer<BufWriter<File>>,
}

impl CsvResultSink {
    /// Open `<dir>/<start millis>.log` for appending
    pub fn for_run(dir: impl AsRef<Path>, started_at: DateTime<Utc>) -> Result<Self, SinkError> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).map_err(|source| SinkError::Open {
            path: dir.display().to_string(),
            source,
        })?;

        let path = dir.join(format!("{}.log", started_at.timestamp_millis()));
        Self::open(path)
    }

    pub fn open(path: impl Into<PathBuf>) -> Result<Self, SinkError> {
        let path = path.into();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| SinkError::Open {
                path: path.display().to_string(),
                source,
            })?;

        let writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(BufWriter::new(file));

        debug!("Recording results to {}", path.display());
        Ok(Self { path, writer })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ResultSink for CsvResultSink {
    fn record(&mut self, result: &LoadPointResult) -> Result<(), SinkError> {
        self.writer.write_record(result.to_record())?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Sink that keeps records in memory
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemorySink {
    pub records: Vec<LoadPointResult>,
}

#[cfg(test)]
impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
impl ResultSink for MemorySink {
    fn record(&mut self, result: &LoadPointResult) -> Result<(), SinkError> {
        self.records.push(*result);
        Ok(())
    }
}
