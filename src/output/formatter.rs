//! Output formatters for run reports
//!
//! Provides table, JSON, CSV and one-line summary output.

use std::fmt::Write as _;

use crate::results::{LevelReport, RunReport, StopReason};

/// Column header shared by CSV output and the result log
pub const CSV_HEADER: &str = "concurrency,rate,n,min,mean,max,stddev";

/// Output format options
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
    JsonPretty,
    Csv,
    Summary,
}

impl OutputFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "table" => Some(OutputFormat::Table),
            "json" => Some(OutputFormat::Json),
            "json-pretty" | "jsonpretty" => Some(OutputFormat::JsonPretty),
            "csv" => Some(OutputFormat::Csv),
            "summary" => Some(OutputFormat::Summary),
            _ => None,
        }
    }
}

/// Report formatter
pub struct ReportFormatter {
    format: OutputFormat,
    colorize: bool,
}

impl ReportFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            colorize: true,
        }
    }

    pub fn no_color(mut self) -> Self {
        self.colorize = false;
        self
    }

    /// Format a whole run
    pub fn format_report(&self, report: &RunReport) -> String {
        match self.format {
            OutputFormat::Table => self.format_table(report),
            OutputFormat::Json => serde_json::to_string(report).unwrap_or_default(),
            OutputFormat::JsonPretty => serde_json::to_string_pretty(report).unwrap_or_default(),
            OutputFormat::Csv => self.format_csv(report),
            OutputFormat::Summary => self.format_brief(report),
        }
    }

    fn format_table(&self, report: &RunReport) -> String {
        let mut output = String::new();
        let elapsed = report.completed_at - report.started_at;

        output.push_str("\n╔══════════════════════════════════════════════════════════════════════╗\n");
        let _ = writeln!(output, "║  Run against {:55} ║", report.endpoint);
        let _ = writeln!(
            output,
            "║  Started {}  ({:>6}s){:30}║",
            report.started_at.format("%Y-%m-%d %H:%M:%S"),
            elapsed.num_seconds(),
            ""
        );
        output.push_str("╠═══════╦══════════╦═════════╦═════════╦═════════╦═════════╦═══════════╣\n");
        output.push_str("║ Conns ║ Rate/s   ║ n       ║ Min ms  ║ Mean ms ║ Max ms  ║ Stddev ms ║\n");
        output.push_str("╠═══════╬══════════╬═════════╬═════════╬═════════╬═════════╬═══════════╣\n");

        for level in &report.levels {
            for result in &level.results {
                let _ = writeln!(
                    output,
                    "║ {:>5} ║ {:>8.1} ║ {:>7} ║ {:>7.2} ║ {:>7.2} ║ {:>7.2} ║ {:>9.2} ║",
                    result.concurrency,
                    result.effective_rate,
                    result.stats.n,
                    result.stats.min,
                    result.stats.mean,
                    result.stats.max,
                    result.stats.std_dev
                );
            }
            let _ = writeln!(output, "║ {:>5} ║ {:60} ║", level.concurrency, self.level_footer(level));
        }

        output.push_str("╚═══════╩══════════╩═════════╩═════════╩═════════╩═════════╩═══════════╝\n");

        if let Some(best) = report.best_level() {
            if let Some(peak) = best.peak() {
                let _ = writeln!(
                    output,
                    " Best: {} connections at {:.1} msg/s each ({:.0} msg/s total, mean {:.2}ms)",
                    best.concurrency,
                    peak.effective_rate,
                    peak.effective_rate * best.concurrency as f64,
                    peak.stats.mean
                );
            }
        }

        output
    }

    fn level_footer(&self, level: &LevelReport) -> String {
        let reason = format!("stopped: {} at {}/s", level.stop_reason, level.final_rate);
        let padded = format!("{reason:40}");
        let reason = if self.colorize {
            let color = match level.stop_reason {
                StopReason::RateCeiling => "32",
                StopReason::ReceptionTimeout => "33",
                StopReason::LostConnection | StopReason::OpenFailed => "31",
            };
            format!("\x1b[{color}m{padded}\x1b[0m")
        } else {
            padded
        };
        format!("{} {:>19}", reason, format!("{} points", level.results.len()))
    }

    fn format_csv(&self, report: &RunReport) -> String {
        let mut output = String::new();
        output.push_str(CSV_HEADER);
        output.push('\n');
        for level in &report.levels {
            for result in &level.results {
                output.push_str(&result.to_record().join(","));
                output.push('\n');
            }
        }
        output
    }

    fn format_brief(&self, report: &RunReport) -> String {
        let best = report
            .best_level()
            .and_then(|level| level.peak().map(|peak| (level.concurrency, peak.effective_rate)));

        match best {
            Some((concurrency, rate)) => format!(
                "{}: {} levels, {} load points, best {} connections at {:.1} msg/s",
                report.endpoint,
                report.levels.len(),
                report.total_results(),
                concurrency,
                rate
            ),
            None => format!(
                "{}: {} levels, no load point completed",
                report.endpoint,
                report.levels.len()
            ),
        }
    }
}

impl Default for ReportFormatter {
    fn default() -> Self {
        Self::new(OutputFormat::Table)
    }
}
