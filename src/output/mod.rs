//! Output formatting module
//!
//! Renders run reports for the terminal or for other tools.

mod formatter;

pub use formatter::{OutputFormat, ReportFormatter};
