//! Load ramp driver
//!
//! Steps the per-connection message rate up for each concurrency level and
//! records every step whose round trips all came back.

mod controller;
mod ramp;

pub use controller::RunController;
