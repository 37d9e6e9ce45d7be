//! Output module for run summaries
//!
//! Statistics reporting for the `--stats` mode and the end-of-run summary.

mod stats;

pub use stats::{load_statistics, print_statistics, RunStatistics};
