//! Offline transforms that turn upstream artifacts into the source tables the
//! ranking pipeline reads. Nothing here touches the network; the downloads
//! and API calls that produce the inputs happen elsewhere.

pub mod crime_rates;
pub mod salary;
pub mod zori;

use serde::Serialize;
use std::path::PathBuf;

/// Outcome of one preparation step
#[derive(Debug, Clone, Serialize)]
pub struct PrepareSummary {
    pub rows_written: usize,
    pub rows_skipped: usize,
    pub output_files: Vec<PathBuf>,
}
