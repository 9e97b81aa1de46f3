//! Sequential reader of calibration batch files.
//!
//! A [`BatchStream`] walks the files `<prefix>Batch0`, `<prefix>Batch1`, ...
//! and hands out fixed-size batches of records, regardless of how many
//! records each file holds.

use std::path::PathBuf;

pub mod batch_stream;
pub mod config;
pub mod errors;
pub mod geometry;

pub use batch_stream::{BatchStream, ReadyStream};
pub use config::StreamConfig;
pub use errors::{Result, StreamError};
pub use geometry::Geometry;

pub const BATCH_FILE_STEM: &str = "Batch";

/// Path of the batch file number `index` for the given prefix.
///
/// The prefix is concatenated as-is, so `"data/"` and `"data/calib_"`
/// are both valid.
pub fn batch_file_path(prefix: &str, index: usize) -> PathBuf {
    PathBuf::from(format!("{}{}{}", prefix, BATCH_FILE_STEM, index))
}
