use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, StreamError>;

#[derive(Error, Debug)]
pub enum StreamError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Corrupted batch file {}: {reason}", .path.display())]
    Corrupted { path: PathBuf, reason: String },
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("Parsing error")]
    Parse,
}

impl StreamError {
    pub(crate) fn corrupted(
        path: impl Into<PathBuf>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Corrupted {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Whether the error means the batch data itself is unusable.
    pub fn is_corruption(&self) -> bool {
        matches!(self, Self::Corrupted { .. })
    }
}

impl From<serde_json::Error> for StreamError {
    fn from(_: serde_json::Error) -> Self {
        Self::Parse
    }
}
