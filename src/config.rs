use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, StreamError};

/// Construction parameters of a [`BatchStream`](crate::BatchStream).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Records per output batch.
    pub batch_size: usize,
    /// Upper bound on batches produced between two resets.
    #[serde(default = "unlimited")]
    pub max_batches: usize,
    /// Prefix of the batch files, `Batch<N>` is appended to it.
    pub prefix: String,
}

fn unlimited() -> usize {
    usize::MAX
}

impl StreamConfig {
    pub fn new(
        batch_size: usize,
        max_batches: usize,
        prefix: impl Into<String>,
    ) -> Self {
        Self {
            batch_size,
            max_batches,
            prefix: prefix.into(),
        }
    }

    /// Load the configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let file = fs::File::open(path)?;
        let config: StreamConfig = serde_json::from_reader(file)?;
        config.validate()?;
        log::debug!("Loaded stream configuration from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(StreamError::Config(
                "batch size must be positive".to_owned(),
            ));
        }
        Ok(())
    }
}
