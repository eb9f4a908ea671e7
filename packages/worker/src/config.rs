use std::path::Path;

use edgebridge_streams::StreamConfig;
use serde::{Deserialize, Serialize};

use crate::error::{Result, WorkerError};

/// Configuration for a [`Worker`](crate::Worker).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Maximum bytes requested per host body read.
    pub body_chunk_size: usize,
    /// High water mark for body-backed readable streams.
    pub body_high_water_mark: usize,
    /// High water mark for the readable half of transform streams.
    pub transform_high_water_mark: usize,
    /// Free released streams after every request.
    pub sweep_after_request: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        let streams = StreamConfig::default();
        Self {
            body_chunk_size: streams.body_chunk_size,
            body_high_water_mark: streams.body_high_water_mark,
            transform_high_water_mark: streams.transform_high_water_mark,
            sweep_after_request: true,
        }
    }
}

impl WorkerConfig {
    /// Parse a JSON config. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: WorkerConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<()> {
        if self.body_chunk_size == 0 {
            return Err(WorkerError::InvalidConfig(
                "body_chunk_size must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    pub fn stream_config(&self) -> StreamConfig {
        StreamConfig {
            body_chunk_size: self.body_chunk_size,
            body_high_water_mark: self.body_high_water_mark,
            transform_high_water_mark: self.transform_high_water_mark,
        }
    }
}
