//! Stream tuning knobs.

use serde::{Deserialize, Serialize};

/// Sizes used when the registry builds adapters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Maximum bytes requested from the host per `body_read`.
    pub body_chunk_size: usize,
    /// High water mark for body-backed readables. Zero means a body source
    /// is only pulled when a reader is waiting.
    pub body_high_water_mark: usize,
    /// High water mark for the readable half of a transform stream.
    pub transform_high_water_mark: usize,
}

impl StreamConfig {
    pub const DEFAULT_BODY_CHUNK_SIZE: usize = 8192;
    pub const DEFAULT_TRANSFORM_HIGH_WATER_MARK: usize = 16 * 1024;
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            body_chunk_size: Self::DEFAULT_BODY_CHUNK_SIZE,
            body_high_water_mark: 0,
            transform_high_water_mark: Self::DEFAULT_TRANSFORM_HIGH_WATER_MARK,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let config: StreamConfig = serde_json::from_str(r#"{"body_chunk_size": 1024}"#).unwrap();
        assert_eq!(config.body_chunk_size, 1024);
        assert_eq!(config.body_high_water_mark, 0);
        assert_eq!(config.transform_high_water_mark, 16384);
    }
}
