use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Bytes a relay buffer holds before suspending the delivering peer.
pub const DEFAULT_BUFFER_CAPACITY: usize = 100 * 1_024;

/// Largest single chunk accepted, independent of transport message limits.
pub const DEFAULT_MAX_CHUNK_LENGTH: usize = 1_024 * 1_024;

/// Ceiling applied when a data reference is opened without an explicit one.
pub const DEFAULT_MAX_ALLOWED_LENGTH: u64 = 512_000;

#[derive(Copy, Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[non_exhaustive]
pub struct RelayConfig {
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,

    #[serde(default = "default_max_chunk_length")]
    pub max_chunk_length: usize,

    #[serde(default = "default_max_allowed_length")]
    pub default_max_allowed_length: u64,
}

impl RelayConfig {
    #[must_use]
    pub const fn new(
        buffer_capacity: usize,
        max_chunk_length: usize,
        default_max_allowed_length: u64,
    ) -> Self {
        Self {
            buffer_capacity,
            max_chunk_length,
            default_max_allowed_length,
        }
    }

    pub const fn validate(&self) -> Result<(), InvalidRelayConfig> {
        if self.buffer_capacity == 0 {
            return Err(InvalidRelayConfig::ZeroBufferCapacity);
        }

        if self.max_chunk_length == 0 {
            return Err(InvalidRelayConfig::ZeroChunkLength);
        }

        Ok(())
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self::new(
            DEFAULT_BUFFER_CAPACITY,
            DEFAULT_MAX_CHUNK_LENGTH,
            DEFAULT_MAX_ALLOWED_LENGTH,
        )
    }
}

const fn default_buffer_capacity() -> usize {
    DEFAULT_BUFFER_CAPACITY
}

const fn default_max_chunk_length() -> usize {
    DEFAULT_MAX_CHUNK_LENGTH
}

const fn default_max_allowed_length() -> u64 {
    DEFAULT_MAX_ALLOWED_LENGTH
}

#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum InvalidRelayConfig {
    #[error("relay buffer capacity must be greater than zero")]
    ZeroBufferCapacity,
    #[error("maximum chunk length must be greater than zero")]
    ZeroChunkLength,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_fall_back_to_defaults() {
        let config: RelayConfig = toml::from_str("buffer_capacity = 1024").unwrap();

        assert_eq!(config.buffer_capacity, 1024);
        assert_eq!(config.max_chunk_length, DEFAULT_MAX_CHUNK_LENGTH);
        assert_eq!(config.default_max_allowed_length, DEFAULT_MAX_ALLOWED_LENGTH);
    }

    #[test]
    fn test_validate() {
        assert_eq!(RelayConfig::default().validate(), Ok(()));
        assert_eq!(
            RelayConfig::new(0, 1, 1).validate(),
            Err(InvalidRelayConfig::ZeroBufferCapacity)
        );
        assert_eq!(
            RelayConfig::new(1, 0, 1).validate(),
            Err(InvalidRelayConfig::ZeroChunkLength)
        );
    }
}
