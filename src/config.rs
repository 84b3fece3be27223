//! Simulator configuration.
//!
//! Every field has a default matching the viewer's deployment, so an empty
//! JSON object (or no file at all) gives a working configuration:
//!
//! ```json
//! {
//!     "shm_root": "/dev/shm",
//!     "tick_ms": 16,
//!     "chunk_capacity": 4096,
//!     "max_chunks": 10000
//! }
//! ```

use crate::error::ConfigError;
use crate::shm::{
    DataLayout, CMD_SHM_NAME, DEFAULT_SHM_ROOT, GRID_SHM_NAME, MAX_CHUNKS_PER_FRAME, MAX_CHUNK_SIZE,
    SHM_NAME,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

fn default_shm_root() -> PathBuf {
    PathBuf::from(DEFAULT_SHM_ROOT)
}

fn default_command_region() -> String {
    CMD_SHM_NAME.into()
}

fn default_data_region() -> String {
    SHM_NAME.into()
}

fn default_field_region() -> String {
    GRID_SHM_NAME.into()
}

fn default_tick_ms() -> u64 {
    16
}

fn default_chunk_capacity() -> usize {
    MAX_CHUNK_SIZE
}

fn default_max_chunks() -> usize {
    MAX_CHUNKS_PER_FRAME
}

/// Where the shared regions live, how they are laid out and how fast the
/// loop runs.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SimulatorConfig {
    /// Directory holding the named regions.
    #[serde(default = "default_shm_root")]
    pub shm_root: PathBuf,
    #[serde(default = "default_command_region")]
    pub command_region: String,
    #[serde(default = "default_data_region")]
    pub data_region: String,
    #[serde(default = "default_field_region")]
    pub field_region: String,
    /// Loop period in milliseconds.
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    /// Agents per data chunk. Must match the viewer.
    #[serde(default = "default_chunk_capacity")]
    pub chunk_capacity: usize,
    /// Chunks per generation. Must match the viewer.
    #[serde(default = "default_max_chunks")]
    pub max_chunks: usize,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            shm_root: default_shm_root(),
            command_region: default_command_region(),
            data_region: default_data_region(),
            field_region: default_field_region(),
            tick_ms: default_tick_ms(),
            chunk_capacity: default_chunk_capacity(),
            max_chunks: default_max_chunks(),
        }
    }
}

impl SimulatorConfig {
    pub fn with_shm_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.shm_root = root.into();
        self
    }

    /// Set the loop period, rounded up to whole milliseconds (at least one).
    pub fn with_tick(mut self, tick: Duration) -> Self {
        let millis = tick.as_nanos().div_ceil(1_000_000).max(1);
        self.tick_ms = u64::try_from(millis).unwrap_or(u64::MAX);
        self
    }

    pub fn with_data_layout(mut self, layout: DataLayout) -> Self {
        self.chunk_capacity = layout.chunk_capacity;
        self.max_chunks = layout.max_chunks;
        self
    }

    /// Load and validate a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&json).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, json).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_ms == 0 {
            return Err(ConfigError::Invalid("tick_ms must be at least 1"));
        }
        if self.chunk_capacity == 0 {
            return Err(ConfigError::Invalid("chunk_capacity must be at least 1"));
        }
        if self.max_chunks == 0 {
            return Err(ConfigError::Invalid("max_chunks must be at least 1"));
        }
        if self.command_region.is_empty() || self.data_region.is_empty() || self.field_region.is_empty() {
            return Err(ConfigError::Invalid("region names must not be empty"));
        }
        Ok(())
    }

    pub fn data_layout(&self) -> DataLayout {
        DataLayout::new(self.chunk_capacity, self.max_chunks)
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }
}
