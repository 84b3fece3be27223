//! Error types for UglyLab.
//!
//! This module provides error types for shared-memory attachment, field
//! serialization, agent publishing and configuration loading. None of these
//! cross the shared-memory boundary: the simulator logs them and keeps
//! running, so the viewer can only notice a problem by missing state.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while opening or mapping a shared-memory region.
#[derive(Debug, Error)]
pub enum ShmError {
    /// The backing object could not be opened or created.
    #[error("failed to open shared memory region {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// The backing object could not be resized to the requested length.
    #[error("failed to resize shared memory region {path} to {len} bytes: {source}")]
    Resize {
        path: PathBuf,
        len: usize,
        #[source]
        source: io::Error,
    },
    /// The region could not be mapped into this process.
    #[error("failed to map shared memory region {path}: {source}")]
    Map {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// The region exists but is shorter than the layout requires.
    #[error("shared memory region {path} is {actual} bytes, expected at least {expected}")]
    TooSmall {
        path: PathBuf,
        expected: usize,
        actual: usize,
    },
}

/// Errors raised by the field abstraction and the field channel.
#[derive(Debug, Error)]
pub enum FieldError {
    /// A type tag outside the known set of element kinds.
    #[error("unsupported field type tag {0}")]
    UnsupportedKind(i32),
    /// The negotiated element kind does not match the world's field.
    #[error("field kind mismatch: world holds {expected:?}, channel negotiated {actual:?}")]
    KindMismatch {
        expected: crate::field::FieldKind,
        actual: crate::field::FieldKind,
    },
    /// The region header describes different dimensions than the field.
    #[error("field dimensions mismatch: expected {expected:?}, region holds {actual:?}")]
    DimensionMismatch {
        expected: [usize; 3],
        actual: [i32; 3],
    },
    /// A header carried negative dimensions.
    #[error("invalid field dimensions {0:?}")]
    InvalidDimensions([i32; 3]),
    /// The destination region cannot hold the serialized field.
    #[error("region of {actual} bytes is too small for a field needing {required} bytes")]
    RegionTooSmall { required: usize, actual: usize },
    /// The underlying shared-memory region failed.
    #[error(transparent)]
    Shm(#[from] ShmError),
}

/// Errors that can occur when publishing an agent snapshot.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PublishError {
    /// The snapshot needs more chunks than one generation holds.
    #[error("too many agents ({agents}), max allowed is {capacity}")]
    CapacityExceeded { agents: usize, capacity: usize },
}

/// Errors that stop the simulator loop from running at all.
#[derive(Debug, Error)]
pub enum SimulatorError {
    /// The command or data channel is not attached.
    #[error("shared memory not available: {channel} channel is not attached")]
    ChannelUnavailable { channel: &'static str },
}

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// The file is not valid JSON for [`crate::config::SimulatorConfig`].
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    /// A value is outside its allowed range.
    #[error("invalid configuration: {0}")]
    Invalid(&'static str),
}
