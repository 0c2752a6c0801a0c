/// Error types for the ingestion layer.
///
/// Every failure that can cross the reader/decoder boundary is a value of one
/// of these enums. Field-level anomalies never show up here: they degrade to
/// defaults inside the decoder and are only logged.
use std::io;

/// Failure to open the shared-memory region.
#[derive(Debug, thiserror::Error)]
pub enum OpenError {
    /// None of the candidate names resolved to a readable region.
    /// Expected while the producer is starting up or shutting down.
    #[error("shared memory not found (tried {})", tried.join(", "))]
    NotFound { tried: Vec<String> },

    /// The region exists but this process may not map it.
    #[error("access denied opening shared memory '{name}'")]
    AccessDenied { name: String },

    /// Any other OS failure while opening or mapping a candidate.
    #[error("failed to map shared memory '{name}': {source}")]
    Io {
        name: String,
        #[source]
        source: io::Error,
    },
}

/// Failure to decode a raw buffer into a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// The buffer is smaller than the selected revision's total size.
    #[error("buffer too short: expected {expected} bytes, got {actual}")]
    TooShort { expected: usize, actual: usize },

    /// A field's byte range falls outside the buffer.
    #[error("field '{field}' at {offset}+{len} exceeds buffer of {available} bytes")]
    FieldOutOfRange {
        field: &'static str,
        offset: usize,
        len: usize,
        available: usize,
    },

    /// No registered revision matches the ABI tag or the buffer size.
    #[error("unsupported layout: abi 0x{abi_version:08X}, {len} bytes")]
    UnsupportedLayout { abi_version: u32, len: usize },
}

/// Failure of a stable read through the consistency guard.
#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    /// The mapped region reports a length of zero.
    #[error("shared memory '{name}' is empty")]
    EmptyRegion { name: String },

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// Failure while reading one diagnostics frame.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The stream closed or failed mid-frame.
    #[error("stream error: {0}")]
    Io(#[from] io::Error),

    /// The length prefix exceeds the configured maximum; the stream can no
    /// longer be trusted to be on a frame boundary.
    #[error("frame of {len} bytes exceeds maximum of {max}")]
    Oversized { len: u32, max: u32 },

    /// The payload was read completely but is not a diagnostics message.
    #[error("malformed diagnostics payload: {0}")]
    Payload(#[from] serde_json::Error),
}

/// Failure to load an [`IngestConfig`](crate::config::IngestConfig).
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read '{path}'")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config")]
    Parse(#[from] toml::de::Error),
}
