//! Error types for the probe module.

use thiserror::Error;

/// Errors that can occur while probing or persisting stream metadata.
///
/// These never propagate past the prober itself: callers always receive a
/// descriptor, valid or not.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// ffprobe could not be executed.
    #[error("ffprobe invocation failed: {0}")]
    Io(#[from] std::io::Error),

    /// Cache file could not be read or written.
    #[error("Probe cache error: {0}")]
    Cache(#[from] serde_json::Error),
}
