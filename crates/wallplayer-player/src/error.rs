//! Error types for player sessions.

use thiserror::Error;

/// Errors that can occur while driving an external player process.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Player process could not be spawned.
    #[error("Player spawn failed: {0}")]
    Spawn(#[from] std::io::Error),

    /// Control channel did not answer within the retry budget.
    #[error("Control channel '{0}' not responding")]
    ControlUnresponsive(String),

    /// No live process backs this session.
    #[error("Session has no live process")]
    NoProcess,
}
