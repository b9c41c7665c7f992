//! Engine error types.

use thiserror::Error;

/// Fatal engine construction errors. Everything after construction is
/// handled locally: a failing window never aborts the scheduler loop.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The configuration maps no screens onto any display.
    #[error("No displays configured")]
    NoDisplays,
}
