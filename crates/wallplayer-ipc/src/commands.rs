//! User actions dispatched to the scheduler.

use serde::{Deserialize, Serialize};

/// A user-triggered action on the currently controlled display.
///
/// The scheduler holds a single pending-action slot: a new action requested
/// while another is still queued is rejected with a warning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    /// Zoom one window of the active screen to fullscreen (single view).
    SwitchSingle {
        /// Window to zoom; `None` keeps/starts at the first window.
        window: Option<usize>,
    },

    /// Leave single view and restore the grid layout.
    SwitchGrid,

    /// Switch to the next screen (or next window in single view).
    SwitchNext,

    /// Switch to the previous screen (or previous window in single view).
    SwitchPrev,

    /// Switch all affected windows to a higher quality stream.
    QualityUp,

    /// Switch all affected windows to a lower quality stream.
    QualityDown,

    /// Pause or resume automatic screen rotation.
    PauseToggle,

    /// Move keyboard/remote control focus to the next display.
    NextDisplay,
}
