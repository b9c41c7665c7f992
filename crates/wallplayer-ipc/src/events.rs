//! Events reported by the engine.

use serde::{Deserialize, Serialize};

/// Events that the engine can send to the frontend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EngineEvent {
    /// Engine is ready and the first screen is starting.
    Ready,

    /// A screen became the active one on a display.
    ScreenActivated {
        /// Display index.
        display: usize,

        /// Screen index on that display.
        screen: usize,
    },

    /// A rotation finished; `active_ms` is how long the previous screen
    /// was on-air.
    RotationCompleted {
        display: usize,
        from: usize,
        to: usize,
        active_ms: u64,
    },

    /// A broken stream was detected and is being refreshed.
    StreamRecovered {
        display: usize,
        screen: usize,
        window: usize,
    },

    /// An orphaned player process was killed by the watchdog.
    OrphanKilled { pid: u32 },

    /// An action was rejected because another one is still pending.
    ActionRejected,

    /// Engine has shut down.
    Shutdown,
}
