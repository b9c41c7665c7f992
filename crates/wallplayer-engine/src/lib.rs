//! The orchestration core: per-window stream lifecycle, resource-aware
//! rotation scheduling, screen changeover and the watchdog.
//!
//! All scheduler state is owned by the single tick loop; one tick performs
//! at most one state-changing action. Time enters through the `now`
//! parameter of [`ScreenManager::tick`] so scheduling is deterministic
//! under test.

mod context;
mod display;
mod error;
mod scheduler;
mod screen;
mod selection;
mod window;

#[cfg(test)]
mod testutil;

pub use context::WallContext;
pub use display::Display;
pub use error::EngineError;
pub use scheduler::ScreenManager;
pub use screen::Screen;
pub use selection::{default_stream, highest_valid, lowest_valid};
pub use window::{PlayState, Window};
