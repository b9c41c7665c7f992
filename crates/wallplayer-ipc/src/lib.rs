//! Typed control<->engine messages for wallplayer.
//!
//! This crate defines the user-action commands fed into the scheduler and
//! the events the engine reports back to whatever frontend drives it
//! (keyboard daemon, stdin shell, remote control bridge).

mod commands;
mod events;

pub use commands::Action;
pub use events::EngineEvent;

use crossbeam_channel::{Receiver, Sender};

/// Channel capacity for actions (frontend → engine).
pub const ACTION_CHANNEL_CAPACITY: usize = 16;

/// Channel capacity for events (engine → frontend).
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Creates a bounded action channel.
pub fn action_channel() -> (Sender<Action>, Receiver<Action>) {
    crossbeam_channel::bounded(ACTION_CHANNEL_CAPACITY)
}

/// Creates a bounded event channel.
pub fn event_channel() -> (Sender<EngineEvent>, Receiver<EngineEvent>) {
    crossbeam_channel::bounded(EVENT_CHANNEL_CAPACITY)
}
