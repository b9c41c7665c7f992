//! Per-display rotation state.

use std::time::Instant;

use wallplayer_ipc::Action;

use crate::screen::Screen;

/// One physical display: its screens and the rotation state the
/// scheduler drives.
pub struct Display {
    /// Display number as configured (also the overlay target).
    pub index: usize,
    pub screens: Vec<Screen>,

    /// Currently shown screen. `None` only before bootstrap.
    pub active: Option<usize>,

    /// Screen currently pre-buffering for the next rotation.
    pub next: Option<usize>,

    /// Screen shown before the last rotation.
    pub previous: Option<usize>,

    /// Manual rotation pause.
    pub paused: bool,

    /// Zoomed window in single view; `None` in grid view.
    pub single_window: Option<usize>,

    /// Single pending-action slot; a second submission is rejected.
    pub pending: Option<Action>,

    pub last_rotation: Option<Instant>,
    pub last_watchdog: Option<Instant>,

    /// When to hide the currently shown overlay icon.
    pub icon_deadline: Option<Instant>,
}

impl Display {
    pub fn new(index: usize, screens: Vec<Screen>) -> Self {
        Self {
            index,
            screens,
            active: None,
            next: None,
            previous: None,
            paused: false,
            single_window: None,
            pending: None,
            last_rotation: None,
            last_watchdog: None,
            icon_deadline: None,
        }
    }

    /// Any window on a started screen still waiting for its process?
    pub fn any_init1(&self) -> bool {
        [self.active, self.next]
            .into_iter()
            .flatten()
            .any(|idx| self.screens[idx].any_init1())
    }
}
