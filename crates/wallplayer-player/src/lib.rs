//! Player session control protocol and process reconciliation.
//!
//! A player session wraps one external decode/render process and its
//! control channel. Two kinds exist:
//!
//! - **exclusive**: one process per window, playable windowed or
//!   fullscreen, terminated on stop;
//! - **shared**: at most one live process per display, fullscreen only,
//!   idles on stop and can be re-pointed at a different URL (hijacked) by
//!   another window.
//!
//! The scheduler only sees the [`PlayerSession`] capability trait and the
//! [`SessionLauncher`] factory, so tests can run against mocks while
//! production uses the subprocess-backed [`ShellLauncher`].

mod control;
mod error;
mod launcher;
mod proc;
mod session;
mod types;

pub use control::{ControlChannel, ControlMethod};
pub use error::SessionError;
pub use launcher::{SessionLauncher, ShellLauncher};
pub use proc::ProcessTable;
pub use session::{ExclusiveSession, SharedSession};
pub use types::{
    LaunchRequest, PlaybackStatus, PlayerSession, ProcessRecord, Rect, SessionKind, StatusReport,
};
