//! Shared protocol types and the session capability trait.

use std::path::PathBuf;

use crate::error::SessionError;

/// A screen-space rectangle (pixel coordinates, top-left origin).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl Rect {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> u32 {
        (self.x2 - self.x1).max(0) as u32
    }

    pub fn height(&self) -> u32 {
        (self.y2 - self.y1).max(0) as u32
    }

    /// The same rectangle shifted horizontally, used to park a window
    /// outside the visible area.
    pub fn offset_x(&self, offset: i32) -> Self {
        Self {
            x1: self.x1 + offset,
            y1: self.y1,
            x2: self.x2 + offset,
            y2: self.y2,
        }
    }
}

/// Which session implementation backs a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKind {
    /// One process per window; terminated on stop.
    Exclusive,

    /// One process per display, fullscreen only; idles on stop and can be
    /// hijacked by another window.
    Shared,
}

/// Playback status reported over the control channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackStatus {
    Playing,
    Stopped,
    Unknown,
}

/// One control-channel status round trip.
#[derive(Debug, Clone, Copy)]
pub struct StatusReport {
    pub status: PlaybackStatus,

    /// Reported playback duration counter. For continuous streams the
    /// status field is unreliable; an advancing duration also counts as
    /// healthy.
    pub duration: Option<i64>,
}

/// Everything needed to launch one player session.
#[derive(Debug, Clone)]
pub struct LaunchRequest {
    /// Stream URL, credentials included.
    pub url: String,

    /// Credential-stripped URL for logging.
    pub printable_url: String,

    /// Session kind to launch.
    pub kind: SessionKind,

    /// Window geometry.
    pub rect: Rect,

    /// Full virtual-screen geometry (fullscreen playback target).
    pub screen_rect: Rect,

    /// Start fullscreen rather than at `rect`.
    pub fullscreen: bool,

    /// Start inside the visible area; invisible sessions are parked
    /// off-screen (exclusive) or left idle (shared).
    pub visible: bool,

    /// Enable the audio track.
    pub audio: bool,

    /// Audio volume in percent.
    pub audio_volume: u32,

    /// Subtitle file carrying the channel-name OSD, if any.
    pub subtitle_file: Option<PathBuf>,

    /// Use UDP transport instead of TCP for RTSP.
    pub force_udp: bool,

    /// Loop playback (local demo files).
    pub loop_file: bool,

    /// Player network buffer in milliseconds.
    pub buffer_ms: u64,

    /// Control round-trip timeout in milliseconds.
    pub control_timeout_ms: u64,

    /// Control retries before giving up.
    pub control_retries: u32,

    /// Owning display/screen/window, used for control-channel identity
    /// and layer assignment.
    pub display: usize,
    pub screen: usize,
    pub window: usize,
}

/// Capability interface over one external player process.
///
/// The two kinds implement the same surface; callers never branch on the
/// kind except to ask whether the session idles instead of dying.
pub trait PlayerSession: Send {
    /// Which implementation backs this session.
    fn kind(&self) -> SessionKind;

    /// Last resolved process id, if any.
    fn pid(&self) -> Option<u32>;

    /// Try to resolve the process id from the process table. Used while
    /// the session is initializing.
    fn resolve_pid(&mut self) -> Option<u32>;

    /// Synchronous status round trip. With `kill_on_error` the process is
    /// force-killed once the retry budget is exhausted.
    fn query_status(&mut self, kill_on_error: bool) -> Result<StatusReport, SessionError>;

    /// Move the playback window.
    fn set_position(&mut self, rect: Rect) -> Result<(), SessionError>;

    /// Like [`Self::set_position`] but dispatched to a detached worker so
    /// a slow control channel cannot stall the scheduler tick. The worker
    /// issues exactly one command and mutates no session state.
    fn set_position_detached(&self, rect: Rect);

    /// Bring the session on-screen at `rect` (exclusive: reposition;
    /// shared: start playback of this session's URL, hijacking the
    /// process if it plays something else).
    fn show(&mut self, rect: Rect) -> Result<(), SessionError>;

    /// Take the session off-screen without discarding it (exclusive: park
    /// outside the visible area; shared: stop playback, process idles).
    fn hide(&mut self, offscreen: Rect) -> Result<(), SessionError>;

    /// Set the audio volume in percent.
    fn set_volume(&mut self, percent: u32) -> Result<(), SessionError>;

    /// Release the session: idle it when the kind supports idling, else
    /// terminate the process.
    fn stop(&mut self);

    /// Kill the backing process immediately.
    fn force_kill(&mut self);

    /// Whether the session stays alive (idle) when hidden or stopped.
    fn supports_idle(&self) -> bool {
        self.kind() == SessionKind::Shared
    }

    /// Whether the audio track was enabled at launch. Toggling audio on an
    /// exclusive session requires a relaunch.
    fn audio_enabled(&self) -> bool;
}

/// One row of the external process table.
#[derive(Debug, Clone)]
pub struct ProcessRecord {
    pub pid: u32,
    pub cmdline: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_dimensions() {
        let rect = Rect::new(0, 0, 960, 540);
        assert_eq!(rect.width(), 960);
        assert_eq!(rect.height(), 540);
    }

    #[test]
    fn test_rect_offset_parks_off_screen() {
        let rect = Rect::new(0, 0, 960, 540).offset_x(10_000);
        assert_eq!(rect.x1, 10_000);
        assert_eq!(rect.x2, 10_960);
        assert_eq!(rect.y1, 0);
    }
}
