//! MPRIS control channel over `dbus-send`.
//!
//! Each player process registers a unique bus name; commands are one-shot
//! subprocess calls so a dead player can never wedge the caller beyond the
//! reply timeout.

use std::process::Command;
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::SessionError;
use crate::types::{PlaybackStatus, Rect, StatusReport};

const MPRIS_OBJECT: &str = "/org/mpris/MediaPlayer2";
const PLAYER_INTERFACE: &str = "org.mpris.MediaPlayer2.Player";
const PROPS_INTERFACE: &str = "org.freedesktop.DBus.Properties";

/// Delay between retries of a failed control call.
const RETRY_DELAY: Duration = Duration::from_millis(250);

/// Control methods understood by the player processes.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlMethod {
    /// Read the `PlaybackStatus` property.
    Status,

    /// Read the playback position counter.
    Duration,

    /// Stop playback. Shared players idle, exclusive players quit.
    Stop,

    /// Point the player at a new URL.
    OpenUri(String),

    /// Set the volume (0.0 to 1.0).
    Volume(f64),

    /// Move the video window.
    VideoPos(Rect),
}

/// Handle to one player's MPRIS endpoint.
///
/// Cloneable so detached position workers can issue a single command
/// without borrowing the owning session.
#[derive(Debug, Clone)]
pub struct ControlChannel {
    dest: String,
    timeout_ms: u64,
    retries: u32,
}

impl ControlChannel {
    pub fn new(dest: String, timeout_ms: u64, retries: u32) -> Self {
        Self {
            dest,
            timeout_ms,
            retries,
        }
    }

    /// Unique bus name of the controlled player.
    pub fn dest(&self) -> &str {
        &self.dest
    }

    /// Issue a command, retrying transient failures.
    pub fn call(&self, method: &ControlMethod) -> Result<String, SessionError> {
        let mut attempts = 0;

        loop {
            match self.call_once(method) {
                Ok(reply) => return Ok(reply),
                Err(_) if attempts < self.retries => {
                    attempts += 1;
                    debug!(
                        dest = %self.dest,
                        attempt = attempts,
                        "control call failed, retrying"
                    );
                    thread::sleep(RETRY_DELAY);
                }
                Err(e) => {
                    warn!(dest = %self.dest, method = ?method, "control call gave up: {}", e);
                    return Err(SessionError::ControlUnresponsive(self.dest.clone()));
                }
            }
        }
    }

    /// Issue a command once, without the retry loop. Used by callers that
    /// implement their own failure policy.
    pub fn call_once(&self, method: &ControlMethod) -> Result<String, SessionError> {
        let mut cmd = Command::new("dbus-send");
        cmd.arg("--print-reply=literal")
            .arg("--session")
            .arg(format!("--reply-timeout={}", self.timeout_ms))
            .arg(format!("--dest={}", self.dest))
            .arg(MPRIS_OBJECT);

        match method {
            ControlMethod::Status => {
                cmd.arg(format!("{}.Get", PROPS_INTERFACE))
                    .arg(format!("string:{}", PLAYER_INTERFACE))
                    .arg("string:PlaybackStatus");
            }
            ControlMethod::Duration => {
                cmd.arg(format!("{}.Get", PROPS_INTERFACE))
                    .arg(format!("string:{}", PLAYER_INTERFACE))
                    .arg("string:Position");
            }
            ControlMethod::Stop => {
                cmd.arg(format!("{}.Stop", PLAYER_INTERFACE));
            }
            ControlMethod::OpenUri(uri) => {
                cmd.arg(format!("{}.OpenUri", PLAYER_INTERFACE))
                    .arg(format!("string:{}", uri));
            }
            ControlMethod::Volume(volume) => {
                cmd.arg(format!("{}.Volume", PLAYER_INTERFACE))
                    .arg(format!("double:{:.2}", volume));
            }
            ControlMethod::VideoPos(rect) => {
                cmd.arg(format!("{}.VideoPos", PLAYER_INTERFACE))
                    .arg("objpath:/not/used")
                    .arg(format!(
                        "string:{} {} {} {}",
                        rect.x1, rect.y1, rect.x2, rect.y2
                    ));
            }
        }

        let output = cmd.output()?;
        if !output.status.success() {
            return Err(SessionError::ControlUnresponsive(self.dest.clone()));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Full status round trip: playback state plus the position counter.
    pub fn query_status(&self) -> Result<StatusReport, SessionError> {
        let reply = self.call(&ControlMethod::Status)?;
        let status = parse_playback_status(&reply);

        // The position counter is best-effort; continuous streams often
        // report a stale status while the counter keeps advancing.
        let duration = self
            .call_once(&ControlMethod::Duration)
            .ok()
            .and_then(|reply| parse_duration(&reply));

        Ok(StatusReport { status, duration })
    }
}

fn parse_playback_status(reply: &str) -> PlaybackStatus {
    if reply.contains("Playing") {
        PlaybackStatus::Playing
    } else if reply.contains("Stopped") || reply.contains("Paused") {
        PlaybackStatus::Stopped
    } else {
        PlaybackStatus::Unknown
    }
}

/// Replies look like `variant       int64 1234567`.
fn parse_duration(reply: &str) -> Option<i64> {
    reply
        .split_whitespace()
        .rev()
        .find_map(|token| token.parse::<i64>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_playback_status() {
        assert_eq!(
            parse_playback_status("variant       Playing"),
            PlaybackStatus::Playing
        );
        assert_eq!(
            parse_playback_status("variant       Paused"),
            PlaybackStatus::Stopped
        );
        assert_eq!(parse_playback_status("garbage"), PlaybackStatus::Unknown);
    }

    #[test]
    fn test_parse_duration_takes_trailing_number() {
        assert_eq!(parse_duration("variant       int64 1234567"), Some(1234567));
        assert_eq!(parse_duration("no numbers here"), None);
    }
}
