//! Session factory backed by real player subprocesses.

use std::collections::HashMap;
use std::process::{Command, Stdio};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::control::ControlChannel;
use crate::error::SessionError;
use crate::proc::{kill_process, ProcessTable};
use crate::session::{shared_dest, ExclusiveSession, SharedSession, SharedSlot};
use crate::types::{LaunchRequest, PlayerSession, SessionKind};

/// Factory for player sessions plus the process-level operations the
/// watchdog needs. The engine never spawns or kills processes directly.
pub trait SessionLauncher: Send {
    /// Spawn (or, for shared sessions, attach to) a player process.
    fn launch(&mut self, request: LaunchRequest) -> Result<Box<dyn PlayerSession>, SessionError>;

    /// Rescan the OS and return every live player pid.
    fn live_pids(&mut self) -> Vec<u32>;

    /// Pids of idle shared players. Idle processes are healthy and must
    /// survive orphan cleanup.
    fn idle_pids(&self) -> Vec<u32>;

    /// Terminate a process the engine does not recognize.
    fn kill(&mut self, pid: u32);
}

/// Production launcher driving `omxplayer` (exclusive) and `cvlc`
/// (shared) subprocesses.
pub struct ShellLauncher {
    table: Arc<Mutex<ProcessTable>>,
    /// One shared slot per display.
    slots: HashMap<usize, Arc<Mutex<SharedSlot>>>,
}

impl ShellLauncher {
    pub fn new() -> Self {
        Self {
            table: Arc::new(Mutex::new(ProcessTable::new())),
            slots: HashMap::new(),
        }
    }

    fn launch_exclusive(
        &mut self,
        request: &LaunchRequest,
    ) -> Result<Box<dyn PlayerSession>, SessionError> {
        let ident = exclusive_ident(request.display, request.screen, request.window);
        let rect = if request.fullscreen {
            request.screen_rect
        } else {
            request.rect
        };

        let mut cmd = Command::new("omxplayer");
        cmd.args(["--no-keys", "--aspect-mode", "stretch", "--timeout", "60"])
            .args(["--threshold", &format!("{:.1}", request.buffer_ms as f64 / 1000.0)])
            .args(["--layer", &layer(request.window).to_string()])
            .args(["--dbus_name", &ident])
            .args(["--win", &format!("{} {} {} {}", rect.x1, rect.y1, rect.x2, rect.y2)]);

        if request.url.starts_with("rtsp://") {
            cmd.arg("--live");
            let transport = if request.force_udp { "udp" } else { "tcp" };
            cmd.args(["--avdict", &format!("rtsp_transport:{}", transport)]);
        }

        if request.audio {
            cmd.args(["--vol", &volume_millibels(request.audio_volume)]);
        } else {
            cmd.args(["--aidx", "-1"]);
        }

        match &request.subtitle_file {
            Some(path) => {
                cmd.arg("--subtitles").arg(path);
            }
            None => {
                cmd.arg("--no-osd");
            }
        }

        if request.loop_file {
            cmd.arg("--loop");
        }

        cmd.arg(&request.url);
        cmd.stdin(Stdio::null()).stdout(Stdio::null()).stderr(Stdio::null());

        let wrapper = cmd.spawn()?;
        debug!(
            url = %request.printable_url,
            ident = %ident,
            wrapper_pid = wrapper.id(),
            "exclusive player launched"
        );

        let control = ControlChannel::new(
            ident.clone(),
            request.control_timeout_ms,
            request.control_retries,
        );

        // The spawn pid belongs to the omxplayer wrapper script, not the
        // player binary. The session resolves the real pid from the
        // process table once omxplayer.bin shows up with our dbus ident
        // on its command line.
        Ok(Box::new(ExclusiveSession::new(
            control,
            ident,
            None,
            request.audio,
            Arc::clone(&self.table),
        )))
    }

    fn launch_shared(
        &mut self,
        request: &LaunchRequest,
    ) -> Result<Box<dyn PlayerSession>, SessionError> {
        let slot = Arc::clone(
            self.slots
                .entry(request.display)
                .or_insert_with(|| Arc::new(Mutex::new(SharedSlot::default()))),
        );

        let dest = {
            let mut guard = slot.lock();
            if guard.pid.is_none() {
                let signature = shared_signature(request.display);

                // A player left over from a previous run is adopted
                // instead of doubled up.
                let adopted = {
                    let mut table = self.table.lock();
                    table.refresh();
                    table.find_by_signature(&signature)
                };

                let pid = match adopted {
                    Some(pid) => {
                        info!(display = request.display, pid, "adopted running shared player");
                        pid
                    }
                    None => {
                        let pid = spawn_shared_player(request, &signature)?;
                        info!(display = request.display, pid, "shared player started");
                        pid
                    }
                };

                guard.pid = Some(pid);
                guard.ident = shared_dest(pid);
                guard.signature = signature;
            }
            guard.ident.clone()
        };

        let control = ControlChannel::new(
            dest,
            request.control_timeout_ms,
            request.control_retries,
        );

        Ok(Box::new(SharedSession::new(
            control,
            request.url.clone(),
            request.printable_url.clone(),
            request.audio,
            request.audio_volume,
            Arc::clone(&slot),
            Arc::clone(&self.table),
        )))
    }
}

impl Default for ShellLauncher {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionLauncher for ShellLauncher {
    fn launch(&mut self, request: LaunchRequest) -> Result<Box<dyn PlayerSession>, SessionError> {
        match request.kind {
            SessionKind::Exclusive => self.launch_exclusive(&request),
            SessionKind::Shared => self.launch_shared(&request),
        }
    }

    fn live_pids(&mut self) -> Vec<u32> {
        let mut table = self.table.lock();
        table.refresh();
        table.pids()
    }

    fn idle_pids(&self) -> Vec<u32> {
        self.slots
            .values()
            .filter_map(|slot| {
                let slot = slot.lock();
                if slot.active_url.is_none() {
                    slot.pid
                } else {
                    None
                }
            })
            .collect()
    }

    fn kill(&mut self, pid: u32) {
        warn!(pid, "terminating unrecognized player process");
        kill_process(pid, true);
        self.table.lock().remove(pid);

        for slot in self.slots.values() {
            let mut slot = slot.lock();
            if slot.pid == Some(pid) {
                slot.pid = None;
                slot.active_url = None;
            }
        }
    }
}

/// Spawn the display-wide vlc process. Its bus name is derived from the
/// pid, so the process must exist before any session can control it.
/// `cvlc` execs into vlc, so the spawn pid is the player's own.
fn spawn_shared_player(request: &LaunchRequest, signature: &str) -> Result<u32, SessionError> {
    let mut cmd = Command::new("cvlc");
    cmd.args([
        "--control",
        "dbus",
        "--fullscreen",
        "--no-video-title-show",
        "--no-osd",
        "--loop",
    ])
    // Never rendered; it marks the command line so the process table
    // can match the player back to its display.
    .args(["--video-title", signature])
    .args(["--network-caching", &request.buffer_ms.to_string()]);

    cmd.stdin(Stdio::null()).stdout(Stdio::null()).stderr(Stdio::null());

    let child = cmd.spawn()?;
    Ok(child.id())
}

fn exclusive_ident(display: usize, screen: usize, window: usize) -> String {
    format!(
        "org.mpris.MediaPlayer2.wallplayer_d{:02}_s{:02}_w{:02}",
        display, screen, window
    )
}

/// Command-line marker for the shared player of one display.
fn shared_signature(display: usize) -> String {
    format!("wallplayer_shared_d{:02}", display)
}

/// omxplayer volume is given in millibels.
fn volume_millibels(percent: u32) -> String {
    if percent >= 100 {
        "0".to_string()
    } else if percent == 0 {
        "-6000".to_string()
    } else {
        let gain = 2000.0 * (f64::from(percent) / 100.0).log10();
        format!("{:.0}", gain)
    }
}

/// Render layer for a window; higher windows stack above lower ones so a
/// fullscreen overlay always wins.
fn layer(window: usize) -> i32 {
    1 + window as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exclusive_ident_format() {
        assert_eq!(
            exclusive_ident(0, 3, 12),
            "org.mpris.MediaPlayer2.wallplayer_d00_s03_w12"
        );
    }

    #[test]
    fn test_shared_signature_format() {
        assert_eq!(shared_signature(2), "wallplayer_shared_d02");
    }

    #[test]
    fn test_volume_millibels() {
        assert_eq!(volume_millibels(100), "0");
        assert_eq!(volume_millibels(0), "-6000");
        // 50% is roughly -602 mB.
        assert_eq!(volume_millibels(50), "-602");
    }
}
