//! Session implementations over the two player kinds.

use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::control::{ControlChannel, ControlMethod};
use crate::error::SessionError;
use crate::proc::{kill_process, ProcessTable};
use crate::types::{PlayerSession, Rect, SessionKind, StatusReport};

/// Session over a dedicated per-window player process.
///
/// The process renders exactly one URL for its whole lifetime; visibility
/// is controlled by moving the video window in and out of the screen area.
pub struct ExclusiveSession {
    control: ControlChannel,
    ident: String,
    pid: Option<u32>,
    audio: bool,
    table: Arc<Mutex<ProcessTable>>,
}

impl ExclusiveSession {
    pub fn new(
        control: ControlChannel,
        ident: String,
        pid: Option<u32>,
        audio: bool,
        table: Arc<Mutex<ProcessTable>>,
    ) -> Self {
        Self {
            control,
            ident,
            pid,
            audio,
            table,
        }
    }
}

impl PlayerSession for ExclusiveSession {
    fn kind(&self) -> SessionKind {
        SessionKind::Exclusive
    }

    fn pid(&self) -> Option<u32> {
        self.pid
    }

    fn resolve_pid(&mut self) -> Option<u32> {
        if self.pid.is_none() {
            let mut table = self.table.lock();
            // Rescan only when the current snapshot does not know the
            // ident yet; the binary takes a moment to appear.
            if table.find_by_signature(&self.ident).is_none() {
                table.refresh();
            }
            self.pid = table.find_by_signature(&self.ident);
        }
        self.pid
    }

    fn query_status(&mut self, kill_on_error: bool) -> Result<StatusReport, SessionError> {
        match self.control.query_status() {
            Ok(report) => Ok(report),
            Err(e) => {
                if kill_on_error {
                    warn!(ident = %self.ident, "unresponsive player killed");
                    self.force_kill();
                }
                Err(e)
            }
        }
    }

    fn set_position(&mut self, rect: Rect) -> Result<(), SessionError> {
        self.control.call(&ControlMethod::VideoPos(rect))?;
        Ok(())
    }

    fn set_position_detached(&self, rect: Rect) {
        let control = self.control.clone();
        thread::spawn(move || {
            if let Err(e) = control.call(&ControlMethod::VideoPos(rect)) {
                debug!(dest = %control.dest(), "detached reposition failed: {}", e);
            }
        });
    }

    fn show(&mut self, rect: Rect) -> Result<(), SessionError> {
        self.set_position(rect)
    }

    fn hide(&mut self, offscreen: Rect) -> Result<(), SessionError> {
        self.set_position(offscreen)
    }

    fn set_volume(&mut self, percent: u32) -> Result<(), SessionError> {
        self.control
            .call(&ControlMethod::Volume(f64::from(percent) / 100.0))?;
        Ok(())
    }

    fn stop(&mut self) {
        // An exclusive player has no idle state; releasing it means
        // terminating the process.
        if let Some(pid) = self.pid.take() {
            kill_process(pid, false);
            self.table.lock().remove(pid);
        }
    }

    fn force_kill(&mut self) {
        if let Some(pid) = self.pid.take() {
            kill_process(pid, true);
            self.table.lock().remove(pid);
        }
    }

    fn audio_enabled(&self) -> bool {
        self.audio
    }
}

/// State shared by every [`SharedSession`] on the same display: the one
/// live player process and what it currently renders.
#[derive(Debug, Default)]
pub struct SharedSlot {
    pub pid: Option<u32>,
    pub active_url: Option<String>,
    /// Bus destination, derived from the pid.
    pub ident: String,
    /// Launch argument the player carries on its command line; unlike the
    /// bus name this is visible to a process-table scan.
    pub signature: String,
}

/// Bus destination of a shared player. vlc registers itself under its
/// own pid.
pub(crate) fn shared_dest(pid: u32) -> String {
    format!("org.mpris.MediaPlayer2.vlc.instance{}", pid)
}

/// Session over a display-wide player process that plays one fullscreen
/// URL at a time.
///
/// Many windows can hold a `SharedSession` onto the same slot; showing one
/// hijacks the process away from whichever URL it played before.
pub struct SharedSession {
    control: ControlChannel,
    url: String,
    printable_url: String,
    audio: bool,
    volume: u32,
    slot: Arc<Mutex<SharedSlot>>,
    table: Arc<Mutex<ProcessTable>>,
}

impl SharedSession {
    pub fn new(
        control: ControlChannel,
        url: String,
        printable_url: String,
        audio: bool,
        volume: u32,
        slot: Arc<Mutex<SharedSlot>>,
        table: Arc<Mutex<ProcessTable>>,
    ) -> Self {
        Self {
            control,
            url,
            printable_url,
            audio,
            volume,
            slot,
            table,
        }
    }

    fn owns_playback(&self) -> bool {
        self.slot.lock().active_url.as_deref() == Some(self.url.as_str())
    }
}

impl PlayerSession for SharedSession {
    fn kind(&self) -> SessionKind {
        SessionKind::Shared
    }

    fn pid(&self) -> Option<u32> {
        self.slot.lock().pid
    }

    fn resolve_pid(&mut self) -> Option<u32> {
        let mut slot = self.slot.lock();
        if slot.pid.is_none() && !slot.signature.is_empty() {
            let mut table = self.table.lock();
            if table.find_by_signature(&slot.signature).is_none() {
                table.refresh();
            }
            if let Some(pid) = table.find_by_signature(&slot.signature) {
                // The bus name is derived from the pid, so recovering
                // the process also restores the control destination for
                // sessions created after this point.
                slot.pid = Some(pid);
                slot.ident = shared_dest(pid);
            }
        }
        slot.pid
    }

    fn query_status(&mut self, kill_on_error: bool) -> Result<StatusReport, SessionError> {
        match self.control.query_status() {
            Ok(report) => Ok(report),
            Err(e) => {
                if kill_on_error {
                    warn!(url = %self.printable_url, "unresponsive shared player killed");
                    self.force_kill();
                }
                Err(e)
            }
        }
    }

    fn set_position(&mut self, _rect: Rect) -> Result<(), SessionError> {
        // Shared players render fullscreen only.
        Ok(())
    }

    fn set_position_detached(&self, _rect: Rect) {}

    fn show(&mut self, _rect: Rect) -> Result<(), SessionError> {
        {
            let slot = self.slot.lock();
            if slot.active_url.as_deref() == Some(self.url.as_str()) {
                return Ok(());
            }
        }

        debug!(url = %self.printable_url, "shared player pointed at new url");
        self.control.call(&ControlMethod::OpenUri(self.url.clone()))?;

        let volume = if self.audio { self.volume } else { 0 };
        self.control
            .call(&ControlMethod::Volume(f64::from(volume) / 100.0))?;

        self.slot.lock().active_url = Some(self.url.clone());
        Ok(())
    }

    fn hide(&mut self, _offscreen: Rect) -> Result<(), SessionError> {
        if !self.owns_playback() {
            return Ok(());
        }

        self.control.call(&ControlMethod::Stop)?;
        self.slot.lock().active_url = None;
        Ok(())
    }

    fn set_volume(&mut self, percent: u32) -> Result<(), SessionError> {
        self.volume = percent;
        if self.owns_playback() {
            self.control
                .call(&ControlMethod::Volume(f64::from(percent) / 100.0))?;
        }
        Ok(())
    }

    fn stop(&mut self) {
        // The process idles for reuse by the next window on this display.
        if self.owns_playback() {
            if let Err(e) = self.control.call(&ControlMethod::Stop) {
                debug!(url = %self.printable_url, "idle request failed: {}", e);
            }
            self.slot.lock().active_url = None;
        }
    }

    fn force_kill(&mut self) {
        let mut slot = self.slot.lock();
        if let Some(pid) = slot.pid.take() {
            kill_process(pid, true);
            self.table.lock().remove(pid);
        }
        slot.active_url = None;
    }

    fn audio_enabled(&self) -> bool {
        self.audio
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ProcessRecord;

    fn table_with(pid: u32, cmdline: &str) -> Arc<Mutex<ProcessTable>> {
        let mut table = ProcessTable::new();
        table.insert(ProcessRecord {
            pid,
            cmdline: cmdline.to_string(),
        });
        Arc::new(Mutex::new(table))
    }

    #[test]
    fn test_exclusive_pid_resolved_from_command_line() {
        let ident = "org.mpris.MediaPlayer2.wallplayer_d00_s00_w00".to_string();
        let table = table_with(
            2770,
            "/usr/bin/omxplayer.bin --no-keys \
             --dbus_name org.mpris.MediaPlayer2.wallplayer_d00_s00_w00 rtsp://cam/1",
        );
        let control = ControlChannel::new(ident.clone(), 1000, 1);
        let mut session = ExclusiveSession::new(control, ident, None, false, table);

        // The wrapper script's spawn pid is never trusted; only the
        // player binary's own process counts.
        assert_eq!(session.pid(), None);
        assert_eq!(session.resolve_pid(), Some(2770));
        assert_eq!(session.pid(), Some(2770));
    }

    #[test]
    fn test_shared_pid_recovered_by_launch_marker() {
        let table = table_with(
            321,
            "/usr/bin/vlc --control dbus --video-title wallplayer_shared_d00 --fullscreen",
        );
        let slot = Arc::new(Mutex::new(SharedSlot {
            pid: None,
            active_url: None,
            ident: String::new(),
            signature: "wallplayer_shared_d00".to_string(),
        }));
        let control = ControlChannel::new("org.mpris.MediaPlayer2.vlc".to_string(), 1000, 1);
        let mut session = SharedSession::new(
            control,
            "rtsp://cam/1".to_string(),
            "rtsp://cam/1".to_string(),
            false,
            100,
            Arc::clone(&slot),
            table,
        );

        assert_eq!(session.resolve_pid(), Some(321));
        let slot = slot.lock();
        assert_eq!(slot.pid, Some(321));
        assert_eq!(slot.ident, "org.mpris.MediaPlayer2.vlc.instance321");
    }
}
