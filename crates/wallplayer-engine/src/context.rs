//! The shared world state every component operates against.

use tracing::debug;

use wallplayer_config::Settings;
use wallplayer_overlay::OverlayService;
use wallplayer_player::{LaunchRequest, PlayerSession, Rect, SessionError, SessionLauncher};

/// Owns the charged decode-weight counter, the hardware limits, the
/// session launcher and the overlay handle.
///
/// The counter is mutated only in matched [`charge`](Self::charge) /
/// [`release`](Self::release) pairs driven by window start/stop; the
/// single-threaded tick loop makes that symmetry sufficient.
pub struct WallContext {
    pub settings: Settings,
    pub overlay: Box<dyn OverlayService>,
    launcher: Box<dyn SessionLauncher>,
    charged_weight: u64,
    active_sessions: usize,
}

impl WallContext {
    pub fn new(
        settings: Settings,
        launcher: Box<dyn SessionLauncher>,
        overlay: Box<dyn OverlayService>,
    ) -> Self {
        Self {
            settings,
            overlay,
            launcher,
            charged_weight: 0,
            active_sessions: 0,
        }
    }

    /// Would `sessions` more sessions of `weight` total decode cost fit
    /// under the ceilings?
    pub fn can_admit(&self, weight: u64, sessions: usize) -> bool {
        if self.active_sessions + sessions > self.settings.max_sessions {
            return false;
        }

        if self.settings.hardware_check
            && self.charged_weight + weight > self.settings.max_decode_weight
        {
            return false;
        }

        true
    }

    /// Charge one session's decode weight. Call only after a successful
    /// launch.
    pub fn charge(&mut self, weight: u64) {
        self.charged_weight += weight;
        self.active_sessions += 1;
        debug!(
            charged = self.charged_weight,
            sessions = self.active_sessions,
            "decode weight charged"
        );
    }

    /// Release one session's decode weight. Call exactly once per charge.
    pub fn release(&mut self, weight: u64) {
        self.charged_weight = self.charged_weight.saturating_sub(weight);
        self.active_sessions = self.active_sessions.saturating_sub(1);
    }

    pub fn charged_weight(&self) -> u64 {
        self.charged_weight
    }

    pub fn session_count(&self) -> usize {
        self.active_sessions
    }

    pub fn launch(
        &mut self,
        request: LaunchRequest,
    ) -> Result<Box<dyn PlayerSession>, SessionError> {
        self.launcher.launch(request)
    }

    /// Process-level access for the watchdog.
    pub fn launcher_mut(&mut self) -> &mut dyn SessionLauncher {
        self.launcher.as_mut()
    }

    /// Full virtual-screen rectangle (overscan-adjusted).
    pub fn screen_rect(&self) -> Rect {
        let x = self.settings.offset_x() as i32;
        let y = self.settings.offset_y() as i32;
        Rect::new(
            x,
            y,
            x + self.settings.virtual_width() as i32,
            y + self.settings.virtual_height() as i32,
        )
    }
}
