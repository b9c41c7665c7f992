//! One grid cell and its stream lifecycle state machine.
//!
//! A window moves NONE -> INIT1 -> INIT2 -> PLAYING and can fall to
//! BROKEN from any started state; `stop` returns it to NONE. Status is
//! resolved by polling because control-channel round trips are slow; the
//! per-state recheck intervals keep that well under one call per second
//! per window.

use std::collections::HashMap;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use wallplayer_config::AudioMode;
use wallplayer_player::{LaunchRequest, PlaybackStatus, PlayerSession, Rect, SessionKind};
use wallplayer_probe::StreamDescriptor;

use crate::context::WallContext;
use crate::selection;

/// Horizontal shift that parks an exclusive player outside the visible
/// area.
pub const OFFSCREEN_OFFSET: i32 = 10_000;

/// INIT1 never resolves the pid before this grace period; the player
/// needs a moment to register itself.
const INIT_GRACE: Duration = Duration::from_secs(1);

/// Status recheck interval once the stream is confirmed playing.
const PLAYING_RECHECK: Duration = Duration::from_secs(10);

/// Status recheck interval while waiting for first playback.
const INIT2_RECHECK: Duration = Duration::from_secs(1);

/// Pause between stop and restart on a quality switch; the decoder needs
/// a moment to release its buffers.
const QUALITY_SETTLE: Duration = Duration::from_millis(100);

/// Stream lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayState {
    /// No active stream.
    None,

    /// Session launched, process not yet seen.
    Init1,

    /// Process up, playback not yet confirmed.
    Init2,

    /// Playback confirmed healthy.
    Playing,

    /// Playback lost; the watchdog will refresh.
    Broken,
}

/// One grid cell: candidate streams, at most one active session.
pub struct Window {
    display: usize,
    screen: usize,
    pub index: usize,
    name: Option<String>,
    candidates: Vec<StreamDescriptor>,
    rect: Rect,
    native_fullscreen: bool,
    grid_indices: HashMap<usize, Vec<usize>>,
    force_udp: bool,
    subtitle_file: Option<PathBuf>,

    playstate: PlayState,
    active_stream: Option<usize>,
    visible: bool,
    fullscreen: bool,
    session: Option<Box<dyn PlayerSession>>,
    charged_weight: u64,
    started_at: Option<Instant>,
    last_check: Option<Instant>,
    last_healthy: Option<Instant>,
    last_duration: Option<i64>,
}

impl Window {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        display: usize,
        screen: usize,
        index: usize,
        rect: Rect,
        native_fullscreen: bool,
        grid_indices: HashMap<usize, Vec<usize>>,
        candidates: Vec<StreamDescriptor>,
        name: Option<String>,
        force_udp: bool,
        subtitle_file: Option<PathBuf>,
    ) -> Self {
        Self {
            display,
            screen,
            index,
            name,
            candidates,
            rect,
            native_fullscreen,
            grid_indices,
            force_udp,
            subtitle_file,
            playstate: PlayState::None,
            active_stream: None,
            visible: false,
            fullscreen: false,
            session: None,
            charged_weight: 0,
            started_at: None,
            last_check: None,
            last_healthy: None,
            last_duration: None,
        }
    }

    pub fn playstate(&self) -> PlayState {
        self.playstate
    }

    pub fn active_stream(&self) -> Option<&StreamDescriptor> {
        self.active_stream.map(|i| &self.candidates[i])
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn charged_weight(&self) -> u64 {
        self.charged_weight
    }

    pub fn started_at(&self) -> Option<Instant> {
        self.started_at
    }

    pub fn session_pid(&self) -> Option<u32> {
        self.session.as_ref().and_then(|s| s.pid())
    }

    /// Base-grid cells this window covers in the given base grid.
    pub fn grid_indices(&self, grid: usize) -> &[usize] {
        self.grid_indices.get(&grid).map_or(&[], Vec::as_slice)
    }

    /// The candidate the configured policy would pick for this window's
    /// own geometry.
    pub fn default_candidate(&self, ctx: &WallContext) -> Option<&StreamDescriptor> {
        let windowed = !self.native_fullscreen;
        let target_height = self.target_height(ctx, windowed);
        selection::default_stream(&self.candidates, windowed, target_height, ctx.settings.quality)
            .map(|i| &self.candidates[i])
    }

    /// Is the active stream above the default grid quality? Such streams
    /// are stopped rather than parked when they leave the screen.
    pub fn above_default_quality(&self, ctx: &WallContext) -> bool {
        let Some(active) = self.active_stream else {
            return false;
        };
        match self.default_candidate(ctx) {
            Some(default) => self.candidates[active].quality > default.quality,
            None => false,
        }
    }

    fn target_height(&self, ctx: &WallContext, windowed: bool) -> u32 {
        if windowed {
            self.rect.height()
        } else {
            ctx.settings.virtual_height()
        }
    }

    fn wants_audio(&self, ctx: &WallContext, fullscreen: bool, has_audio: bool) -> bool {
        has_audio && fullscreen && ctx.settings.audio_mode == AudioMode::Fullscreen
    }

    /// Start playback. No-op unless NONE. Returns false when no candidate
    /// is playable, the decode budget refuses the stream, or the launch
    /// fails; the window stays NONE in all three cases.
    pub fn start(
        &mut self,
        ctx: &mut WallContext,
        now: Instant,
        visible: bool,
        force_fullscreen: bool,
        force_quality: Option<usize>,
    ) -> bool {
        if self.playstate != PlayState::None {
            return false;
        }

        let fullscreen = self.native_fullscreen || force_fullscreen;
        let windowed = !fullscreen;
        let target_height = self.target_height(ctx, windowed);

        let selected = force_quality
            .filter(|&i| i < self.candidates.len() && self.candidates[i].playable(windowed))
            .or_else(|| {
                selection::default_stream(
                    &self.candidates,
                    windowed,
                    target_height,
                    ctx.settings.quality,
                )
            });

        let Some(selected) = selected else {
            debug!(
                display = self.display,
                window = self.index,
                "no playable candidate"
            );
            return false;
        };

        let stream = &self.candidates[selected];
        if !ctx.can_admit(stream.weight, 1) {
            warn!(
                display = self.display,
                window = self.index,
                url = %stream.printable_url(),
                weight = stream.weight,
                "start refused, decode budget exhausted"
            );
            return false;
        }

        // An offscreen launch starts muted; audio follows visibility.
        let audio = visible && self.wants_audio(ctx, fullscreen, stream.has_audio);
        let kind = if stream.valid_windowed {
            SessionKind::Exclusive
        } else {
            SessionKind::Shared
        };
        let launch_rect = if visible {
            self.rect
        } else {
            self.rect.offset_x(OFFSCREEN_OFFSET)
        };

        let request = LaunchRequest {
            url: stream.url.clone(),
            printable_url: stream.printable_url(),
            kind,
            rect: launch_rect,
            screen_rect: ctx.screen_rect(),
            fullscreen,
            visible,
            audio,
            audio_volume: ctx.settings.audio_volume,
            subtitle_file: self.subtitle_file.clone(),
            force_udp: stream.force_udp || self.force_udp,
            loop_file: stream.url.starts_with("file://"),
            buffer_ms: ctx.settings.buffer_ms,
            control_timeout_ms: ctx.settings.control_timeout_ms,
            control_retries: ctx.settings.control_retries,
            display: self.display,
            screen: self.screen,
            window: self.index,
        };

        let weight = stream.weight;
        let printable = stream.printable_url();

        match ctx.launch(request) {
            Ok(mut session) => {
                if visible && session.supports_idle() {
                    // Idle-capable players need an explicit play command.
                    let target = if fullscreen { ctx.screen_rect() } else { self.rect };
                    if let Err(e) = session.show(target) {
                        warn!(window = self.index, "initial play failed: {}", e);
                    }
                }

                ctx.charge(weight);
                self.charged_weight = weight;
                self.session = Some(session);
                self.active_stream = Some(selected);
                self.playstate = PlayState::Init1;
                self.visible = visible;
                self.fullscreen = fullscreen;
                self.started_at = Some(now);
                self.last_check = None;
                self.last_healthy = Some(now);
                self.last_duration = None;

                info!(
                    display = self.display,
                    window = self.index,
                    name = self.name.as_deref().unwrap_or(""),
                    url = %printable,
                    visible,
                    "stream started"
                );
                true
            }
            Err(e) => {
                warn!(
                    display = self.display,
                    window = self.index,
                    url = %printable,
                    "player launch failed: {}",
                    e
                );
                false
            }
        }
    }

    /// Release the session and return to NONE.
    pub fn stop(&mut self, ctx: &mut WallContext) {
        if self.playstate == PlayState::None {
            return;
        }

        if let Some(mut session) = self.session.take() {
            session.stop();
        }

        ctx.release(self.charged_weight);
        self.charged_weight = 0;
        self.active_stream = None;
        self.playstate = PlayState::None;
        self.visible = false;
        self.fullscreen = false;
        self.started_at = None;
        self.last_check = None;
        self.last_healthy = None;
        self.last_duration = None;
    }

    /// Stop and restart with the same stream selection.
    pub fn refresh(&mut self, ctx: &mut WallContext, now: Instant) -> bool {
        if self.playstate == PlayState::None {
            return false;
        }

        let stream = self.active_stream;
        let visible = self.visible;
        let fullscreen = self.fullscreen && !self.native_fullscreen;

        self.stop(ctx);
        self.start(ctx, now, visible, fullscreen, stream)
    }

    pub fn switch_quality_up(
        &mut self,
        ctx: &mut WallContext,
        now: Instant,
        check_only: bool,
        limit_default: bool,
    ) -> bool {
        self.switch_quality(ctx, now, check_only, limit_default, true)
    }

    pub fn switch_quality_down(
        &mut self,
        ctx: &mut WallContext,
        now: Instant,
        check_only: bool,
        limit_default: bool,
    ) -> bool {
        self.switch_quality(ctx, now, check_only, limit_default, false)
    }

    /// Restart with the next higher/lower distinct-quality candidate.
    /// Returns false without any state change when already at the extreme
    /// (or at the default, when limiting).
    fn switch_quality(
        &mut self,
        ctx: &mut WallContext,
        now: Instant,
        check_only: bool,
        limit_default: bool,
        up: bool,
    ) -> bool {
        let Some(active) = self.active_stream else {
            return false;
        };

        let windowed = !self.fullscreen;
        let current = self.candidates[active].quality;

        let cap = if limit_default {
            self.default_candidate(ctx).map(|s| s.quality)
        } else {
            None
        };

        let eligible: Vec<(usize, u64)> = self
            .candidates
            .iter()
            .enumerate()
            .filter(|(_, s)| s.playable(windowed))
            .filter(|(_, s)| if up { s.quality > current } else { s.quality < current })
            .filter(|(_, s)| {
                cap.map_or(true, |c| if up { s.quality <= c } else { s.quality >= c })
            })
            .map(|(i, s)| (i, s.quality))
            .collect();

        let next = if up {
            eligible.iter().min_by_key(|(_, q)| *q)
        } else {
            eligible.iter().max_by_key(|(_, q)| *q)
        };

        let Some(&(next_idx, _)) = next else {
            return false;
        };

        if check_only {
            return true;
        }

        let visible = self.visible;
        let fullscreen = self.fullscreen && !self.native_fullscreen;

        self.stop(ctx);
        thread::sleep(QUALITY_SETTLE);
        self.start(ctx, now, visible, fullscreen, Some(next_idx))
    }

    /// Bring a running session on-screen. Recreates the session when the
    /// desired audio state differs from the launched one and the session
    /// kind cannot toggle audio live.
    pub fn set_visible(&mut self, ctx: &mut WallContext, now: Instant) {
        if self.playstate == PlayState::None {
            self.visible = true;
            return;
        }

        self.visible = true;
        let fullscreen = self.fullscreen;
        let has_audio = self
            .active_stream
            .map(|i| self.candidates[i].has_audio)
            .unwrap_or(false);
        let desired_audio = self.wants_audio(ctx, fullscreen, has_audio);

        let needs_restart = self
            .session
            .as_ref()
            .is_some_and(|s| !s.supports_idle() && s.audio_enabled() != desired_audio);

        if needs_restart {
            let stream = self.active_stream;
            let fs = fullscreen && !self.native_fullscreen;
            self.stop(ctx);
            self.start(ctx, now, true, fs, stream);
            return;
        }

        let target = if fullscreen { ctx.screen_rect() } else { self.rect };
        if let Some(session) = &mut self.session {
            // Idle-capable sessions toggle audio live instead of
            // restarting.
            if session.supports_idle() && session.audio_enabled() != desired_audio {
                let volume = if desired_audio { ctx.settings.audio_volume } else { 0 };
                if let Err(e) = session.set_volume(volume) {
                    debug!(window = self.index, "volume change failed: {}", e);
                }
            }
            if let Err(e) = session.show(target) {
                warn!(window = self.index, "show failed: {}", e);
            }
        }
    }

    /// Take the session off-screen without discarding it; the charged
    /// weight is retained. With `detached` the reposition command is
    /// issued from a worker thread so a slow control channel cannot stall
    /// the tick.
    pub fn set_invisible(&mut self, detached: bool) {
        self.visible = false;
        if self.playstate == PlayState::None {
            return;
        }

        let offscreen = self.rect.offset_x(OFFSCREEN_OFFSET);
        if let Some(session) = &mut self.session {
            if session.supports_idle() {
                if let Err(e) = session.hide(offscreen) {
                    debug!(window = self.index, "idle request failed: {}", e);
                }
            } else if detached {
                session.set_position_detached(offscreen);
            } else if let Err(e) = session.hide(offscreen) {
                debug!(window = self.index, "hide failed: {}", e);
            }
        }
    }

    /// Advance the state machine by one poll. Throttled per state; never
    /// mutates anything when the window is NONE or already BROKEN.
    pub fn poll(&mut self, ctx: &WallContext, now: Instant) {
        match self.playstate {
            PlayState::None | PlayState::Broken => {}
            PlayState::Init1 => self.poll_init(ctx, now),
            PlayState::Init2 | PlayState::Playing => self.poll_liveness(ctx, now),
        }
    }

    fn poll_init(&mut self, ctx: &WallContext, now: Instant) {
        let Some(started) = self.started_at else {
            return;
        };
        if now.duration_since(started) < INIT_GRACE {
            return;
        }

        let Some(session) = self.session.as_mut() else {
            return;
        };

        if session.resolve_pid().is_some() {
            debug!(
                display = self.display,
                window = self.index,
                "player process up"
            );
            self.playstate = PlayState::Init2;
            self.last_healthy = Some(now);
            return;
        }

        if now.duration_since(started) > Duration::from_millis(ctx.settings.init_timeout_ms) {
            warn!(
                display = self.display,
                window = self.index,
                "player process never appeared"
            );
            self.playstate = PlayState::Broken;
        }
    }

    fn poll_liveness(&mut self, ctx: &WallContext, now: Instant) {
        let interval = if self.playstate == PlayState::Playing {
            PLAYING_RECHECK
        } else {
            INIT2_RECHECK
        };
        if let Some(last) = self.last_check {
            if now.duration_since(last) < interval {
                return;
            }
        }
        self.last_check = Some(now);

        let Some(session) = self.session.as_mut() else {
            return;
        };

        // A deliberately idle session reports stopped; that is healthy.
        if !self.visible && session.supports_idle() {
            self.last_healthy = Some(now);
            return;
        }

        let timeout = Duration::from_secs(ctx.settings.play_timeout_secs);
        let stale = self
            .last_healthy
            .map_or(true, |t| now.duration_since(t) > timeout);

        match session.query_status(stale) {
            Ok(report) => {
                // Continuous streams may report a stale status while the
                // position counter keeps advancing.
                let advancing = match (report.duration, self.last_duration) {
                    (Some(d), Some(prev)) => d != prev,
                    (Some(_), None) => true,
                    _ => false,
                };
                if report.duration.is_some() {
                    self.last_duration = report.duration;
                }

                if report.status == PlaybackStatus::Playing || advancing {
                    if self.playstate != PlayState::Playing {
                        info!(
                            display = self.display,
                            window = self.index,
                            "stream playing"
                        );
                    }
                    self.playstate = PlayState::Playing;
                    self.last_healthy = Some(now);
                } else if stale {
                    warn!(
                        display = self.display,
                        window = self.index,
                        "stream stalled, marking broken"
                    );
                    self.playstate = PlayState::Broken;
                }
            }
            Err(_) => {
                if stale {
                    self.playstate = PlayState::Broken;
                }
            }
        }
    }
}
