//! The rotation scheduler.
//!
//! One cooperative tick (~100 ms from the binary) drives every display:
//! poll window state machines, execute at most one pending user action,
//! rotate screens under admission control, and run the watchdog. Each
//! tick performs at most one state-changing action per display and
//! returns, which serializes rotations and changeovers without locks.

use std::collections::{BTreeMap, HashSet};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::Sender;
use tracing::{debug, info, warn};

use wallplayer_config::{Changeover, WallConfig};
use wallplayer_ipc::{Action, EngineEvent};
use wallplayer_overlay::{Icon, OverlayService};
use wallplayer_player::SessionLauncher;
use wallplayer_probe::StreamDescriptor;

use crate::context::WallContext;
use crate::display::Display;
use crate::error::EngineError;
use crate::screen::Screen;
use crate::window::PlayState;

/// Smooth changeover: how long old and new cells stay visible together.
const HOLD_SMOOTH: Duration = Duration::from_millis(500);

/// Plain pre-buffer changeover: gap between hiding old and showing new.
const HOLD_PLAIN: Duration = Duration::from_millis(50);

/// Hard changeover: settle time between stopping and starting screens.
const HOLD_HARD: Duration = Duration::from_millis(250);

/// How long action feedback icons stay up.
const ICON_TIME: Duration = Duration::from_secs(2);

/// How long the control-focus icon stays up.
const CONTROL_ICON_TIME: Duration = Duration::from_secs(5);

/// The watchdog stays out of the way this close to a due rotation.
const WATCHDOG_HOLDOFF: Duration = Duration::from_secs(10);

/// Scheduler over all displays of the wall.
pub struct ScreenManager {
    ctx: WallContext,
    displays: Vec<Display>,
    focused: usize,
    events: Sender<EngineEvent>,
}

impl ScreenManager {
    /// Build displays, screens and windows from the resolved
    /// configuration. `candidates[s][w]` holds the probed descriptors for
    /// window `w` of configured screen `s`.
    pub fn new(
        config: &WallConfig,
        candidates: Vec<Vec<Vec<StreamDescriptor>>>,
        launcher: Box<dyn SessionLauncher>,
        overlay: Box<dyn OverlayService>,
        events: Sender<EngineEvent>,
    ) -> Result<Self, EngineError> {
        let mut per_display: BTreeMap<usize, Vec<Screen>> = BTreeMap::new();

        for (screen_cfg, streams) in config.screens.iter().zip(candidates) {
            let screens = per_display.entry(screen_cfg.display).or_default();
            let index = screens.len();
            screens.push(Screen::new(
                screen_cfg.display,
                index,
                screen_cfg,
                streams,
                &config.settings,
            ));
        }

        if per_display.is_empty() {
            return Err(EngineError::NoDisplays);
        }

        let displays: Vec<Display> = per_display
            .into_iter()
            .map(|(index, screens)| Display::new(index, screens))
            .collect();

        info!(displays = displays.len(), "engine ready");
        let _ = events.try_send(EngineEvent::Ready);

        Ok(Self {
            ctx: WallContext::new(config.settings.clone(), launcher, overlay),
            displays,
            focused: 0,
            events,
        })
    }

    pub fn displays(&self) -> &[Display] {
        &self.displays
    }

    pub fn context(&self) -> &WallContext {
        &self.ctx
    }

    /// Queue a user action for the focused display. The slot holds one
    /// action; a second submission is rejected, not queued.
    pub fn submit(&mut self, action: Action) {
        let display = &mut self.displays[self.focused];
        if display.pending.is_some() {
            warn!(?action, "action dropped, another action is pending");
            let _ = self.events.try_send(EngineEvent::ActionRejected);
        } else {
            display.pending = Some(action);
        }
    }

    /// One scheduler pass over every display.
    pub fn tick(&mut self, now: Instant) {
        for d in 0..self.displays.len() {
            self.tick_display(d, now);
        }
    }

    fn tick_display(&mut self, d: usize, now: Instant) {
        if self.displays[d].active.is_none() {
            self.activate_first(d, now);
            return;
        }

        self.expire_icon(d, now);

        {
            let Self { ctx, displays, .. } = self;
            let display = &mut displays[d];
            for idx in [display.active, display.next].into_iter().flatten() {
                display.screens[idx].monitor(ctx, now);
            }
            // Never act on an incompletely initialized screen.
            if display.any_init1() {
                return;
            }
        }

        if let Some(action) = self.displays[d].pending.take() {
            self.execute_action(d, action, now);
            return;
        }

        let acted = if self.is_rotating(d) {
            self.tick_rotation(d, now)
        } else {
            self.tick_static(d, now)
        };
        if acted {
            return;
        }

        self.watchdog(d, now);
    }

    fn is_rotating(&self, d: usize) -> bool {
        let display = &self.displays[d];
        !display.paused
            && display.single_window.is_none()
            && display.screens.len() > 1
            && display
                .active
                .is_some_and(|a| display.screens[a].display_time > 0)
    }

    fn activate_first(&mut self, d: usize, now: Instant) {
        let Self {
            ctx,
            displays,
            events,
            ..
        } = self;
        let display = &mut displays[d];

        let background = display.screens[0].layout.background_image();
        ctx.overlay.show_background(display.index, background);
        display.screens[0].start_all(ctx, now, true);
        display.active = Some(0);
        display.last_rotation = Some(now);

        let dindex = display.index;
        info!(display = dindex, "first screen started");
        let _ = events.try_send(EngineEvent::ScreenActivated {
            display: display.index,
            screen: 0,
        });
    }

    /// Automatic rotation. Returns true when a state-changing step ran.
    fn tick_rotation(&mut self, d: usize, now: Instant) -> bool {
        let Self {
            ctx,
            displays,
            events,
            ..
        } = self;
        let display = &mut displays[d];
        let Some(active) = display.active else {
            return false;
        };

        let display_time = Duration::from_secs(display.screens[active].display_time);
        let elapsed = display
            .last_rotation
            .map_or(Duration::ZERO, |t| now.duration_since(t));
        let next_idx = (active + 1) % display.screens.len();

        if elapsed >= display_time {
            if display.next == Some(next_idx) {
                let smooth = ctx.settings.changeover == Changeover::PrebufferSmooth;
                Self::changeover(ctx, events, display, active, next_idx, now, smooth);
            } else {
                Self::hard_rotate(ctx, events, display, active, next_idx, now);
            }
            return true;
        }

        if ctx.settings.changeover != Changeover::Normal && display.next.is_none() {
            let (sessions, weight) = display.screens[next_idx].demand(ctx);
            if !ctx.can_admit(weight, sessions) {
                // Pre-buffering would cross a ceiling; the rotation falls
                // back to a hard changeover when the time comes.
                return false;
            }

            let preroll =
                display_time.saturating_sub(Duration::from_secs(ctx.settings.play_timeout_secs));
            if elapsed >= preroll {
                let dindex = display.index;
                info!(
                    display = dindex,
                    screen = next_idx,
                    "pre-buffering next screen"
                );
                display.screens[next_idx].start_all(ctx, now, false);
                display.next = Some(next_idx);
                return true;
            }
        }

        false
    }

    /// Serial screen swap: stop everything old, settle, start everything
    /// new. Used for normal-mode rotation, manual switching and whenever
    /// admission control rules out concurrent screens.
    fn hard_rotate(
        ctx: &mut WallContext,
        events: &Sender<EngineEvent>,
        display: &mut Display,
        from: usize,
        to: usize,
        now: Instant,
    ) {
        if let Some(buffering) = display.next.take() {
            if buffering != from {
                display.screens[buffering].stop_all(ctx);
            }
        }

        let active_ms = display
            .last_rotation
            .map_or(0, |t| now.duration_since(t).as_millis() as u64);

        display.screens[from].stop_all(ctx);
        ctx.overlay
            .show_background(display.index, display.screens[to].layout.background_image());
        thread::sleep(HOLD_HARD);
        display.screens[to].start_all(ctx, now, true);

        display.previous = Some(from);
        display.active = Some(to);
        display.last_rotation = Some(now);

        let dindex = display.index;
        info!(display = dindex, from, to, active_ms, "screen switched");
        let _ = events.try_send(EngineEvent::RotationCompleted {
            display: display.index,
            from,
            to,
            active_ms,
        });
    }

    /// Handover from a running screen to a pre-buffered one.
    #[allow(clippy::too_many_arguments)]
    fn changeover(
        ctx: &mut WallContext,
        events: &Sender<EngineEvent>,
        display: &mut Display,
        p_idx: usize,
        n_idx: usize,
        now: Instant,
        smooth: bool,
    ) {
        let dindex = display.index;
        let common = display.screens[p_idx]
            .layout
            .grid_sizes()
            .iter()
            .copied()
            .find(|g| display.screens[n_idx].layout.grid_sizes().contains(g));

        let background = display.screens[n_idx].layout.background_image();
        ctx.overlay.show_background(dindex, background);

        {
            let (p, n) = two_screens(&mut display.screens, p_idx, n_idx);

            match common {
                None => {
                    // Mismatched base grids make a gradual handover
                    // visually incoherent; swap in one step.
                    for window in &mut p.windows {
                        window.set_invisible(true);
                    }
                    thread::sleep(HOLD_HARD);
                    for window in &mut n.windows {
                        window.set_visible(ctx, now);
                    }
                }
                Some(grid) => {
                    let mut shown: HashSet<usize> = HashSet::new();

                    for pi in 0..p.windows.len() {
                        let old_cells: HashSet<usize> =
                            p.windows[pi].grid_indices(grid).iter().copied().collect();
                        if old_cells.is_empty() {
                            continue;
                        }

                        // New windows taking over any of the old cells;
                        // handled as one unit so large-to-small and
                        // small-to-large handovers both work.
                        let overlapping: Vec<usize> = n
                            .windows
                            .iter()
                            .enumerate()
                            .filter(|(_, w)| {
                                w.grid_indices(grid).iter().any(|c| old_cells.contains(c))
                            })
                            .map(|(i, _)| i)
                            .collect();

                        if smooth {
                            for &ni in &overlapping {
                                if shown.insert(ni) {
                                    n.windows[ni].set_visible(ctx, now);
                                }
                            }
                            thread::sleep(HOLD_SMOOTH);
                            p.windows[pi].set_invisible(true);
                        } else {
                            p.windows[pi].set_invisible(false);
                            thread::sleep(HOLD_PLAIN);
                            for &ni in &overlapping {
                                if shown.insert(ni) {
                                    n.windows[ni].set_visible(ctx, now);
                                }
                            }
                        }
                    }

                    for (ni, window) in n.windows.iter_mut().enumerate() {
                        if !shown.contains(&ni) {
                            window.set_visible(ctx, now);
                        }
                    }
                }
            }

            p.stop_all(ctx);
        }

        let active_ms = display
            .last_rotation
            .map_or(0, |t| now.duration_since(t).as_millis() as u64);
        display.previous = Some(p_idx);
        display.active = Some(n_idx);
        display.next = None;
        display.last_rotation = Some(now);

        info!(
            display = dindex,
            from = p_idx,
            to = n_idx,
            active_ms,
            "changeover completed"
        );
        let _ = events.try_send(EngineEvent::RotationCompleted {
            display: dindex,
            from: p_idx,
            to: n_idx,
            active_ms,
        });
    }

    /// Housekeeping while rotation is held (paused, single view, sole
    /// screen, display-time 0). Returns true when a step ran.
    fn tick_static(&mut self, d: usize, now: Instant) -> bool {
        let Self { ctx, displays, .. } = self;
        let display = &mut displays[d];

        // A pre-buffered screen is pointless while rotation is held.
        if let Some(buffering) = display.next.take() {
            let dindex = display.index;
            info!(
                display = dindex,
                "rotation held, discarding pre-buffered screen"
            );
            display.screens[buffering].stop_all(ctx);
            return true;
        }

        // Bound session and subtitle drift on long-running screens.
        if ctx.settings.refresh_minutes == 0 {
            return false;
        }
        let Some(active) = display.active else {
            return false;
        };
        let limit = Duration::from_secs(ctx.settings.refresh_minutes * 60);
        if display.screens[active]
            .max_playtime(now)
            .is_some_and(|p| p > limit)
        {
            let dindex = display.index;
            info!(display = dindex, "periodic refresh of the active screen");
            for window in &mut display.screens[active].windows {
                window.refresh(ctx, now);
            }
            return true;
        }

        false
    }

    /// Orphan reconciliation plus broken-stream recovery.
    fn watchdog(&mut self, d: usize, now: Instant) {
        let interval = Duration::from_secs(self.ctx.settings.watchdog_secs);
        {
            let display = &self.displays[d];
            if display
                .last_watchdog
                .is_some_and(|t| now.duration_since(t) < interval)
            {
                return;
            }

            // Stay out of the way when a screen change is imminent; the
            // changeover would immediately invalidate the process table.
            if self.is_rotating(d) {
                if let (Some(active), Some(last)) = (display.active, display.last_rotation) {
                    let display_time = Duration::from_secs(display.screens[active].display_time);
                    let remaining = display_time.saturating_sub(now.duration_since(last));
                    if remaining < WATCHDOG_HOLDOFF {
                        return;
                    }
                }
            }
        }

        // A player still registering on any display has no claimable pid
        // yet; reaping now would kill it.
        if self.displays.iter().any(|display| display.any_init1()) {
            return;
        }

        self.displays[d].last_watchdog = Some(now);

        // A pid is legitimate if some window on any display claims it, or
        // it belongs to an idling shared player. Everything else leaked
        // from a crash or teardown race.
        let mut expected: HashSet<u32> = self
            .displays
            .iter()
            .flat_map(|display| display.screens.iter())
            .flat_map(|screen| screen.session_pids())
            .collect();
        expected.extend(self.ctx.launcher_mut().idle_pids());

        for pid in self.ctx.launcher_mut().live_pids() {
            if !expected.contains(&pid) {
                warn!(pid, "killing orphaned player process");
                self.ctx.launcher_mut().kill(pid);
                let _ = self.events.try_send(EngineEvent::OrphanKilled { pid });
            }
        }

        let Self {
            ctx,
            displays,
            events,
            ..
        } = self;
        let display = &mut displays[d];
        let Some(active) = display.active else {
            return;
        };
        let dindex = display.index;
        let screen = &mut display.screens[active];

        let mut any_broken = false;
        for wi in 0..screen.windows.len() {
            if screen.windows[wi].playstate() == PlayState::Broken {
                any_broken = true;
                info!(display = dindex, window = wi, "refreshing broken stream");
                if screen.windows[wi].refresh(ctx, now) {
                    let _ = events.try_send(EngineEvent::StreamRecovered {
                        display: dindex,
                        screen: active,
                        window: wi,
                    });
                }
            }
        }

        if any_broken && ctx.settings.icons_enabled {
            ctx.overlay.show_icon(dindex, Icon::Broken);
            display.icon_deadline = Some(now + ICON_TIME);
        }
    }

    fn execute_action(&mut self, d: usize, action: Action, now: Instant) {
        debug!(display = d, ?action, "executing action");
        match action {
            Action::PauseToggle => self.toggle_pause(d, now),
            Action::SwitchNext => self.step(d, now, true),
            Action::SwitchPrev => self.step(d, now, false),
            Action::QualityUp => self.switch_quality(d, now, true),
            Action::QualityDown => self.switch_quality(d, now, false),
            Action::SwitchSingle { window } => self.enter_single_view(d, window, now),
            Action::SwitchGrid => self.leave_single_view(d, now),
            Action::NextDisplay => self.cycle_focus(now),
        }
    }

    fn toggle_pause(&mut self, d: usize, now: Instant) {
        let Self { ctx, displays, .. } = self;
        let display = &mut displays[d];
        display.paused = !display.paused;

        let dindex = display.index;
        let icon = if display.paused {
            info!(display = dindex, "rotation paused");
            Icon::Pause
        } else {
            info!(display = dindex, "rotation resumed");
            display.last_rotation = Some(now);
            Icon::Play
        };

        if ctx.settings.icons_enabled {
            ctx.overlay.show_icon(display.index, icon);
            display.icon_deadline = Some(now + ICON_TIME);
        }
    }

    /// Next/previous: adjacent screen in grid view, adjacent window in
    /// single view.
    fn step(&mut self, d: usize, now: Instant, forward: bool) {
        if self.displays[d].single_window.is_some() {
            let target = {
                let display = &self.displays[d];
                let active = display.active.unwrap_or(0);
                let count = display.screens[active].windows.len();
                let current = display.single_window.unwrap_or(0);
                if forward {
                    (current + 1) % count
                } else {
                    (current + count - 1) % count
                }
            };
            self.enter_single_view(d, Some(target), now);
            return;
        }

        let Self {
            ctx,
            displays,
            events,
            ..
        } = self;
        let display = &mut displays[d];
        let Some(active) = display.active else {
            return;
        };
        let count = display.screens.len();
        if count < 2 {
            debug!("single screen, nothing to switch to");
            return;
        }

        let target = if forward {
            (active + 1) % count
        } else {
            (active + count - 1) % count
        };
        Self::hard_rotate(ctx, events, display, active, target, now);
    }

    fn switch_quality(&mut self, d: usize, now: Instant, up: bool) {
        let Self { ctx, displays, .. } = self;
        let display = &mut displays[d];
        let Some(active) = display.active else {
            return;
        };
        let screen = &mut display.screens[active];

        let mut changed = false;
        if let Some(single) = display.single_window {
            let window = &mut screen.windows[single];
            changed = if up {
                window.switch_quality_up(ctx, now, false, false)
            } else {
                window.switch_quality_down(ctx, now, false, false)
            };
        } else {
            for window in &mut screen.windows {
                changed |= if up {
                    // Grid view never exceeds the default quality.
                    window.switch_quality_up(ctx, now, false, true)
                } else {
                    window.switch_quality_down(ctx, now, false, false)
                };
            }
        }

        if !changed {
            let dindex = display.index;
            debug!(display = dindex, up, "no quality change possible");
        }
    }

    /// Zoom one window of the active screen to fullscreen.
    fn enter_single_view(&mut self, d: usize, window: Option<usize>, now: Instant) {
        let Self { ctx, displays, .. } = self;
        let display = &mut displays[d];
        let Some(active) = display.active else {
            return;
        };
        let screen = &mut display.screens[active];
        let count = screen.windows.len();

        let target = match window {
            Some(w) if w < count => w,
            Some(w) => {
                warn!(window = w, "no such window");
                return;
            }
            None => display.single_window.map_or(0, |w| (w + 1) % count),
        };
        if display.single_window == Some(target) {
            return;
        }

        for (i, win) in screen.windows.iter_mut().enumerate() {
            if i == target {
                continue;
            }
            // Expensive siblings are stopped; default-quality ones just
            // leave the screen and keep their sessions warm.
            if win.above_default_quality(ctx) || win.playstate() == PlayState::Broken {
                win.stop(ctx);
            } else {
                win.set_invisible(true);
            }
        }

        // Restart the chosen window fullscreen so quality reselects for
        // the larger target.
        let zoomed = &mut screen.windows[target];
        zoomed.stop(ctx);
        zoomed.start(ctx, now, true, true, None);

        display.single_window = Some(target);
        let dindex = display.index;
        info!(display = dindex, window = target, "single view");
        if ctx.settings.icons_enabled {
            ctx.overlay.show_icon(display.index, Icon::SingleView);
            display.icon_deadline = Some(now + ICON_TIME);
        }
    }

    /// Restore the grid layout, dropping everything back to default
    /// quality.
    fn leave_single_view(&mut self, d: usize, now: Instant) {
        let Self { ctx, displays, .. } = self;
        let display = &mut displays[d];
        let Some(single) = display.single_window.take() else {
            return;
        };
        let Some(active) = display.active else {
            return;
        };
        let screen = &mut display.screens[active];

        for (i, win) in screen.windows.iter_mut().enumerate() {
            if win.playstate() == PlayState::None {
                win.start(ctx, now, true, false, None);
            } else if i == single || win.above_default_quality(ctx) {
                win.stop(ctx);
                win.start(ctx, now, true, false, None);
            } else {
                win.set_visible(ctx, now);
            }
        }

        display.last_rotation = Some(now);
        let dindex = display.index;
        info!(display = dindex, "grid view");
        if ctx.settings.icons_enabled {
            ctx.overlay.show_icon(display.index, Icon::GridView);
            display.icon_deadline = Some(now + ICON_TIME);
        }
    }

    fn cycle_focus(&mut self, now: Instant) {
        if self.displays.len() < 2 {
            return;
        }

        let old = self.focused;
        self.ctx.overlay.hide_icon(self.displays[old].index);
        self.displays[old].icon_deadline = None;
        self.focused = (self.focused + 1) % self.displays.len();

        let Self {
            ctx,
            displays,
            focused,
            ..
        } = self;
        let display = &mut displays[*focused];
        let dindex = display.index;
        info!(display = dindex, "control focus moved");
        if ctx.settings.icons_enabled {
            ctx.overlay.show_icon(display.index, Icon::Control);
            display.icon_deadline = Some(now + CONTROL_ICON_TIME);
        }
    }

    /// Stop every session and clear the overlays.
    pub fn shutdown(&mut self) {
        for d in 0..self.displays.len() {
            let Self { ctx, displays, .. } = self;
            let display = &mut displays[d];
            for screen in &mut display.screens {
                screen.stop_all(ctx);
            }
            ctx.overlay.clear_background(display.index);
            ctx.overlay.hide_icon(display.index);
        }
        let _ = self.events.try_send(EngineEvent::Shutdown);
        info!("engine stopped");
    }

    fn expire_icon(&mut self, d: usize, now: Instant) {
        let Self { ctx, displays, .. } = self;
        let display = &mut displays[d];
        if display.icon_deadline.is_some_and(|t| now >= t) {
            ctx.overlay.hide_icon(display.index);
            display.icon_deadline = None;
        }
    }
}

fn two_screens(screens: &mut [Screen], p: usize, n: usize) -> (&mut Screen, &mut Screen) {
    debug_assert_ne!(p, n);
    if p < n {
        let (head, tail) = screens.split_at_mut(n);
        (&mut head[p], &mut tail[0])
    } else {
        let (head, tail) = screens.split_at_mut(p);
        (&mut tail[0], &mut head[n])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{at, h264_stream, test_manager, test_settings};

    const ONE_THEN_FOUR: &str = r#"{"screens": [
        {"layout": "1x1", "display_time": 10,
         "windows": [{"urls": ["rtsp://cam/1"]}]},
        {"layout": "2x2", "display_time": 10,
         "windows": [{"urls": ["rtsp://cam/1"]}, {"urls": ["rtsp://cam/1"]},
                     {"urls": ["rtsp://cam/1"]}, {"urls": ["rtsp://cam/1"]}]}
    ]}"#;

    const SINGLE_SCREEN: &str = r#"{"screens": [
        {"layout": "2x2", "display_time": 0,
         "windows": [{"urls": ["rtsp://cam/1"]}, {"urls": ["rtsp://cam/1"]}]}
    ]}"#;

    fn small_stream() -> Vec<wallplayer_probe::StreamDescriptor> {
        vec![h264_stream("rtsp://cam/1", 640, 360, 15)]
    }

    fn charged_sum(manager: &ScreenManager) -> u64 {
        manager
            .displays()
            .iter()
            .flat_map(|d| d.screens.iter())
            .flat_map(|s| s.windows.iter())
            .map(|w| w.charged_weight())
            .sum()
    }

    #[test]
    fn test_bootstrap_starts_first_screen() {
        let (mut manager, state, _rx) =
            test_manager(ONE_THEN_FOUR, test_settings(), &small_stream());

        manager.tick(Instant::now());

        let display = &manager.displays()[0];
        assert_eq!(display.active, Some(0));
        assert_eq!(state.lock().launched.len(), 1);
        assert!(display.screens[0].windows[0].is_visible());
    }

    #[test]
    fn test_prebuffer_rotation_timeline() {
        let mut settings = test_settings();
        settings.changeover = wallplayer_config::Changeover::Prebuffer;
        settings.play_timeout_secs = 3;
        let (mut manager, state, _rx) = test_manager(ONE_THEN_FOUR, settings, &small_stream());
        let base = Instant::now();

        manager.tick(base);
        manager.tick(at(base, 1500)); // pid resolved
        manager.tick(at(base, 2600)); // playback confirmed

        // Before the pre-roll window nothing happens.
        manager.tick(at(base, 6900));
        assert_eq!(manager.displays()[0].next, None);

        // display-time 10 minus play-timeout 3: pre-buffering begins at 7.
        manager.tick(at(base, 7000));
        assert_eq!(manager.displays()[0].next, Some(1));
        assert_eq!(state.lock().launched.len(), 5);
        assert!(manager.displays()[0].screens[1]
            .windows
            .iter()
            .all(|w| !w.is_visible()));

        // Invariant holds with both screens charged.
        assert_eq!(charged_sum(&manager), manager.context().charged_weight());

        manager.tick(at(base, 8200)); // pre-buffered pids resolve

        // At display-time the changeover runs.
        manager.tick(at(base, 10_000));
        let display = &manager.displays()[0];
        assert_eq!(display.active, Some(1));
        assert_eq!(display.next, None);
        assert_eq!(display.previous, Some(0));
        assert_eq!(display.screens[0].active_count(), 0);
        assert!(display.screens[1].windows.iter().all(|w| w.is_visible()));
        assert_eq!(charged_sum(&manager), manager.context().charged_weight());
    }

    #[test]
    fn test_fullscreen_window_resolves_exact_match() {
        let config = r#"{"screens": [
            {"layout": "1x1", "windows": [{"urls": ["rtsp://cam/1"]}]}
        ]}"#;
        let ladder = vec![
            h264_stream("rtsp://cam/low", 640, 360, 15),
            h264_stream("rtsp://cam/high", 1920, 1080, 25),
        ];
        let (mut manager, _state, _rx) = test_manager(config, test_settings(), &ladder);

        manager.tick(Instant::now());

        let window = &manager.displays()[0].screens[0].windows[0];
        assert_eq!(window.active_stream().map(|s| s.height), Some(1080));
    }

    #[test]
    fn test_session_ceiling_forces_hard_changeover() {
        let config = r#"{"screens": [
            {"layout": "1x1", "display_time": 10,
             "windows": [{"urls": ["rtsp://cam/1"]}]},
            {"layout": "2x2", "display_time": 10,
             "windows": [{"urls": ["rtsp://cam/1"]}, {"urls": ["rtsp://cam/1"]}]}
        ]}"#;
        let mut settings = test_settings();
        settings.changeover = wallplayer_config::Changeover::Prebuffer;
        settings.play_timeout_secs = 3;
        settings.max_sessions = 2;
        let (mut manager, state, _rx) = test_manager(config, settings, &small_stream());
        let base = Instant::now();

        manager.tick(base);
        manager.tick(at(base, 1500));

        // Pre-buffering would need 1 + 2 sessions against a ceiling of 2,
        // so it never starts.
        manager.tick(at(base, 7100));
        manager.tick(at(base, 8000));
        assert_eq!(manager.displays()[0].next, None);
        assert_eq!(state.lock().launched.len(), 1);

        // The rotation still happens, as a serial hard changeover.
        manager.tick(at(base, 10_000));
        let display = &manager.displays()[0];
        assert_eq!(display.active, Some(1));
        assert_eq!(display.screens[0].active_count(), 0);
        assert_eq!(manager.context().session_count(), 2);
        assert_eq!(charged_sum(&manager), manager.context().charged_weight());
    }

    #[test]
    fn test_changeover_covers_every_new_grid_cell() {
        let config = r#"{"screens": [
            {"layout": "2x2", "display_time": 10,
             "windows": [{"urls": ["rtsp://cam/1"]}, {"urls": ["rtsp://cam/1"]},
                         {"urls": ["rtsp://cam/1"]}, {"urls": ["rtsp://cam/1"]}]},
            {"layout": "4x4", "display_time": 10, "windows": [
                {"urls": ["rtsp://cam/1"]}, {"urls": ["rtsp://cam/1"]},
                {"urls": ["rtsp://cam/1"]}, {"urls": ["rtsp://cam/1"]},
                {"urls": ["rtsp://cam/1"]}, {"urls": ["rtsp://cam/1"]},
                {"urls": ["rtsp://cam/1"]}, {"urls": ["rtsp://cam/1"]},
                {"urls": ["rtsp://cam/1"]}, {"urls": ["rtsp://cam/1"]},
                {"urls": ["rtsp://cam/1"]}, {"urls": ["rtsp://cam/1"]},
                {"urls": ["rtsp://cam/1"]}, {"urls": ["rtsp://cam/1"]},
                {"urls": ["rtsp://cam/1"]}, {"urls": ["rtsp://cam/1"]}
            ]}
        ]}"#;
        let mut settings = test_settings();
        settings.changeover = wallplayer_config::Changeover::Prebuffer;
        settings.play_timeout_secs = 3;
        // 4 + 16 concurrent sessions during the overlap.
        settings.max_sessions = 32;
        let (mut manager, _state, _rx) = test_manager(config, settings, &small_stream());
        let base = Instant::now();

        manager.tick(base);
        manager.tick(at(base, 1500));
        manager.tick(at(base, 7000)); // pre-buffer
        manager.tick(at(base, 8200)); // init
        manager.tick(at(base, 10_000)); // changeover

        let display = &manager.displays()[0];
        assert_eq!(display.active, Some(1));

        // Every base-grid cell of the new screen is covered by a visible
        // window; none is left to the old screen.
        let new = &display.screens[1];
        let mut covered: Vec<usize> = new
            .windows
            .iter()
            .filter(|w| w.is_visible())
            .flat_map(|w| w.grid_indices(16).to_vec())
            .collect();
        covered.sort_unstable();
        covered.dedup();
        assert_eq!(covered, (0..16).collect::<Vec<_>>());
        assert_eq!(display.screens[0].active_count(), 0);
    }

    #[test]
    fn test_watchdog_kills_orphans_exactly_once() {
        let (mut manager, state, _rx) =
            test_manager(SINGLE_SCREEN, test_settings(), &small_stream());
        let base = Instant::now();

        manager.tick(base);
        state.lock().orphans.push(4242);

        // First watchdog pass kills the orphan.
        manager.tick(at(base, 1500));
        assert!(state.lock().killed.contains(&4242));
        let kills = state.lock().killed.len();

        // A second pass with no intervening change kills nothing.
        manager.tick(at(base, 20_000));
        assert_eq!(state.lock().killed.len(), kills);
    }

    #[test]
    fn test_watchdog_waits_for_registering_players() {
        let config = r#"{"screens": [
            {"layout": "1x1", "display_time": 0,
             "windows": [{"urls": ["rtsp://cam/1"]}]},
            {"layout": "1x1", "display_time": 0, "display": 1,
             "windows": [{"urls": ["rtsp://cam/1"]}]}
        ]}"#;
        let (mut manager, state, _rx) = test_manager(config, test_settings(), &small_stream());
        let base = Instant::now();

        manager.tick(base);

        // Display 1's player takes its time registering; its pid is not
        // claimable yet and must survive display 0's reap.
        let pid = state.lock().live[1];
        state.lock().unresolved.insert(pid);

        manager.tick(at(base, 1500));
        assert!(state.lock().killed.is_empty());

        // Once the player registers, the reap runs and everything is
        // accounted for.
        state.lock().unresolved.clear();
        manager.tick(at(base, 2000));
        manager.tick(at(base, 2100));
        assert!(state.lock().killed.is_empty());
        assert!(manager.displays()[0].last_watchdog.is_some());
    }

    #[test]
    fn test_watchdog_refreshes_broken_stream() {
        let mut settings = test_settings();
        settings.play_timeout_secs = 10;
        settings.watchdog_secs = 15;
        let config = r#"{"screens": [
            {"layout": "1x1", "display_time": 0,
             "windows": [{"urls": ["rtsp://cam/1"]}]}
        ]}"#;
        let (mut manager, state, rx) = test_manager(config, settings, &small_stream());
        let base = Instant::now();

        manager.tick(base);
        manager.tick(at(base, 1500));
        manager.tick(at(base, 2600)); // playing

        // The player stops answering.
        let pid = state.lock().live[0];
        state.lock().fail_status.insert(pid);

        // Broken only after the liveness timeout.
        manager.tick(at(base, 12_700));
        assert_eq!(
            manager.displays()[0].screens[0].windows[0].playstate(),
            PlayState::Broken
        );

        // The next watchdog pass refreshes it.
        manager.tick(at(base, 17_100));
        assert_eq!(
            manager.displays()[0].screens[0].windows[0].playstate(),
            PlayState::Init1
        );
        assert_eq!(state.lock().launched.len(), 2);
        assert!(rx
            .try_iter()
            .any(|e| matches!(e, EngineEvent::StreamRecovered { .. })));
    }

    #[test]
    fn test_action_slot_rejects_second_submission() {
        let (mut manager, _state, rx) =
            test_manager(SINGLE_SCREEN, test_settings(), &small_stream());

        manager.submit(Action::PauseToggle);
        manager.submit(Action::QualityUp);

        assert!(rx
            .try_iter()
            .any(|e| matches!(e, EngineEvent::ActionRejected)));
        // The first action survives in the slot.
        assert_eq!(
            manager.displays()[0].pending.as_ref(),
            Some(&Action::PauseToggle)
        );
    }

    #[test]
    fn test_pause_discards_prebuffered_screen() {
        let mut settings = test_settings();
        settings.changeover = wallplayer_config::Changeover::Prebuffer;
        settings.play_timeout_secs = 3;
        let (mut manager, _state, _rx) = test_manager(ONE_THEN_FOUR, settings, &small_stream());
        let base = Instant::now();

        manager.tick(base);
        manager.tick(at(base, 1500));
        manager.tick(at(base, 7000));
        assert_eq!(manager.displays()[0].next, Some(1));

        manager.submit(Action::PauseToggle);
        manager.tick(at(base, 8300)); // action executes
        assert!(manager.displays()[0].paused);

        manager.tick(at(base, 8400)); // held rotation discards the buffer
        let display = &manager.displays()[0];
        assert_eq!(display.next, None);
        assert_eq!(display.screens[1].active_count(), 0);
        assert_eq!(display.active, Some(0));
    }

    #[test]
    fn test_manual_switch_next() {
        let mut settings = test_settings();
        settings.changeover = wallplayer_config::Changeover::Normal;
        let (mut manager, _state, rx) = test_manager(ONE_THEN_FOUR, settings, &small_stream());
        let base = Instant::now();

        manager.tick(base);
        manager.tick(at(base, 1500));

        manager.submit(Action::SwitchNext);
        manager.tick(at(base, 2000));

        let display = &manager.displays()[0];
        assert_eq!(display.active, Some(1));
        assert_eq!(display.screens[0].active_count(), 0);
        assert!(rx
            .try_iter()
            .any(|e| matches!(e, EngineEvent::RotationCompleted { from: 0, to: 1, .. })));
    }

    #[test]
    fn test_single_view_zooms_and_restores() {
        let (mut manager, _state, _rx) =
            test_manager(SINGLE_SCREEN, test_settings(), &small_stream());
        let base = Instant::now();

        manager.tick(base);
        manager.tick(at(base, 1500));

        manager.submit(Action::SwitchSingle { window: Some(1) });
        manager.tick(at(base, 2000));
        {
            let display = &manager.displays()[0];
            assert_eq!(display.single_window, Some(1));
            assert!(display.screens[0].windows[1].is_visible());
            assert!(!display.screens[0].windows[0].is_visible());
        }

        manager.submit(Action::SwitchGrid);
        manager.tick(at(base, 4000));
        // The zoomed window needs a moment to re-initialize.
        manager.tick(at(base, 5500));
        let display = &manager.displays()[0];
        assert_eq!(display.single_window, None);
        assert!(display.screens[0].windows.iter().take(2).all(|w| w.is_visible()));
        assert_eq!(charged_sum(&manager), manager.context().charged_weight());
    }

    #[test]
    fn test_quality_invariant_after_grid_switch() {
        let ladder = vec![
            h264_stream("rtsp://cam/low", 640, 360, 15),
            h264_stream("rtsp://cam/high", 1280, 720, 25),
        ];
        let (mut manager, _state, _rx) = test_manager(SINGLE_SCREEN, test_settings(), &ladder);
        let base = Instant::now();

        manager.tick(base);
        manager.tick(at(base, 1500));

        manager.submit(Action::QualityDown);
        manager.tick(at(base, 2000));

        let display = &manager.displays()[0];
        for window in display.screens[0].windows.iter().take(2) {
            assert_eq!(window.active_stream().map(|s| s.height), Some(360));
        }
        assert_eq!(charged_sum(&manager), manager.context().charged_weight());
    }
}
