//! Mock launcher, sessions and fixtures for engine tests.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use wallplayer_config::{HevcMode, Settings, WallConfig};
use wallplayer_overlay::NullOverlay;
use wallplayer_player::{
    LaunchRequest, PlaybackStatus, PlayerSession, Rect, SessionError, SessionKind,
    SessionLauncher, StatusReport,
};
use wallplayer_probe::{StreamDescriptor, StreamProps};

use crate::context::WallContext;
use crate::scheduler::ScreenManager;
use crate::window::Window;

pub fn h264_stream(url: &str, width: u32, height: u32, framerate: u32) -> StreamDescriptor {
    StreamDescriptor::new(
        url.to_string(),
        StreamProps {
            codec: "h264".to_string(),
            width,
            height,
            framerate,
            audio: false,
            force_udp: false,
        },
        HevcMode::Off,
    )
}

pub fn h264_audio_stream(url: &str, width: u32, height: u32, framerate: u32) -> StreamDescriptor {
    StreamDescriptor::new(
        url.to_string(),
        StreamProps {
            codec: "h264".to_string(),
            width,
            height,
            framerate,
            audio: true,
            force_udp: false,
        },
        HevcMode::Off,
    )
}

/// Shared bookkeeping between a mock launcher and its sessions.
#[derive(Default)]
pub struct MockState {
    next_pid: u32,
    /// Live mock player pids.
    pub live: Vec<u32>,
    /// Pids killed through any path, in order.
    pub killed: Vec<u32>,
    /// Extra pids the launcher reports as live without owning them
    /// (simulated leftovers from a previous run).
    pub orphans: Vec<u32>,
    /// Launches performed, by url.
    pub launched: Vec<String>,
    /// Pids whose sessions stop answering status queries.
    pub fail_status: HashSet<u32>,
    /// Pids whose player process never shows up in the process table.
    pub unresolved: HashSet<u32>,
}

impl MockState {
    fn spawn(&mut self, url: &str) -> u32 {
        self.next_pid += 1;
        let pid = 1000 + self.next_pid;
        self.live.push(pid);
        self.launched.push(url.to_string());
        pid
    }

    fn kill(&mut self, pid: u32) {
        self.live.retain(|&p| p != pid);
        self.orphans.retain(|&p| p != pid);
        self.killed.push(pid);
    }
}

pub struct MockSession {
    pid: u32,
    audio: bool,
    state: Arc<Mutex<MockState>>,
    duration: i64,
}

impl PlayerSession for MockSession {
    fn kind(&self) -> SessionKind {
        SessionKind::Exclusive
    }

    fn pid(&self) -> Option<u32> {
        if self.state.lock().unresolved.contains(&self.pid) {
            None
        } else {
            Some(self.pid)
        }
    }

    fn resolve_pid(&mut self) -> Option<u32> {
        self.pid()
    }

    fn query_status(&mut self, kill_on_error: bool) -> Result<StatusReport, SessionError> {
        {
            let mut state = self.state.lock();
            if state.fail_status.contains(&self.pid) {
                if kill_on_error {
                    state.kill(self.pid);
                }
                return Err(SessionError::NoProcess);
            }
        }
        self.duration += 1;
        Ok(StatusReport {
            status: PlaybackStatus::Playing,
            duration: Some(self.duration),
        })
    }

    fn set_position(&mut self, _rect: Rect) -> Result<(), SessionError> {
        Ok(())
    }

    fn set_position_detached(&self, _rect: Rect) {}

    fn show(&mut self, _rect: Rect) -> Result<(), SessionError> {
        Ok(())
    }

    fn hide(&mut self, _offscreen: Rect) -> Result<(), SessionError> {
        Ok(())
    }

    fn set_volume(&mut self, _percent: u32) -> Result<(), SessionError> {
        Ok(())
    }

    fn stop(&mut self) {
        self.state.lock().kill(self.pid);
    }

    fn force_kill(&mut self) {
        self.state.lock().kill(self.pid);
    }

    fn audio_enabled(&self) -> bool {
        self.audio
    }
}

#[derive(Default)]
pub struct MockLauncher {
    pub state: Arc<Mutex<MockState>>,
}

impl MockLauncher {
    pub fn new() -> (Self, Arc<Mutex<MockState>>) {
        let launcher = Self::default();
        let state = Arc::clone(&launcher.state);
        (launcher, state)
    }
}

impl SessionLauncher for MockLauncher {
    fn launch(&mut self, request: LaunchRequest) -> Result<Box<dyn PlayerSession>, SessionError> {
        let pid = self.state.lock().spawn(&request.url);
        Ok(Box::new(MockSession {
            pid,
            audio: request.audio,
            state: Arc::clone(&self.state),
            duration: 0,
        }))
    }

    fn live_pids(&mut self) -> Vec<u32> {
        let state = self.state.lock();
        state.live.iter().chain(state.orphans.iter()).copied().collect()
    }

    fn idle_pids(&self) -> Vec<u32> {
        Vec::new()
    }

    fn kill(&mut self, pid: u32) {
        self.state.lock().kill(pid);
    }
}

pub fn test_settings() -> Settings {
    Settings {
        hardware_check: true,
        ..Settings::default()
    }
}

pub fn test_context() -> WallContext {
    let (launcher, _) = MockLauncher::new();
    WallContext::new(test_settings(), Box::new(launcher), Box::new(NullOverlay))
}

pub fn test_window(candidates: Vec<StreamDescriptor>) -> Window {
    Window::new(
        0,
        0,
        0,
        Rect::new(0, 0, 960, 540),
        false,
        HashMap::new(),
        candidates,
        None,
        false,
        None,
    )
}

/// Manager over a JSON config where every configured URL resolves to the
/// given probed descriptor set.
pub fn test_manager(
    config_json: &str,
    settings: Settings,
    ladder: &[StreamDescriptor],
) -> (
    ScreenManager,
    Arc<Mutex<MockState>>,
    crossbeam_channel::Receiver<wallplayer_ipc::EngineEvent>,
) {
    let mut config = WallConfig::from_json(config_json).expect("test config");
    config.settings = settings;

    let candidates: Vec<Vec<Vec<StreamDescriptor>>> = config
        .screens
        .iter()
        .map(|screen| {
            screen
                .windows
                .iter()
                .map(|w| {
                    if w.urls.is_empty() {
                        Vec::new()
                    } else {
                        ladder.to_vec()
                    }
                })
                .collect()
        })
        .collect();

    let (launcher, state) = MockLauncher::new();
    let (tx, rx) = wallplayer_ipc::event_channel();
    let manager = ScreenManager::new(
        &config,
        candidates,
        Box::new(launcher),
        Box::new(NullOverlay),
        tx,
    )
    .expect("manager");

    (manager, state, rx)
}

pub fn at(base: Instant, ms: u64) -> Instant {
    base + std::time::Duration::from_millis(ms)
}
