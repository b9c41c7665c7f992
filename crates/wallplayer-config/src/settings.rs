//! Global settings and screen mapping.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{ConfigError, Layout};

/// Screen changeover strategy during rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Changeover {
    /// Stop the current screen, then start the next one.
    /// Least concurrent resource use, visible gap.
    Normal,

    /// Start the next screen invisibly ahead of time, then swap.
    /// Uses more resources.
    Prebuffer,

    /// Like prebuffer but shows the new windows before hiding the old
    /// ones. No black interval, highest peak resource use.
    PrebufferSmooth,
}

/// Default stream quality selection policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityPolicy {
    /// Always the lowest quality candidate.
    Low,

    /// Highest candidate that avoids downscaling for the target window.
    Auto,

    /// Always the highest valid candidate.
    High,
}

/// HEVC decode support ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HevcMode {
    Off,
    /// Up to 1920x1080.
    Fhd,
    /// Up to 3840x2160.
    Uhd,
}

/// Audio output policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioMode {
    Off,
    /// Audio only while a window plays fullscreen.
    Fullscreen,
}

/// Global tuning knobs, all optional in the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Physical screen width in pixels.
    pub screen_width: u32,

    /// Physical screen height in pixels.
    pub screen_height: u32,

    /// Shrink the usable area by this percentage (overscan workaround).
    pub downscale_percent: u32,

    /// Player network buffer in milliseconds.
    pub buffer_ms: u64,

    /// Enforce the decode-weight ceiling on stream starts and rotation.
    pub hardware_check: bool,

    /// Changeover strategy.
    pub changeover: Changeover,

    /// Default screen display time in seconds when a screen does not set
    /// its own. 0 disables automatic rotation.
    pub showtime_secs: u64,

    /// Minimum interval between watchdog passes.
    pub watchdog_secs: u64,

    /// Liveness timeout: a stream that has not reached a healthy state
    /// within this period is considered broken.
    pub play_timeout_secs: u64,

    /// Default stream quality selection policy.
    pub quality: QualityPolicy,

    /// Force-refresh the active screen after this playtime while rotation
    /// is paused. 0 disables the periodic refresh.
    pub refresh_minutes: u64,

    /// HEVC decode ceiling.
    pub hevc_mode: HevcMode,

    /// Audio output policy.
    pub audio_mode: AudioMode,

    /// Audio volume in percent.
    pub audio_volume: u32,

    /// Render channel names onto the video via subtitle files.
    pub video_osd: bool,

    /// Show loading/paused/control overlay icons.
    pub icons_enabled: bool,

    /// Hard ceiling on simultaneous decode sessions.
    pub max_sessions: usize,

    /// Hard ceiling on total charged decode weight.
    pub max_decode_weight: u64,

    /// Control-channel round-trip timeout in milliseconds.
    pub control_timeout_ms: u64,

    /// Control-channel retries before the session is force-killed.
    pub control_retries: u32,

    /// Maximum time a freshly launched player may take to show up in the
    /// process table before the stream is marked broken.
    pub init_timeout_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            screen_width: 1920,
            screen_height: 1080,
            downscale_percent: 0,
            buffer_ms: 500,
            hardware_check: true,
            changeover: Changeover::Prebuffer,
            showtime_secs: 10,
            watchdog_secs: 15,
            play_timeout_secs: 10,
            quality: QualityPolicy::Auto,
            refresh_minutes: 60,
            hevc_mode: HevcMode::Off,
            audio_mode: AudioMode::Off,
            audio_volume: 100,
            video_osd: false,
            icons_enabled: true,
            max_sessions: 16,
            max_decode_weight: 1920 * 1080 * 60,
            control_timeout_ms: 1000,
            control_retries: 5,
            init_timeout_ms: 2000,
        }
    }
}

impl Settings {
    /// Usable (virtual) screen width after downscaling.
    pub fn virtual_width(&self) -> u32 {
        self.screen_width * (100 - self.downscale_percent.min(99)) / 100
    }

    /// Usable (virtual) screen height after downscaling.
    pub fn virtual_height(&self) -> u32 {
        self.screen_height * (100 - self.downscale_percent.min(99)) / 100
    }

    /// Horizontal offset centering the virtual screen.
    pub fn offset_x(&self) -> u32 {
        (self.screen_width - self.virtual_width()) / 2
    }

    /// Vertical offset centering the virtual screen.
    pub fn offset_y(&self) -> u32 {
        (self.screen_height - self.virtual_height()) / 2
    }
}

/// One window's stream mapping.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WindowConfig {
    /// Candidate stream URLs for this window, same logical source at
    /// different qualities.
    #[serde(default)]
    pub urls: Vec<String>,

    /// Channel name shown via the video OSD.
    #[serde(default)]
    pub name: Option<String>,

    /// Force UDP transport for all candidates of this window.
    #[serde(default)]
    pub force_udp: bool,
}

/// One screen: a layout plus its window/stream mapping.
#[derive(Debug, Clone)]
pub struct ScreenConfig {
    /// Grid layout.
    pub layout: Layout,

    /// Seconds this screen stays active during rotation; 0 = never rotate
    /// away automatically.
    pub display_time: u64,

    /// Display this screen belongs to.
    pub display: usize,

    /// Window mappings, in grid order. Missing entries stay empty.
    pub windows: Vec<WindowConfig>,
}

#[derive(Debug, Deserialize)]
struct RawScreen {
    layout: String,
    display_time: Option<u64>,
    #[serde(default)]
    display: usize,
    #[serde(default)]
    windows: Vec<WindowConfig>,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    settings: Settings,
    #[serde(default)]
    screens: Vec<RawScreen>,
}

/// The fully resolved configuration.
#[derive(Debug, Clone)]
pub struct WallConfig {
    pub settings: Settings,
    pub screens: Vec<ScreenConfig>,
}

impl WallConfig {
    /// Load and resolve the configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Resolve a configuration from its JSON text.
    ///
    /// An unknown layout name falls back to the 1x1 layout with a logged
    /// error instead of failing the whole file.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = serde_json::from_str(text)?;
        let settings = raw.settings;

        let mut screens = Vec::with_capacity(raw.screens.len());
        for (idx, screen) in raw.screens.into_iter().enumerate() {
            let layout = match Layout::parse(&screen.layout) {
                Some(layout) => layout,
                None => {
                    warn!(
                        screen = idx,
                        layout = %screen.layout,
                        "unknown layout, falling back to 1x1"
                    );
                    Layout::Grid1x1
                }
            };

            screens.push(ScreenConfig {
                layout,
                display_time: screen.display_time.unwrap_or(settings.showtime_secs),
                display: screen.display,
                windows: screen.windows,
            });
        }

        if screens.is_empty() {
            return Err(ConfigError::NoScreens);
        }

        Ok(Self { settings, screens })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.showtime_secs, 10);
        assert_eq!(settings.play_timeout_secs, 10);
        assert_eq!(settings.max_sessions, 16);
        assert_eq!(settings.max_decode_weight, 1920 * 1080 * 60);
        assert!(settings.hardware_check);
    }

    #[test]
    fn test_virtual_screen_downscale() {
        let settings = Settings {
            screen_width: 1920,
            screen_height: 1080,
            downscale_percent: 10,
            ..Default::default()
        };
        assert_eq!(settings.virtual_width(), 1728);
        assert_eq!(settings.virtual_height(), 972);
        assert_eq!(settings.offset_x(), 96);
        assert_eq!(settings.offset_y(), 54);
    }

    #[test]
    fn test_invalid_layout_falls_back_to_1x1() {
        let config = WallConfig::from_json(
            r#"{"screens": [{"layout": "5x5", "windows": [{"urls": ["rtsp://cam/1"]}]}]}"#,
        )
        .unwrap();
        assert_eq!(config.screens[0].layout, Layout::Grid1x1);
    }

    #[test]
    fn test_display_time_defaults_to_showtime() {
        let config = WallConfig::from_json(
            r#"{
                "settings": {"showtime_secs": 30},
                "screens": [
                    {"layout": "2x2"},
                    {"layout": "3x3", "display_time": 5}
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(config.screens[0].display_time, 30);
        assert_eq!(config.screens[1].display_time, 5);
    }

    #[test]
    fn test_empty_screens_rejected() {
        assert!(matches!(
            WallConfig::from_json(r#"{"screens": []}"#),
            Err(ConfigError::NoScreens)
        ));
    }
}
