//! Background images and status icons.
//!
//! Backgrounds sit on a layer below every video window and cover the
//! spots where no stream plays; icons sit above everything and give the
//! user feedback on actions like pausing or switching views. Rendering is
//! delegated to a `pngview` subprocess per visible element.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};

use tracing::{debug, warn};

/// Layer below all video windows.
const BACKGROUND_LAYER: i32 = -100;

/// Layer above all video windows.
const ICON_LAYER: i32 = 1000;

/// Icon position from the top-left screen corner.
const ICON_OFFSET: u32 = 60;

/// Status icons shown after user actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Icon {
    Pause,
    Play,
    SingleView,
    GridView,
    Broken,
    /// Marks the display that currently receives user actions.
    Control,
}

impl Icon {
    fn file_name(self) -> &'static str {
        match self {
            Icon::Pause => "pause.png",
            Icon::Play => "play.png",
            Icon::SingleView => "single.png",
            Icon::GridView => "grid.png",
            Icon::Broken => "broken.png",
            Icon::Control => "control.png",
        }
    }
}

/// Rendering surface for backgrounds and icons, one per wall.
///
/// Implementations must tolerate repeated show/hide calls; the scheduler
/// does not track overlay state beyond icon expiry.
pub trait OverlayService: Send {
    /// Show a background image on a display, replacing any previous one.
    fn show_background(&mut self, display: usize, image: &str);

    /// Remove the background from a display.
    fn clear_background(&mut self, display: usize);

    /// Show a status icon on a display, replacing any previous one.
    fn show_icon(&mut self, display: usize, icon: Icon);

    /// Remove the status icon from a display.
    fn hide_icon(&mut self, display: usize);
}

/// Production overlay driving `pngview` subprocesses.
pub struct ShellOverlay {
    resource_dir: PathBuf,
    backgrounds: HashMap<usize, Child>,
    icons: HashMap<usize, Child>,
}

impl ShellOverlay {
    pub fn new(resource_dir: PathBuf) -> Self {
        Self {
            resource_dir,
            backgrounds: HashMap::new(),
            icons: HashMap::new(),
        }
    }

    fn spawn_pngview(
        &self,
        display: usize,
        image: PathBuf,
        layer: i32,
        x: u32,
        y: u32,
    ) -> Option<Child> {
        if !image.exists() {
            warn!(image = %image.display(), "overlay image missing");
            return None;
        }

        let result = Command::new("pngview")
            .args(["-b", "0"])
            .args(["-d", &display.to_string()])
            .args(["-l", &layer.to_string()])
            .args(["-x", &x.to_string()])
            .args(["-y", &y.to_string()])
            .arg(&image)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();

        match result {
            Ok(child) => Some(child),
            Err(e) => {
                warn!("pngview spawn failed: {}", e);
                None
            }
        }
    }

    fn reap(slot: &mut HashMap<usize, Child>, display: usize) {
        if let Some(mut child) = slot.remove(&display) {
            if let Err(e) = child.kill() {
                debug!("overlay process already gone: {}", e);
            }
            let _ = child.wait();
        }
    }
}

impl OverlayService for ShellOverlay {
    fn show_background(&mut self, display: usize, image: &str) {
        Self::reap(&mut self.backgrounds, display);

        let path = self.resource_dir.join("backgrounds").join(image);
        if let Some(child) = self.spawn_pngview(display, path, BACKGROUND_LAYER, 0, 0) {
            self.backgrounds.insert(display, child);
        }
    }

    fn clear_background(&mut self, display: usize) {
        Self::reap(&mut self.backgrounds, display);
    }

    fn show_icon(&mut self, display: usize, icon: Icon) {
        Self::reap(&mut self.icons, display);

        let path = self.resource_dir.join("icons").join(icon.file_name());
        if let Some(child) =
            self.spawn_pngview(display, path, ICON_LAYER, ICON_OFFSET, ICON_OFFSET)
        {
            self.icons.insert(display, child);
        }
    }

    fn hide_icon(&mut self, display: usize) {
        Self::reap(&mut self.icons, display);
    }
}

impl Drop for ShellOverlay {
    fn drop(&mut self) {
        let displays: Vec<usize> = self.backgrounds.keys().copied().collect();
        for display in displays {
            Self::reap(&mut self.backgrounds, display);
        }
        let displays: Vec<usize> = self.icons.keys().copied().collect();
        for display in displays {
            Self::reap(&mut self.icons, display);
        }
    }
}

/// Overlay that renders nothing. Used when icons are disabled and in
/// tests.
#[derive(Debug, Default)]
pub struct NullOverlay;

impl OverlayService for NullOverlay {
    fn show_background(&mut self, _display: usize, _image: &str) {}
    fn clear_background(&mut self, _display: usize) {}
    fn show_icon(&mut self, _display: usize, _icon: Icon) {}
    fn hide_icon(&mut self, _display: usize) {}
}
