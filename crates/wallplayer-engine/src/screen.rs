//! One rotation unit: a fixed layout of windows.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use tracing::warn;

use wallplayer_config::{Layout, ScreenConfig, Settings};
use wallplayer_player::Rect;
use wallplayer_probe::StreamDescriptor;

use crate::context::WallContext;
use crate::window::{PlayState, Window};

/// A fixed layout of windows, activated and deactivated as one unit.
pub struct Screen {
    pub index: usize,
    pub layout: Layout,
    pub display_time: u64,
    pub windows: Vec<Window>,
}

impl Screen {
    /// Build a screen and its window geometry from configuration.
    ///
    /// `candidates[i]` holds the probed descriptors for configured window
    /// `i`; layout cells beyond the configured windows stay empty (the
    /// background shows through).
    pub fn new(
        display: usize,
        index: usize,
        config: &ScreenConfig,
        mut candidates: Vec<Vec<StreamDescriptor>>,
        settings: &Settings,
    ) -> Self {
        let layout = config.layout;
        let cells = layout_cells(layout);
        candidates.resize(cells.len(), Vec::new());

        let screen_rect = virtual_rect(settings);
        let mut windows = Vec::with_capacity(cells.len());

        for (w, cell) in cells.iter().enumerate() {
            let rect = cell_rect(screen_rect, *cell);
            let native_fullscreen = rect == screen_rect;

            let mut indices = HashMap::new();
            for &grid in layout.grid_sizes() {
                indices.insert(grid, covered_indices(rect, screen_rect, grid));
            }

            let cfg = config.windows.get(w).cloned().unwrap_or_default();
            let subtitle_file = if settings.video_osd {
                write_subtitle_file(display, index, w, cfg.name.as_deref())
            } else {
                None
            };

            windows.push(Window::new(
                display,
                index,
                w,
                rect,
                native_fullscreen,
                indices,
                std::mem::take(&mut candidates[w]),
                cfg.name,
                cfg.force_udp,
                subtitle_file,
            ));
        }

        Self {
            index,
            layout,
            display_time: config.display_time,
            windows,
        }
    }

    pub fn start_all(&mut self, ctx: &mut WallContext, now: Instant, visible: bool) {
        for window in &mut self.windows {
            window.start(ctx, now, visible, false, None);
        }
    }

    pub fn stop_all(&mut self, ctx: &mut WallContext) {
        for window in &mut self.windows {
            window.stop(ctx);
        }
    }

    /// Poll every window's state machine.
    pub fn monitor(&mut self, ctx: &WallContext, now: Instant) {
        for window in &mut self.windows {
            window.poll(ctx, now);
        }
    }

    /// Any window still waiting for its player process?
    pub fn any_init1(&self) -> bool {
        self.windows
            .iter()
            .any(|w| w.playstate() == PlayState::Init1)
    }

    /// Windows with an active stream (any non-NONE state).
    pub fn active_count(&self) -> usize {
        self.windows
            .iter()
            .filter(|w| w.playstate() != PlayState::None)
            .count()
    }

    /// What starting this screen would cost: sessions and decode weight
    /// of every window's default candidate.
    pub fn demand(&self, ctx: &WallContext) -> (usize, u64) {
        let mut sessions = 0;
        let mut weight = 0;
        for window in &self.windows {
            if let Some(stream) = window.default_candidate(ctx) {
                sessions += 1;
                weight += stream.weight;
            }
        }
        (sessions, weight)
    }

    /// Pids of all live sessions on this screen.
    pub fn session_pids(&self) -> Vec<u32> {
        self.windows.iter().filter_map(|w| w.session_pid()).collect()
    }

    /// Longest playtime among the screen's windows.
    pub fn max_playtime(&self, now: Instant) -> Option<Duration> {
        self.windows
            .iter()
            .filter_map(|w| w.started_at())
            .map(|t| now.duration_since(t))
            .max()
    }
}

/// Full virtual-screen rectangle.
fn virtual_rect(settings: &Settings) -> Rect {
    let x = settings.offset_x() as i32;
    let y = settings.offset_y() as i32;
    Rect::new(
        x,
        y,
        x + settings.virtual_width() as i32,
        y + settings.virtual_height() as i32,
    )
}

/// A layout cell in grid units: (column, row, column span, row span) on a
/// `cols` x `rows` grid.
type Cell = (u32, u32, u32, u32);

struct CellGrid {
    cols: u32,
    rows: u32,
    cells: Vec<Cell>,
}

fn uniform(n: u32) -> CellGrid {
    let mut cells = Vec::with_capacity((n * n) as usize);
    for row in 0..n {
        for col in 0..n {
            cells.push((col, row, 1, 1));
        }
    }
    CellGrid {
        cols: n,
        rows: n,
        cells,
    }
}

fn layout_grid(layout: Layout) -> CellGrid {
    match layout {
        Layout::Grid1x1 => uniform(1),
        Layout::Grid1x3 => CellGrid {
            cols: 3,
            rows: 1,
            cells: vec![(0, 0, 1, 1), (1, 0, 1, 1), (2, 0, 1, 1)],
        },
        Layout::Grid2x2 => uniform(2),
        Layout::Grid3x3 => uniform(3),
        Layout::Grid4x4 => uniform(4),
        Layout::One5 => CellGrid {
            cols: 3,
            rows: 3,
            cells: vec![
                (0, 0, 2, 2),
                (2, 0, 1, 1),
                (2, 1, 1, 1),
                (0, 2, 1, 1),
                (1, 2, 1, 1),
                (2, 2, 1, 1),
            ],
        },
        Layout::One7 => CellGrid {
            cols: 4,
            rows: 4,
            cells: vec![
                (0, 0, 3, 3),
                (3, 0, 1, 1),
                (3, 1, 1, 1),
                (3, 2, 1, 1),
                (0, 3, 1, 1),
                (1, 3, 1, 1),
                (2, 3, 1, 1),
                (3, 3, 1, 1),
            ],
        },
        Layout::One12 => CellGrid {
            cols: 4,
            rows: 4,
            cells: vec![
                (0, 0, 2, 2),
                (2, 0, 1, 1),
                (3, 0, 1, 1),
                (2, 1, 1, 1),
                (3, 1, 1, 1),
                (0, 2, 1, 1),
                (1, 2, 1, 1),
                (2, 2, 1, 1),
                (3, 2, 1, 1),
                (0, 3, 1, 1),
                (1, 3, 1, 1),
                (2, 3, 1, 1),
                (3, 3, 1, 1),
            ],
        },
        Layout::Two8 => CellGrid {
            cols: 4,
            rows: 4,
            cells: vec![
                (0, 0, 2, 2),
                (2, 0, 2, 2),
                (0, 2, 1, 1),
                (1, 2, 1, 1),
                (2, 2, 1, 1),
                (3, 2, 1, 1),
                (0, 3, 1, 1),
                (1, 3, 1, 1),
                (2, 3, 1, 1),
                (3, 3, 1, 1),
            ],
        },
        Layout::Three4 => CellGrid {
            cols: 4,
            rows: 4,
            cells: vec![
                (0, 0, 2, 2),
                (2, 0, 2, 2),
                (0, 2, 2, 2),
                (2, 2, 1, 1),
                (3, 2, 1, 1),
                (2, 3, 1, 1),
                (3, 3, 1, 1),
            ],
        },
    }
}

/// Cell geometry for every window of a layout, paired with the grid the
/// cells live on (captured by the returned rect math).
fn layout_cells(layout: Layout) -> Vec<(u32, u32, u32, u32, u32, u32)> {
    let grid = layout_grid(layout);
    grid.cells
        .into_iter()
        .map(|(col, row, w, h)| (col, row, w, h, grid.cols, grid.rows))
        .collect()
}

/// Pixel rectangle of one cell. Edges are computed identically for every
/// window so adjacent cells share exact boundaries.
fn cell_rect(screen: Rect, (col, row, w, h, cols, rows): (u32, u32, u32, u32, u32, u32)) -> Rect {
    let width = screen.width();
    let height = screen.height();
    Rect::new(
        screen.x1 + (width * col / cols) as i32,
        screen.y1 + (height * row / rows) as i32,
        screen.x1 + (width * (col + w) / cols) as i32,
        screen.y1 + (height * (row + h) / rows) as i32,
    )
}

fn base_grid_dims(grid: usize) -> (u32, u32) {
    match grid {
        1 => (1, 1),
        3 => (3, 1),
        9 => (3, 3),
        16 => (4, 4),
        other => {
            let side = (other as f64).sqrt() as u32;
            (side.max(1), side.max(1))
        }
    }
}

/// Base-grid cells a window rectangle overlaps. Shared edges do not
/// count as overlap.
fn covered_indices(rect: Rect, screen: Rect, grid: usize) -> Vec<usize> {
    let (cols, rows) = base_grid_dims(grid);
    let width = screen.width();
    let height = screen.height();
    let mut covered = Vec::new();

    for row in 0..rows {
        for col in 0..cols {
            let cx1 = screen.x1 + (width * col / cols) as i32;
            let cy1 = screen.y1 + (height * row / rows) as i32;
            let cx2 = screen.x1 + (width * (col + 1) / cols) as i32;
            let cy2 = screen.y1 + (height * (row + 1) / rows) as i32;

            if rect.x1 < cx2 && rect.x2 > cx1 && rect.y1 < cy2 && rect.y2 > cy1 {
                covered.push((row * cols + col) as usize);
            }
        }
    }

    covered
}

/// Write the channel-name OSD subtitle file for a window. Best-effort:
/// failure just disables the OSD for this window.
fn write_subtitle_file(
    display: usize,
    screen: usize,
    window: usize,
    name: Option<&str>,
) -> Option<PathBuf> {
    let name = name?;
    let path = std::env::temp_dir().join(format!(
        "wallplayer_d{:02}_s{:02}_w{:02}.srt",
        display, screen, window
    ));

    // One subtitle entry that stays up for the whole session.
    let content = format!("1\n00:00:00,000 --> 99:00:00,000\n{}\n", name);
    match std::fs::write(&path, content) {
        Ok(()) => Some(path),
        Err(e) => {
            warn!(window, "subtitle file write failed: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn screen_1080() -> Rect {
        Rect::new(0, 0, 1920, 1080)
    }

    #[test]
    fn test_uniform_grid_geometry() {
        let cells = layout_cells(Layout::Grid2x2);
        assert_eq!(cells.len(), 4);

        let first = cell_rect(screen_1080(), cells[0]);
        assert_eq!(first, Rect::new(0, 0, 960, 540));

        let last = cell_rect(screen_1080(), cells[3]);
        assert_eq!(last, Rect::new(960, 540, 1920, 1080));
    }

    #[test]
    fn test_one5_big_window_spans_two_thirds() {
        let cells = layout_cells(Layout::One5);
        let big = cell_rect(screen_1080(), cells[0]);
        assert_eq!(big, Rect::new(0, 0, 1280, 720));
    }

    #[test]
    fn test_fullscreen_covers_whole_base_grid() {
        let covered = covered_indices(screen_1080(), screen_1080(), 16);
        assert_eq!(covered.len(), 16);
    }

    #[test]
    fn test_2x2_cell_covers_quarter_of_4x4_grid() {
        let cell = Rect::new(0, 0, 960, 540);
        let covered = covered_indices(cell, screen_1080(), 16);
        assert_eq!(covered, vec![0, 1, 4, 5]);
    }

    #[test]
    fn test_adjacent_cells_do_not_share_indices() {
        let left = covered_indices(Rect::new(0, 0, 960, 1080), screen_1080(), 16);
        let right = covered_indices(Rect::new(960, 0, 1920, 1080), screen_1080(), 16);
        assert!(left.iter().all(|i| !right.contains(i)));
    }

    #[test]
    fn test_layout_cell_counts_match_window_counts() {
        for layout in [
            Layout::Grid1x1,
            Layout::Grid1x3,
            Layout::Grid2x2,
            Layout::Grid3x3,
            Layout::Grid4x4,
            Layout::One5,
            Layout::One7,
            Layout::One12,
            Layout::Two8,
            Layout::Three4,
        ] {
            assert_eq!(layout_cells(layout).len(), layout.window_count());
        }
    }
}
