//! Grid layouts a screen can use.

use serde::{Deserialize, Serialize};

/// Fixed grid layouts. The `NxM` variants are uniform grids; the `NpM`
/// variants combine N enlarged windows with M regular cells on the same
/// base grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layout {
    Grid1x1,
    Grid1x3,
    Grid2x2,
    Grid3x3,
    Grid4x4,
    One5,
    One7,
    One12,
    Two8,
    Three4,
}

impl Layout {
    /// Parse a layout name; `None` when unknown.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "grid1x1" | "1x1" => Some(Self::Grid1x1),
            "grid1x3" | "1x3" => Some(Self::Grid1x3),
            "grid2x2" | "2x2" => Some(Self::Grid2x2),
            "grid3x3" | "3x3" => Some(Self::Grid3x3),
            "grid4x4" | "4x4" => Some(Self::Grid4x4),
            "one5" | "1p5" => Some(Self::One5),
            "one7" | "1p7" => Some(Self::One7),
            "one12" | "1p12" => Some(Self::One12),
            "two8" | "2p8" => Some(Self::Two8),
            "three4" | "3p4" => Some(Self::Three4),
            _ => None,
        }
    }

    /// Total number of windows this layout holds.
    pub fn window_count(self) -> usize {
        match self {
            Self::Grid1x1 => 1,
            Self::Grid1x3 => 3,
            Self::Grid2x2 => 4,
            Self::Grid3x3 => 9,
            Self::Grid4x4 => 16,
            Self::One5 => 6,
            Self::One7 => 8,
            Self::One12 => 13,
            Self::Two8 => 10,
            Self::Three4 => 7,
        }
    }

    /// Base grid sizes this layout maps onto. A 1x1 screen matches both a
    /// 3x3 and a 4x4 base grid, which keeps smooth changeovers possible
    /// towards either.
    pub fn grid_sizes(self) -> &'static [usize] {
        match self {
            Self::Grid1x1 => &[9, 16],
            Self::Grid1x3 => &[1, 3],
            Self::Grid2x2 => &[16],
            Self::Grid3x3 => &[9],
            Self::Grid4x4 => &[16],
            Self::One5 => &[9],
            Self::One7 => &[16],
            Self::One12 => &[16],
            Self::Two8 => &[16],
            Self::Three4 => &[16],
        }
    }

    /// Background image name for this layout.
    pub fn background_image(self) -> &'static str {
        match self {
            Self::Grid1x1 | Self::Grid1x3 => "nolink_1x1.png",
            Self::Grid2x2 => "nolink_2x2.png",
            Self::Grid3x3 => "nolink_3x3.png",
            Self::Grid4x4 => "nolink_4x4.png",
            Self::One5 => "nolink_1p5.png",
            Self::One7 => "nolink_1p7.png",
            Self::One12 => "nolink_1p12.png",
            Self::Two8 => "nolink_2p8.png",
            Self::Three4 => "nolink_3p4.png",
        }
    }
}

impl Default for Layout {
    fn default() -> Self {
        Self::Grid1x1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_layouts() {
        assert_eq!(Layout::parse("2x2"), Some(Layout::Grid2x2));
        assert_eq!(Layout::parse("grid3x3"), Some(Layout::Grid3x3));
        assert_eq!(Layout::parse("1p7"), Some(Layout::One7));
        assert_eq!(Layout::parse("bogus"), None);
    }

    #[test]
    fn test_window_counts() {
        assert_eq!(Layout::Grid1x1.window_count(), 1);
        assert_eq!(Layout::One5.window_count(), 6);
        assert_eq!(Layout::Two8.window_count(), 10);
        assert_eq!(Layout::Grid4x4.window_count(), 16);
    }

    #[test]
    fn test_grid_sizes_overlap_for_1x1() {
        // A fullscreen layout must share a base grid with both 3x3 and 4x4
        // screens so rotation between them stays smooth.
        assert!(Layout::Grid1x1.grid_sizes().contains(&9));
        assert!(Layout::Grid1x1.grid_sizes().contains(&16));
    }
}
