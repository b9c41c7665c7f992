//! Settings and screen/stream mapping for wallplayer.
//!
//! Configuration is a single JSON file: global tuning knobs plus the list
//! of screens, each mapping grid windows to one or more stream URLs
//! (multiple URLs per window = the same camera at different qualities).

mod error;
mod layout;
mod settings;

pub use error::ConfigError;
pub use layout::Layout;
pub use settings::{
    AudioMode, Changeover, HevcMode, QualityPolicy, ScreenConfig, Settings, WallConfig,
    WindowConfig,
};
