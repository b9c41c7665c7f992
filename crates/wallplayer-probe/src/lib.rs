//! Stream metadata probing and the persisted probe cache.
//!
//! Each candidate URL is probed once (ffprobe) and the result cached on
//! disk keyed by a credential-stripped form of the URL. A probe failure
//! produces an *invalid* descriptor rather than an error: the owning
//! window simply has one fewer playable candidate.

mod cache;
mod descriptor;
mod error;
mod ffprobe;

pub use cache::ProbeCache;
pub use descriptor::{printable_url, StreamDescriptor, StreamProps, MIN_USABLE_QUALITY};
pub use error::ProbeError;
pub use ffprobe::Prober;
