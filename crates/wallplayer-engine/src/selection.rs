//! Stream candidate selection policy.
//!
//! A window's candidates are the same logical source at different
//! qualities. Selection operates on the subset playable in the requested
//! context (windowed vs fullscreen) and returns an index into the
//! candidate list.

use wallplayer_config::QualityPolicy;
use wallplayer_probe::StreamDescriptor;

/// Lowest-quality playable candidate.
pub fn lowest_valid(candidates: &[StreamDescriptor], windowed: bool) -> Option<usize> {
    candidates
        .iter()
        .enumerate()
        .filter(|(_, s)| s.playable(windowed))
        .min_by_key(|(_, s)| s.quality)
        .map(|(i, _)| i)
}

/// Highest-quality playable candidate.
///
/// With `prevent_downscaling`, prefer the candidate whose height is at
/// least `target_height` and closest to it; downscaling a larger stream
/// costs more than upscaling a slightly smaller one, so only when no
/// candidate reaches the target do we fall back to the closest below.
pub fn highest_valid(
    candidates: &[StreamDescriptor],
    windowed: bool,
    target_height: u32,
    prevent_downscaling: bool,
) -> Option<usize> {
    let playable = || {
        candidates
            .iter()
            .enumerate()
            .filter(|(_, s)| s.playable(windowed))
    };

    if !prevent_downscaling {
        return playable().max_by_key(|(_, s)| s.quality).map(|(i, _)| i);
    }

    let above = playable()
        .filter(|(_, s)| s.height >= target_height)
        .min_by_key(|(_, s)| s.height)
        .map(|(i, _)| i);

    above.or_else(|| {
        playable()
            .filter(|(_, s)| s.height < target_height)
            .max_by_key(|(_, s)| s.height)
            .map(|(i, _)| i)
    })
}

/// Default candidate per the configured quality policy.
pub fn default_stream(
    candidates: &[StreamDescriptor],
    windowed: bool,
    target_height: u32,
    policy: QualityPolicy,
) -> Option<usize> {
    match policy {
        QualityPolicy::Low => lowest_valid(candidates, windowed),
        QualityPolicy::High => highest_valid(candidates, windowed, target_height, false),
        QualityPolicy::Auto => highest_valid(candidates, windowed, target_height, true),
    }
}
