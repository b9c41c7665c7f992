//! ffprobe invocation and output parsing.

use std::process::Command;

use tracing::{debug, info, warn};

use wallplayer_config::HevcMode;

use crate::cache::ProbeCache;
use crate::descriptor::{printable_url, StreamDescriptor, StreamProps};

/// Probes candidate URLs, serving results from the persisted cache where
/// possible.
pub struct Prober {
    cache: ProbeCache,
    hevc_mode: HevcMode,
}

impl Prober {
    pub fn new(cache: ProbeCache, hevc_mode: HevcMode) -> Self {
        Self { cache, hevc_mode }
    }

    /// Probe one URL. Never fails: an unreachable or unsupported stream
    /// yields an invalid descriptor.
    pub fn probe(&mut self, url: &str) -> StreamDescriptor {
        let key = printable_url(url);

        if let Some(props) = self.cache.get(&key) {
            debug!(url = %key, "stream properties served from cache");
            return StreamDescriptor::new(url.to_string(), props.clone(), self.hevc_mode);
        }

        // Most cameras speak TCP; fall back to UDP only when that fails.
        for transport in ["tcp", "udp"] {
            match self.run_ffprobe(url, transport) {
                Some(mut props) => {
                    props.force_udp = transport == "udp";

                    info!(
                        url = %key,
                        codec = %props.codec,
                        width = props.width,
                        height = props.height,
                        framerate = props.framerate,
                        "stream probed"
                    );

                    self.cache.insert(key, props.clone());
                    return StreamDescriptor::new(url.to_string(), props, self.hevc_mode);
                }
                None => {
                    if !url.starts_with("rtsp://") {
                        // Transport retry only applies to RTSP.
                        break;
                    }
                }
            }
        }

        warn!(url = %key, "probe failed, stream marked unplayable");
        StreamDescriptor::invalid(url.to_string())
    }

    /// Drop all cached entries, forcing fresh probes.
    pub fn rebuild_cache(&mut self) {
        self.cache.clear();
    }

    fn run_ffprobe(&self, url: &str, transport: &str) -> Option<StreamProps> {
        let mut cmd = Command::new("ffprobe");
        cmd.args([
            "-v",
            "error",
            "-show_entries",
            "stream=codec_type,codec_name,width,height,avg_frame_rate",
        ]);

        if url.starts_with("rtsp://") {
            cmd.args(["-rtsp_transport", transport]);
        }

        cmd.arg(url);

        let output = match cmd.output() {
            Ok(output) => output,
            Err(e) => {
                warn!("ffprobe invocation failed: {}", e);
                return None;
            }
        };

        if !output.status.success() {
            return None;
        }

        parse_ffprobe_output(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Parse ffprobe's default `[STREAM]` block output into stream properties.
/// Returns `None` when no video stream is present.
pub(crate) fn parse_ffprobe_output(text: &str) -> Option<StreamProps> {
    let mut props = StreamProps::default();
    let mut video_found = false;

    for block in text.split("[STREAM]") {
        let is_video = block.contains("codec_type=video");
        let is_audio = block.contains("codec_type=audio");

        if is_audio {
            props.audio = true;
        }

        if !is_video || video_found {
            continue;
        }
        video_found = true;

        for line in block.lines() {
            let Some((key, value)) = line.trim().split_once('=') else {
                continue;
            };

            match key {
                "codec_name" => props.codec = value.to_string(),
                "width" => props.width = value.parse().unwrap_or(0),
                "height" => props.height = value.parse().unwrap_or(0),
                "avg_frame_rate" => props.framerate = parse_frame_rate(value),
                _ => {}
            }
        }
    }

    video_found.then_some(props)
}

/// ffprobe reports the frame rate as a fraction, possibly `0/0`.
fn parse_frame_rate(value: &str) -> u32 {
    let Some((num, den)) = value.split_once('/') else {
        return value.parse().unwrap_or(0);
    };

    let num: u32 = num.parse().unwrap_or(0);
    let den: u32 = den.parse().unwrap_or(0);

    if den == 0 {
        0
    } else {
        num / den
    }
}
