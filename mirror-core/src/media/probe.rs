//! Hardware-first codec selection.
//!
//! Walks a fixed priority table and returns the first codec the
//! provider reports as usable. The built-in software codec closes the
//! table, so a probe never comes back empty.

use tracing::{debug, info};

use crate::media::{CodecProvider, SOFTWARE_VIDEO_CODEC};

/// Encoder candidates in priority order.
static VIDEO_ENCODER_PRIORITY: &[(&str, &str)] = &[
    ("h264_nvenc", "NVIDIA NVENC"),
    ("h264_qsv", "Intel Quick Sync"),
    ("h264_amf", "AMD AMF"),
    ("h264_videotoolbox", "Apple VideoToolbox"),
    ("libx264", "software x264"),
];

/// Decoder candidates in priority order.
static VIDEO_DECODER_PRIORITY: &[(&str, &str)] = &[
    ("h264_cuvid", "NVIDIA CUVID"),
    ("h264_qsv", "Intel Quick Sync"),
    ("h264_d3d11va", "Direct3D 11 video acceleration"),
    ("h264_videotoolbox", "Apple VideoToolbox"),
    ("h264", "software libavcodec"),
];

/// Best available video encoder id.
pub fn find_video_encoder(provider: &dyn CodecProvider) -> &'static str {
    select(provider, VIDEO_ENCODER_PRIORITY, "encoder")
}

/// Best available video decoder id.
pub fn find_video_decoder(provider: &dyn CodecProvider) -> &'static str {
    select(provider, VIDEO_DECODER_PRIORITY, "decoder")
}

fn select(
    provider: &dyn CodecProvider,
    table: &'static [(&'static str, &'static str)],
    role: &str,
) -> &'static str {
    for (codec, label) in table {
        if provider.supports(codec) {
            info!("selected video {role}: {codec} ({label})");
            return codec;
        }
        debug!("video {role} '{codec}' unavailable, trying next");
    }

    info!("selected video {role}: {SOFTWARE_VIDEO_CODEC} (built-in software)");
    SOFTWARE_VIDEO_CODEC
}
