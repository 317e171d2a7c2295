//! Configuration for the loopback diagnostic.

use std::path::Path;

use serde::{Deserialize, Serialize};

use mirror_core::{AudioEncoderOptions, DEFAULT_MTU, MirrorOptions, VideoEncoderOptions};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopbackConfig {
    pub network: NetworkConfig,
    pub video: VideoConfig,
    pub audio: AudioConfig,
    pub logging: LoggingConfig,
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// UDP port the receiver listens on. 0 picks a free port.
    pub port: u16,
    /// Multicast group used when `multicast` is set.
    pub group: String,
    /// Send to the multicast group instead of unicast loopback.
    pub multicast: bool,
    pub mtu: usize,
    /// Stream id shared by the sender and the receiver.
    pub stream_id: u32,
}

/// Video pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    pub enabled: bool,
    /// Codec id. Empty selects the best codec the probe finds.
    pub codec: String,
    pub width: u32,
    pub height: u32,
    pub fps: u8,
    pub key_frame_interval: u32,
    /// Target bit rate in bits per second.
    pub bit_rate: u64,
}

/// Audio pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub enabled: bool,
    pub sample_rate: u64,
    pub bit_rate: u64,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
    /// Seconds between stats lines.
    pub stats_interval_secs: u64,
    /// Stop after this many seconds. 0 runs until Ctrl-C.
    pub duration_secs: u64,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            port: 8088,
            group: "239.0.0.1".into(),
            multicast: false,
            mtu: DEFAULT_MTU,
            stream_id: 1,
        }
    }
}

impl Default for VideoConfig {
    fn default() -> Self {
        let encoder = VideoEncoderOptions::default();
        Self {
            enabled: true,
            codec: String::new(),
            width: encoder.width,
            height: encoder.height,
            fps: encoder.frame_rate,
            key_frame_interval: encoder.key_frame_interval,
            bit_rate: encoder.bit_rate,
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        let encoder = AudioEncoderOptions::default();
        Self {
            enabled: true,
            sample_rate: encoder.sample_rate,
            bit_rate: encoder.bit_rate,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            stats_interval_secs: 2,
            duration_secs: 0,
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl LoopbackConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => Self::parse(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// The default configuration as pretty TOML.
    pub fn default_toml() -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(&Self::default())
    }

    /// Options of the receiving session: listens on loopback.
    pub fn receiver_options(&self) -> MirrorOptions {
        let bind = if self.network.multicast {
            format!("0.0.0.0:{}", self.network.port)
        } else {
            format!("127.0.0.1:{}", self.network.port)
        };
        MirrorOptions {
            multicast: self.network.group.clone(),
            mtu: self.network.mtu,
            bind: Some(bind),
            ..Default::default()
        }
    }

    /// Options of the sending session, aimed at the receiver's `port`.
    pub fn sender_options(&self, port: u16) -> MirrorOptions {
        MirrorOptions {
            server: format!("127.0.0.1:{port}"),
            multicast: self.network.group.clone(),
            mtu: self.network.mtu,
            ..Default::default()
        }
    }

    /// Video encoder settings, using `probed` when no codec is configured.
    pub fn video_encoder(&self, probed: &str) -> VideoEncoderOptions {
        let codec = if self.video.codec.is_empty() {
            probed.to_string()
        } else {
            self.video.codec.clone()
        };
        VideoEncoderOptions {
            codec,
            frame_rate: self.video.fps,
            width: self.video.width,
            height: self.video.height,
            bit_rate: self.video.bit_rate,
            key_frame_interval: self.video.key_frame_interval,
        }
    }

    pub fn audio_encoder(&self) -> AudioEncoderOptions {
        AudioEncoderOptions {
            sample_rate: self.audio.sample_rate,
            bit_rate: self.audio.bit_rate,
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
