//! Source registry: enumerates capture devices through a backend.
//!
//! Enumeration returns an owned snapshot. Device changes are only
//! observed by enumerating again.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::capture::CaptureBackend;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceKind {
    Camera = 1,
    Screen = 2,
    Audio = 3,
}

impl SourceKind {
    /// Whether sources of this kind produce video frames.
    pub fn is_video(self) -> bool {
        matches!(self, Self::Camera | Self::Screen)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Camera => "camera",
            Self::Screen => "screen",
            Self::Audio => "audio",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A capture device as seen at enumeration time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Source {
    /// Position in the enumeration result.
    pub index: usize,
    pub kind: SourceKind,
    /// Backend-specific opaque identifier.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    pub is_default: bool,
}

/// List the sources of `kind` exposed by `backend`.
///
/// Permission or device failures are not errors here: they are logged
/// and reported as an empty list, meaning "no sources".
pub fn enumerate_sources(backend: &dyn CaptureBackend, kind: SourceKind) -> Vec<Source> {
    if !backend.supports(kind) {
        debug!("capture backend does not support {kind} sources");
        return Vec::new();
    }

    match backend.sources(kind) {
        Ok(mut sources) => {
            sources.retain(|s| s.kind == kind);
            for (index, source) in sources.iter_mut().enumerate() {
                source.index = index;
            }
            sources
        }
        Err(e) => {
            warn!("enumerating {kind} sources failed: {e}");
            Vec::new()
        }
    }
}

/// Pick the source flagged as default, falling back to the first one.
pub fn default_source(sources: &[Source]) -> Option<&Source> {
    sources.iter().find(|s| s.is_default).or_else(|| sources.first())
}
