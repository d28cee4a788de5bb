//! Target format registry.
//!
//! The set of output formats is closed: FLAC, Opus, MP3 and Vorbis. Each one
//! carries a numeric identifier (the codec id understood by the engine), a
//! canonical file extension and the container it is muxed into. Opus and
//! Vorbis are both Ogg streams and therefore share the `.ogg` extension.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::session::SessionError;

/// Raw numeric format identifier as passed across the host boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FormatId(pub u32);

impl fmt::Display for FormatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for FormatId {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

impl From<TargetFormat> for FormatId {
    fn from(format: TargetFormat) -> Self {
        format.id()
    }
}

/// Supported output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetFormat {
    /// Free Lossless Audio Codec (lossless)
    Flac,
    /// Opus in an Ogg container
    Opus,
    /// MPEG Audio Layer III
    Mp3,
    /// Vorbis in an Ogg container
    Vorbis,
}

/// Container an encoded stream is written into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerKind {
    /// Native FLAC stream.
    Flac,
    /// Ogg (Opus, Vorbis).
    Ogg,
    /// Raw MPEG audio frames with ID3 tags.
    Mp3,
}

impl ContainerKind {
    /// Returns the ffmpeg muxer name for this container.
    pub fn ffmpeg_muxer(&self) -> &'static str {
        match self {
            Self::Flac => "flac",
            Self::Ogg => "ogg",
            Self::Mp3 => "mp3",
        }
    }
}

/// Static description of a target format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatSpec {
    pub format: TargetFormat,
    pub id: FormatId,
    /// Canonical extension including the leading dot.
    pub extension: &'static str,
    pub container: ContainerKind,
    /// Encoder the engine is asked to use.
    pub encoder: &'static str,
    pub lossless: bool,
}

static FORMATS: [FormatSpec; 4] = [
    FormatSpec {
        format: TargetFormat::Flac,
        id: FormatId(86028),
        extension: ".flac",
        container: ContainerKind::Flac,
        encoder: "flac",
        lossless: true,
    },
    FormatSpec {
        format: TargetFormat::Opus,
        id: FormatId(86076),
        extension: ".ogg",
        container: ContainerKind::Ogg,
        encoder: "libopus",
        lossless: false,
    },
    FormatSpec {
        format: TargetFormat::Mp3,
        id: FormatId(86017),
        extension: ".mp3",
        container: ContainerKind::Mp3,
        encoder: "libmp3lame",
        lossless: false,
    },
    FormatSpec {
        format: TargetFormat::Vorbis,
        id: FormatId(86021),
        extension: ".ogg",
        container: ContainerKind::Ogg,
        encoder: "libvorbis",
        lossless: false,
    },
];

impl TargetFormat {
    /// All supported formats, in registry order.
    pub const ALL: [TargetFormat; 4] = [Self::Flac, Self::Opus, Self::Mp3, Self::Vorbis];

    /// Returns the registry entry for this format.
    pub fn spec(&self) -> &'static FormatSpec {
        match self {
            Self::Flac => &FORMATS[0],
            Self::Opus => &FORMATS[1],
            Self::Mp3 => &FORMATS[2],
            Self::Vorbis => &FORMATS[3],
        }
    }

    /// Returns the numeric identifier of this format.
    pub fn id(&self) -> FormatId {
        self.spec().id
    }

    /// Returns the canonical extension, including the leading dot.
    pub fn extension(&self) -> &'static str {
        self.spec().extension
    }

    /// Returns the ffmpeg encoder name for this format.
    pub fn encoder(&self) -> &'static str {
        self.spec().encoder
    }

    /// Returns the container this format is written into.
    pub fn container(&self) -> ContainerKind {
        self.spec().container
    }

    /// Whether this format is lossless.
    pub fn is_lossless(&self) -> bool {
        self.spec().lossless
    }

    /// Maps a raw identifier to a format.
    pub fn from_id(id: impl Into<FormatId>) -> Option<Self> {
        FormatRegistry::resolve(id).ok().map(|spec| spec.format)
    }

    /// Parses a user-facing format name (`flac`, `opus`, `mp3`, `vorbis`).
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "flac" => Some(Self::Flac),
            "opus" => Some(Self::Opus),
            "mp3" => Some(Self::Mp3),
            "vorbis" | "ogg" => Some(Self::Vorbis),
            _ => None,
        }
    }
}

impl fmt::Display for TargetFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Flac => "flac",
            Self::Opus => "opus",
            Self::Mp3 => "mp3",
            Self::Vorbis => "vorbis",
        };
        f.write_str(name)
    }
}

/// Lookup table keyed by numeric format identifier.
pub struct FormatRegistry;

impl FormatRegistry {
    /// Resolves a raw identifier to its registry entry.
    ///
    /// Any identifier outside the closed set is rejected with
    /// [`SessionError::UnsupportedFormat`].
    pub fn resolve(id: impl Into<FormatId>) -> Result<&'static FormatSpec, SessionError> {
        let id = id.into();
        FORMATS
            .iter()
            .find(|spec| spec.id == id)
            .ok_or(SessionError::UnsupportedFormat { id })
    }

    /// Returns every registry entry.
    pub fn all() -> &'static [FormatSpec] {
        &FORMATS
    }
}
