//! Audio file metadata reading and writing.
//!
//! Uses the lofty crate for format-independent tag access. Every supported
//! container has its own [`TagSource`] implementation; dispatch happens by
//! file extension at the entry point. Missing fields fall back to the
//! filename (title) or constant placeholders, so a bare untagged file still
//! indexes cleanly.

pub mod art;
pub mod sources;

use std::path::{Path, PathBuf};

use crate::library::song::Metadata;
use sources::{
    AsfSource, FlacSource, Mp3Source, Mp4Source, OpusSource, VorbisSource, WavSource,
};

/// Extensions the library indexes and the tag layer understands.
pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    "mp3", "flac", "ogg", "m4a", "aac", "alac", "wav", "opus", "wma",
];

/// Check whether `path` has a supported audio extension (case-insensitive).
pub fn is_supported_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let e = e.to_lowercase();
            SUPPORTED_EXTENSIONS.contains(&e.as_str())
        })
        .unwrap_or(false)
}

/// Tag reading/writing errors.
#[derive(Debug, thiserror::Error)]
pub enum TagError {
    #[error("unsupported extension: {0}")]
    UnsupportedExtension(PathBuf),

    #[error("failed to open {path}: {message}")]
    Open { path: PathBuf, message: String },

    #[error("failed to read tags from {path}: {message}")]
    Read { path: PathBuf, message: String },

    #[error("failed to write tags to {path}: {message}")]
    Write { path: PathBuf, message: String },

    #[error("tag writing is not supported for {0}")]
    WriteUnsupported(PathBuf),

    #[error("failed to cache album art: {0}")]
    Art(std::io::Error),
}

/// One strategy per audio container.
///
/// `parse` reads textual tags and audio properties; `modify` writes edited
/// tags back to the file; `extract_thumbnail` pulls embedded cover art out
/// into `dest` (returning false when the file has none).
pub trait TagSource: Send + Sync {
    fn parse(&self, path: &Path) -> Result<Metadata, TagError>;
    fn modify(&self, path: &Path, metadata: &Metadata) -> Result<(), TagError>;
    fn extract_thumbnail(&self, path: &Path, dest: &Path) -> Result<bool, TagError>;
}

/// Resolve the strategy for a file by its extension.
pub fn source_for(path: &Path) -> Option<&'static dyn TagSource> {
    static MP3: Mp3Source = Mp3Source;
    static FLAC: FlacSource = FlacSource;
    static VORBIS: VorbisSource = VorbisSource;
    static MP4: Mp4Source = Mp4Source;
    static WAV: WavSource = WavSource;
    static OPUS: OpusSource = OpusSource;
    static ASF: AsfSource = AsfSource;

    let ext = path.extension()?.to_str()?.to_lowercase();
    Some(match ext.as_str() {
        "mp3" => &MP3,
        "flac" => &FLAC,
        "ogg" => &VORBIS,
        "m4a" | "aac" | "alac" => &MP4,
        "wav" => &WAV,
        "opus" => &OPUS,
        "wma" => &ASF,
        _ => return None,
    })
}

/// Extraction front end: tag parsing plus the album-art cache.
pub struct TagExtractor {
    art_dir: PathBuf,
}

impl TagExtractor {
    pub fn new(art_dir: impl Into<PathBuf>) -> Self {
        Self {
            art_dir: art_dir.into(),
        }
    }

    /// Read a full [`Metadata`] record for `path`.
    ///
    /// Cover art is extracted to the cache as a side effect; failures there
    /// only leave `art_url` empty and are never fatal.
    pub fn extract(&self, path: &Path) -> Result<Metadata, TagError> {
        let source =
            source_for(path).ok_or_else(|| TagError::UnsupportedExtension(path.to_path_buf()))?;

        let mut metadata = source.parse(path)?;

        match art::cache_embedded_art(source, &self.art_dir, path) {
            Ok(Some(url)) => metadata.art_url = url,
            Ok(None) => {}
            Err(e) => {
                tracing::debug!(
                    target: "tags",
                    path = %path.display(),
                    error = %e,
                    "album art extraction failed"
                );
            }
        }

        Ok(metadata)
    }

    /// Write `metadata`'s textual tags back into the audio file.
    pub fn modify_metadata(&self, path: &Path, metadata: &Metadata) -> Result<(), TagError> {
        let source =
            source_for(path).ok_or_else(|| TagError::UnsupportedExtension(path.to_path_buf()))?;
        source.modify(path, metadata)
    }
}
