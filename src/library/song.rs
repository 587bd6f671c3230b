//! Core data model for the music library.
//!
//! A [`Song`] is identified by the filesystem inode of its audio file at
//! index-build time; the inode is the stable key inside the hierarchical
//! index so two files with identical tags still coexist.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Placeholder used when a file carries no artist tag.
pub const UNKNOWN_ARTIST: &str = "<Unknown Artist>";
/// Placeholder used when a file carries no album tag.
pub const UNKNOWN_ALBUM: &str = "Unknown Album";
/// Placeholder used when a file carries no genre tag.
pub const UNKNOWN_GENRE: &str = "Unknown Genre";
/// Placeholder used when a file carries no comment tag.
pub const NO_COMMENT: &str = "No Comment";
/// Placeholder used when a file carries no lyrics tag.
pub const NO_LYRICS: &str = "No Lyrics";

/// Tag and audio-property metadata for one track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub genre: String,
    pub comment: String,
    pub year: u32,
    pub track: u32,
    pub track_total: u32,
    pub disc: u32,
    pub disc_total: u32,
    /// Duration in seconds (0.0 when unreadable)
    pub duration: f32,
    /// Bitrate in kbps (0 when unreadable)
    pub bitrate: u32,
    pub file_path: PathBuf,
    pub lyrics: String,
    /// `file://` URI of the cached album art, empty when none
    pub art_url: String,
}

impl Default for Metadata {
    fn default() -> Self {
        Self {
            title: String::new(),
            artist: UNKNOWN_ARTIST.to_string(),
            album: UNKNOWN_ALBUM.to_string(),
            genre: UNKNOWN_GENRE.to_string(),
            comment: NO_COMMENT.to_string(),
            year: 0,
            track: 0,
            track_total: 0,
            disc: 0,
            disc_total: 0,
            duration: 0.0,
            bitrate: 0,
            file_path: PathBuf::new(),
            lyrics: NO_LYRICS.to_string(),
            art_url: String::new(),
        }
    }
}

impl Metadata {
    /// Disc number as an index key (1 when unknown).
    pub fn disc_key(&self) -> u32 {
        self.disc.max(1)
    }

    /// Track number as an index key (1 when unknown).
    pub fn track_key(&self) -> u32 {
        self.track.max(1)
    }
}

/// A song in the library: a stable inode key plus its metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Song {
    pub inode: u64,
    pub metadata: Metadata,
}

impl Song {
    pub fn new(inode: u64, metadata: Metadata) -> Self {
        Self { inode, metadata }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_defaults() {
        let meta = Metadata::default();
        assert_eq!(meta.artist, UNKNOWN_ARTIST);
        assert_eq!(meta.album, UNKNOWN_ALBUM);
        assert_eq!(meta.duration, 0.0);
        assert_eq!(meta.bitrate, 0);
        assert!(meta.art_url.is_empty());
    }

    #[test]
    fn test_index_keys_floor_at_one() {
        let meta = Metadata::default();
        assert_eq!(meta.disc_key(), 1);
        assert_eq!(meta.track_key(), 1);

        let tagged = Metadata {
            disc: 2,
            track: 7,
            ..Metadata::default()
        };
        assert_eq!(tagged.disc_key(), 2);
        assert_eq!(tagged.track_key(), 7);
    }
}
