//! Binary persistence of the library index (`lib.bin`).
//!
//! The file carries the music directory it was built from next to the song
//! map; loaders compare that directory against the configured one and force
//! a rebuild on mismatch. Any decode failure also falls back to a rebuild,
//! so a truncated or stale cache can never abort startup.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use super::{LibraryError, SongMap};

/// On-disk layout of `lib.bin`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryFile {
    /// Root the index was built from
    pub music_dir: PathBuf,
    /// The serialized hierarchy
    pub songs: SongMap,
}

/// Serialize the index to `path`.
pub fn save(path: &Path, music_dir: &Path, songs: &SongMap) -> Result<(), LibraryError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| LibraryError::Io {
            path: dir.to_path_buf(),
            source: e,
        })?;
    }

    let file = File::create(path).map_err(|e| LibraryError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;

    let record = LibraryFile {
        music_dir: music_dir.to_path_buf(),
        songs: songs.clone(),
    };
    bincode::serialize_into(BufWriter::new(file), &record)?;

    tracing::info!(target: "library::store", path = %path.display(), "library index saved");
    Ok(())
}

/// Deserialize the index from `path`.
pub fn load(path: &Path) -> Result<LibraryFile, LibraryError> {
    let file = File::open(path).map_err(|e| LibraryError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;

    let record: LibraryFile = bincode::deserialize_from(BufReader::new(file))?;
    tracing::info!(
        target: "library::store",
        path = %path.display(),
        music_dir = %record.music_dir.display(),
        "library index loaded"
    );
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::insert_song;
    use crate::library::song::{Metadata, Song};
    use tempfile::tempdir;

    fn sample_map() -> SongMap {
        let mut map = SongMap::default();
        for (inode, title) in [(1u64, "Alpha"), (2, "Bravo")] {
            insert_song(
                &mut map,
                Song::new(
                    inode,
                    Metadata {
                        title: title.to_string(),
                        artist: "Artist".to_string(),
                        album: "Album".to_string(),
                        track: inode as u32,
                        disc: 1,
                        year: 2001,
                        duration: 123.5,
                        bitrate: 320,
                        ..Metadata::default()
                    },
                ),
            );
        }
        map
    }

    #[test]
    fn test_roundtrip_is_identity() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("lib.bin");
        let map = sample_map();

        save(&path, Path::new("/music"), &map).unwrap();
        let loaded = load(&path).unwrap();

        assert_eq!(loaded.music_dir, PathBuf::from("/music"));
        assert_eq!(loaded.songs, map);
    }

    #[test]
    fn test_roundtrip_preserves_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("lib.bin");

        let mut map = SongMap::default();
        for artist in ["Zed", "Apex", "Mid"] {
            insert_song(
                &mut map,
                Song::new(
                    artist.len() as u64,
                    Metadata {
                        title: artist.to_string(),
                        artist: artist.to_string(),
                        ..Metadata::default()
                    },
                ),
            );
        }

        save(&path, Path::new("/music"), &map).unwrap();
        let loaded = load(&path).unwrap();

        let before: Vec<&String> = map.keys().collect();
        let after: Vec<&String> = loaded.songs.keys().collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_missing_file_errors() {
        let result = load(Path::new("/nonexistent/lib.bin"));
        assert!(matches!(result, Err(LibraryError::Io { .. })));
    }

    #[test]
    fn test_corrupt_file_errors() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("lib.bin");
        std::fs::write(&path, b"definitely not bincode").unwrap();

        let result = load(&path);
        assert!(matches!(result, Err(LibraryError::Codec(_))));
    }
}
