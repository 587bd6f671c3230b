//! Library build: walk, extract, index, sort, persist.
//!
//! Tag extraction dominates build time, so it runs in parallel over the
//! walked file list; insertion stays sequential to keep the map order
//! deterministic before the sort plan is applied. A file whose tags cannot
//! be read is skipped with a warning and never aborts the build.

use rayon::prelude::*;
use std::collections::HashSet;
use std::path::Path;

use super::song::Song;
use super::sort::SortPlan;
use super::walker::{SymlinkPolicy, Walker};
use super::{LibraryError, SongMap, insert_song, store};
use crate::tags::TagExtractor;

/// Build a fresh index from `root`.
pub fn build(
    root: &Path,
    plan: &SortPlan,
    extractor: &TagExtractor,
) -> Result<SongMap, LibraryError> {
    if !root.is_dir() {
        return Err(LibraryError::RootMissing(root.to_path_buf()));
    }

    let files = Walker::new(root)
        .with_policy(SymlinkPolicy::Ignore)
        .files();

    let songs: Vec<Song> = files
        .par_iter()
        .filter_map(|file| match extractor.extract(&file.path) {
            Ok(metadata) => Some(Song::new(file.inode, metadata)),
            Err(e) => {
                tracing::warn!(
                    target: "library::builder",
                    path = %file.path.display(),
                    error = %e,
                    "skipping file with unreadable tags"
                );
                None
            }
        })
        .collect();

    let mut map = SongMap::default();
    let mut seen = HashSet::new();
    for song in songs {
        // Hard links resolve to one inode; index the first path only.
        if !seen.insert(song.inode) {
            tracing::debug!(
                target: "library::builder",
                inode = song.inode,
                path = %song.metadata.file_path.display(),
                "duplicate inode, skipping"
            );
            continue;
        }
        insert_song(&mut map, song);
    }

    super::sort::apply_sort_plan(&mut map, plan);

    tracing::info!(
        target: "library::builder",
        root = %root.display(),
        artists = map.len(),
        "library build complete"
    );
    Ok(map)
}

/// Load the cached index, or rebuild when the cache is missing, stale,
/// unreadable, or was built from a different directory.
///
/// Rebuilding is idempotent, so a partially written cache file is harmless:
/// it fails to decode and gets regenerated.
pub fn load_or_build(
    index_path: &Path,
    root: &Path,
    plan: &SortPlan,
    extractor: &TagExtractor,
) -> Result<SongMap, LibraryError> {
    match store::load(index_path) {
        Ok(record) if record.music_dir == root => {
            tracing::debug!(target: "library::builder", "using cached library index");
            return Ok(record.songs);
        }
        Ok(record) => {
            tracing::info!(
                target: "library::builder",
                cached = %record.music_dir.display(),
                configured = %root.display(),
                "library directory changed, rebuilding"
            );
        }
        Err(e) => {
            tracing::debug!(target: "library::builder", error = %e, "cache unusable, rebuilding");
        }
    }

    let map = build(root, plan, extractor)?;
    store::save(index_path, root, &map)?;
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::song::Metadata;
    use crate::library::{insert_song as insert, store};
    use tempfile::tempdir;

    fn extractor_for(dir: &Path) -> TagExtractor {
        TagExtractor::new(dir.join("art"))
    }

    #[test]
    fn test_build_missing_root_fails() {
        let cache = tempdir().unwrap();
        let result = build(
            Path::new("/nonexistent-music"),
            &SortPlan::default(),
            &extractor_for(cache.path()),
        );
        assert!(matches!(result, Err(LibraryError::RootMissing(_))));
    }

    #[test]
    fn test_build_skips_unreadable_files() {
        let music = tempdir().unwrap();
        let cache = tempdir().unwrap();
        // Garbage bytes behind an audio extension: skipped with a warning.
        std::fs::write(music.path().join("fake.mp3"), b"not audio").unwrap();
        std::fs::write(music.path().join("ignored.txt"), b"text").unwrap();
        crate::test_utils::write_test_wav(&music.path().join("real.wav"), 200);

        let map = build(
            music.path(),
            &SortPlan::default(),
            &extractor_for(cache.path()),
        )
        .unwrap();

        let titles: Vec<String> = map
            .values()
            .flat_map(|a| a.values())
            .flat_map(|d| d.values())
            .flat_map(|t| t.values())
            .map(|s| s.metadata.title.clone())
            .collect();
        assert_eq!(titles, vec!["real".to_string()]);
    }

    #[test]
    fn test_load_or_build_rebuilds_on_dir_change() {
        let dir_a = tempdir().unwrap();
        let dir_b = tempdir().unwrap();
        let cache = tempdir().unwrap();
        let index = cache.path().join("lib.bin");

        // Simulate a cache built from dir A containing "Alpha".
        let mut cached = SongMap::default();
        insert(
            &mut cached,
            crate::library::Song::new(
                1,
                Metadata {
                    title: "Alpha".to_string(),
                    ..Metadata::default()
                },
            ),
        );
        store::save(&index, dir_a.path(), &cached).unwrap();

        // Dir B contains one untagged track; its title falls back to the
        // file stem "Bravo".
        crate::test_utils::write_test_wav(&dir_b.path().join("Bravo.wav"), 100);

        let map = load_or_build(
            &index,
            dir_b.path(),
            &SortPlan::default(),
            &extractor_for(cache.path()),
        )
        .unwrap();

        let titles: Vec<String> = map
            .values()
            .flat_map(|a| a.values())
            .flat_map(|d| d.values())
            .flat_map(|t| t.values())
            .map(|s| s.metadata.title.clone())
            .collect();
        assert!(titles.iter().any(|t| t.contains("Bravo")));
        assert!(!titles.iter().any(|t| t.contains("Alpha")));

        // The rebuilt index was persisted for dir B.
        let reloaded = store::load(&index).unwrap();
        assert_eq!(reloaded.music_dir, dir_b.path());
    }

    #[test]
    fn test_load_or_build_uses_matching_cache() {
        let music = tempdir().unwrap();
        let cache = tempdir().unwrap();
        let index = cache.path().join("lib.bin");

        let mut cached = SongMap::default();
        insert(
            &mut cached,
            crate::library::Song::new(
                42,
                Metadata {
                    title: "Cached".to_string(),
                    ..Metadata::default()
                },
            ),
        );
        store::save(&index, music.path(), &cached).unwrap();

        let map = load_or_build(
            &index,
            music.path(),
            &SortPlan::default(),
            &extractor_for(cache.path()),
        )
        .unwrap();
        assert_eq!(map, cached);
    }

    #[test]
    fn test_load_or_build_recovers_from_corrupt_cache() {
        let music = tempdir().unwrap();
        let cache = tempdir().unwrap();
        let index = cache.path().join("lib.bin");
        std::fs::write(&index, b"garbage").unwrap();

        let map = load_or_build(
            &index,
            music.path(),
            &SortPlan::default(),
            &extractor_for(cache.path()),
        )
        .unwrap();
        assert!(map.is_empty());
    }
}
