//! The music library index.
//!
//! The authoritative in-memory structure is the [`SongMap`]: an ordered
//! hierarchy `artist → album → disc → track → inode → Song`. The innermost
//! inode level guarantees that two files with identical tags coexist.
//! [`Library`] wraps the map in a read/write lock so the UI and the
//! playback service can iterate while a rebuild or re-sort is pending.

pub mod builder;
pub mod fuzzy;
pub mod song;
pub mod sort;
pub mod store;
pub mod walker;

use indexmap::IndexMap;
use parking_lot::RwLock;
use std::path::PathBuf;

pub use song::{Metadata, Song};

use crate::tags::{TagError, TagExtractor};

/// inode → song (innermost level; natural key order).
pub type InodeMap = IndexMap<u64, Song>;
/// track number → inode map.
pub type TrackMap = IndexMap<u32, InodeMap>;
/// disc number → track map.
pub type DiscMap = IndexMap<u32, TrackMap>;
/// album name → disc map.
pub type AlbumMap = IndexMap<String, DiscMap>;
/// artist name → album map. The canonical hierarchical index.
pub type SongMap = IndexMap<String, AlbumMap>;

/// Errors from building, storing or editing the library.
#[derive(Debug, thiserror::Error)]
pub enum LibraryError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("library index encode/decode failed: {0}")]
    Codec(#[from] bincode::Error),

    #[error("library root {0} is not a directory")]
    RootMissing(PathBuf),

    #[error("song with inode {0} not found in the index")]
    SongNotFound(u64),

    #[error(transparent)]
    Tag(#[from] TagError),
}

/// Insert a song at `artist/album/disc/track/inode`.
pub fn insert_song(map: &mut SongMap, song: Song) {
    let meta = &song.metadata;
    map.entry(meta.artist.clone())
        .or_default()
        .entry(meta.album.clone())
        .or_default()
        .entry(meta.disc_key())
        .or_default()
        .entry(meta.track_key())
        .or_default()
        .insert(song.inode, song);
}

/// Remove a song by its full position; prunes emptied levels.
pub fn remove_song(map: &mut SongMap, song: &Song) -> Option<Song> {
    let meta = &song.metadata;
    let albums = map.get_mut(&meta.artist)?;
    let discs = albums.get_mut(&meta.album)?;
    let tracks = discs.get_mut(&meta.disc_key())?;
    let inodes = tracks.get_mut(&meta.track_key())?;

    let removed = inodes.shift_remove(&song.inode)?;

    if inodes.is_empty() {
        tracks.shift_remove(&meta.track_key());
    }
    if tracks.is_empty() {
        discs.shift_remove(&meta.disc_key());
    }
    if discs.is_empty() {
        albums.shift_remove(&meta.album);
    }
    if albums.is_empty() {
        map.shift_remove(&meta.artist);
    }

    Some(removed)
}

/// The shared, lockable library.
pub struct Library {
    map: RwLock<SongMap>,
}

impl Default for Library {
    fn default() -> Self {
        Self::new(SongMap::default())
    }
}

impl Library {
    pub fn new(map: SongMap) -> Self {
        Self {
            map: RwLock::new(map),
        }
    }

    /// Run `f` under the read lock.
    pub fn with_read<R>(&self, f: impl FnOnce(&SongMap) -> R) -> R {
        f(&self.map.read())
    }

    /// Run `f` under the write lock.
    pub fn with_write<R>(&self, f: impl FnOnce(&mut SongMap) -> R) -> R {
        f(&mut self.map.write())
    }

    /// Swap in a freshly built map.
    pub fn replace(&self, new_map: SongMap) {
        *self.map.write() = new_map;
    }

    /// Deep copy of the current map.
    pub fn snapshot(&self) -> SongMap {
        self.map.read().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.map.read().is_empty()
    }

    /// Add one song under the write lock.
    pub fn insert(&self, song: Song) {
        insert_song(&mut self.map.write(), song);
    }

    /// Reorder every level according to `plan` (write-locked).
    pub fn apply_sort_plan(&self, plan: &sort::SortPlan) {
        sort::apply_sort_plan(&mut self.map.write(), plan);
    }

    // ---- read-locked iteration -------------------------------------------

    pub fn for_each_artist(&self, mut f: impl FnMut(&str, &AlbumMap)) {
        let map = self.map.read();
        for (artist, albums) in map.iter() {
            f(artist, albums);
        }
    }

    pub fn for_each_album(&self, mut f: impl FnMut(&str, &str, &DiscMap)) {
        let map = self.map.read();
        for (artist, albums) in map.iter() {
            for (album, discs) in albums.iter() {
                f(artist, album, discs);
            }
        }
    }

    pub fn for_each_disc(&self, mut f: impl FnMut(&str, &str, u32, &TrackMap)) {
        let map = self.map.read();
        for (artist, albums) in map.iter() {
            for (album, discs) in albums.iter() {
                for (disc, tracks) in discs.iter() {
                    f(artist, album, *disc, tracks);
                }
            }
        }
    }

    pub fn for_each_song(&self, mut f: impl FnMut(&str, &str, u32, u32, u64, &Song)) {
        let map = self.map.read();
        for (artist, albums) in map.iter() {
            for (album, discs) in albums.iter() {
                for (disc, tracks) in discs.iter() {
                    for (track, inodes) in tracks.iter() {
                        for (inode, song) in inodes.iter() {
                            f(artist, album, *disc, *track, *inode, song);
                        }
                    }
                }
            }
        }
    }

    /// Songs of one artist only: `(album, disc, track, inode, song)`.
    ///
    /// Single key lookup under the read lock; a missing artist iterates
    /// nothing.
    pub fn for_each_song_in_artist(
        &self,
        artist: &str,
        mut f: impl FnMut(&str, u32, u32, u64, &Song),
    ) {
        let map = self.map.read();
        let Some(albums) = map.get(artist) else {
            return;
        };
        for (album, discs) in albums.iter() {
            for (disc, tracks) in discs.iter() {
                for (track, inodes) in tracks.iter() {
                    for (inode, song) in inodes.iter() {
                        f(album, *disc, *track, *inode, song);
                    }
                }
            }
        }
    }

    /// Songs of one album only: `(artist, disc, track, inode, song)`.
    pub fn for_each_song_in_album(
        &self,
        artist: &str,
        album: &str,
        mut f: impl FnMut(&str, u32, u32, u64, &Song),
    ) {
        let map = self.map.read();
        let Some(discs) = map.get(artist).and_then(|albums| albums.get(album)) else {
            return;
        };
        for (disc, tracks) in discs.iter() {
            for (track, inodes) in tracks.iter() {
                for (inode, song) in inodes.iter() {
                    f(artist, *disc, *track, *inode, song);
                }
            }
        }
    }

    // ---- counts ----------------------------------------------------------

    pub fn count_artists(&self) -> usize {
        self.map.read().len()
    }

    pub fn count_albums(&self) -> usize {
        self.map.read().values().map(|a| a.len()).sum()
    }

    pub fn count_discs(&self) -> usize {
        self.map
            .read()
            .values()
            .flat_map(|a| a.values())
            .map(|d| d.len())
            .sum()
    }

    pub fn count_tracks(&self) -> usize {
        let mut total = 0;
        self.for_each_song(|_, _, _, _, _, _| total += 1);
        total
    }

    // ---- queries ---------------------------------------------------------

    /// First song whose title equals `title` (case-insensitive).
    pub fn find_song_by_title(&self, title: &str) -> Option<Song> {
        let mut found = None;
        self.for_each_song(|_, _, _, _, _, song| {
            if found.is_none() && song.metadata.title.eq_ignore_ascii_case(title) {
                found = Some(song.clone());
            }
        });
        found
    }

    /// First song matching both artist and title (case-insensitive).
    pub fn find_song_by_title_and_artist(&self, artist: &str, title: &str) -> Option<Song> {
        let mut found = None;
        self.for_each_song(|a, _, _, _, _, song| {
            if found.is_none()
                && a.eq_ignore_ascii_case(artist)
                && song.metadata.title.eq_ignore_ascii_case(title)
            {
                found = Some(song.clone());
            }
        });
        found
    }

    /// Nearest title by Levenshtein distance, accepted when the distance is
    /// at most `max_dist`. Equal distances keep the first song encountered
    /// in iteration order.
    pub fn find_song_by_title_fuzzy(&self, title: &str, max_dist: usize) -> Option<Song> {
        let mut best: Option<(usize, Song)> = None;
        self.for_each_song(|_, _, _, _, _, song| {
            let dist = fuzzy::levenshtein(&song.metadata.title, title);
            if dist <= max_dist && best.as_ref().is_none_or(|(d, _)| dist < *d) {
                best = Some((dist, song.clone()));
            }
        });
        best.map(|(_, song)| song)
    }

    /// Album names of one artist, in map order.
    pub fn albums_by_artist(&self, artist: &str) -> Vec<String> {
        let map = self.map.read();
        map.iter()
            .find(|(a, _)| a.eq_ignore_ascii_case(artist))
            .map(|(_, albums)| albums.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// All songs of one album, in map order.
    pub fn songs_by_album(&self, artist: &str, album: &str) -> Vec<Song> {
        let mut songs = Vec::new();
        self.for_each_song(|a, al, _, _, _, song| {
            if a.eq_ignore_ascii_case(artist) && al.eq_ignore_ascii_case(album) {
                songs.push(song.clone());
            }
        });
        songs
    }

    /// Every song in map order (the order the playlist is filled with).
    pub fn all_songs(&self) -> Vec<Song> {
        let mut songs = Vec::new();
        self.for_each_song(|_, _, _, _, _, song| songs.push(song.clone()));
        songs
    }

    // ---- mutation --------------------------------------------------------

    /// Replace `old` with `new` in the map and persist `new`'s tags to the
    /// audio file through `extractor`.
    ///
    /// Both steps happen under a single write lock so readers never observe
    /// the in-between state.
    pub fn replace_song(
        &self,
        old: &Song,
        new: Song,
        extractor: &TagExtractor,
    ) -> Result<(), LibraryError> {
        let mut map = self.map.write();

        if remove_song(&mut map, old).is_none() {
            return Err(LibraryError::SongNotFound(old.inode));
        }

        extractor.modify_metadata(&new.metadata.file_path.clone(), &new.metadata)?;
        insert_song(&mut map, new);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use song::Metadata;

    fn song(artist: &str, album: &str, title: &str, inode: u64) -> Song {
        Song::new(
            inode,
            Metadata {
                title: title.to_string(),
                artist: artist.to_string(),
                album: album.to_string(),
                track: 1,
                disc: 1,
                ..Metadata::default()
            },
        )
    }

    fn sample_library() -> Library {
        let lib = Library::default();
        lib.insert(song("Apex", "One", "Alpha", 1));
        lib.insert(song("Apex", "One", "Bravo", 2));
        lib.insert(song("Apex", "Two", "Charlie", 3));
        lib.insert(song("Zed", "Solo", "Delta", 4));
        lib
    }

    #[test]
    fn test_counts() {
        let lib = sample_library();
        assert_eq!(lib.count_artists(), 2);
        assert_eq!(lib.count_albums(), 3);
        assert_eq!(lib.count_discs(), 3);
        assert_eq!(lib.count_tracks(), 4);
    }

    #[test]
    fn test_identical_position_coexists_by_inode() {
        let lib = Library::default();
        // Same artist/album/disc/track, different files.
        let mut a = song("A", "X", "Same", 10);
        a.metadata.track = 1;
        let mut b = song("A", "X", "Same", 11);
        b.metadata.track = 1;
        lib.insert(a);
        lib.insert(b);

        assert_eq!(lib.count_tracks(), 2);
    }

    #[test]
    fn test_find_by_title_case_insensitive() {
        let lib = sample_library();
        let hit = lib.find_song_by_title("bRaVo").unwrap();
        assert_eq!(hit.inode, 2);
        assert!(lib.find_song_by_title("Missing").is_none());
    }

    #[test]
    fn test_find_by_title_and_artist() {
        let lib = sample_library();
        let hit = lib.find_song_by_title_and_artist("zed", "delta").unwrap();
        assert_eq!(hit.inode, 4);
        assert!(lib.find_song_by_title_and_artist("Apex", "Delta").is_none());
    }

    #[test]
    fn test_fuzzy_find_respects_max_dist() {
        let lib = sample_library();
        // "Alpho" is distance 1 from "Alpha".
        let hit = lib.find_song_by_title_fuzzy("Alpho", 2).unwrap();
        assert_eq!(hit.inode, 1);
        assert!(lib.find_song_by_title_fuzzy("Zzzzzzz", 2).is_none());
    }

    #[test]
    fn test_fuzzy_find_prefers_nearest() {
        let lib = Library::default();
        lib.insert(song("A", "X", "Stone", 1));
        lib.insert(song("A", "X", "Stones", 2));
        // Exact match wins over distance-1 match.
        let hit = lib.find_song_by_title_fuzzy("Stones", 3).unwrap();
        assert_eq!(hit.inode, 2);
    }

    #[test]
    fn test_for_each_song_in_artist_is_scoped() {
        let lib = sample_library();

        let mut seen = Vec::new();
        lib.for_each_song_in_artist("Apex", |album, _, _, inode, song| {
            seen.push((album.to_string(), inode, song.metadata.title.clone()));
        });

        assert_eq!(seen.len(), 3);
        assert!(seen.iter().all(|(album, _, _)| album == "One" || album == "Two"));
        assert!(!seen.iter().any(|(_, _, title)| title == "Delta"));

        // Unknown artist iterates nothing.
        let mut count = 0;
        lib.for_each_song_in_artist("Nobody", |_, _, _, _, _| count += 1);
        assert_eq!(count, 0);
    }

    #[test]
    fn test_for_each_song_in_album_is_scoped() {
        let lib = sample_library();

        let mut titles = Vec::new();
        lib.for_each_song_in_album("Apex", "One", |artist, _, _, _, song| {
            assert_eq!(artist, "Apex");
            titles.push(song.metadata.title.clone());
        });
        assert_eq!(titles, vec!["Alpha", "Bravo"]);

        // Album under a different artist does not match.
        let mut count = 0;
        lib.for_each_song_in_album("Zed", "One", |_, _, _, _, _| count += 1);
        assert_eq!(count, 0);
    }

    #[test]
    fn test_albums_and_songs_queries() {
        let lib = sample_library();
        assert_eq!(lib.albums_by_artist("apex"), vec!["One", "Two"]);
        let songs = lib.songs_by_album("Apex", "One");
        assert_eq!(songs.len(), 2);
        assert!(lib.songs_by_album("Apex", "Nope").is_empty());
    }

    #[test]
    fn test_remove_song_prunes_empty_levels() {
        let lib = sample_library();
        let target = lib.find_song_by_title("Delta").unwrap();
        lib.with_write(|map| {
            assert!(remove_song(map, &target).is_some());
            assert!(!map.contains_key("Zed"));
        });
        assert_eq!(lib.count_tracks(), 3);
    }

    #[test]
    fn test_concurrent_reads_during_sort() {
        use std::sync::Arc;

        let lib = Arc::new(sample_library());
        let writer_lib = Arc::clone(&lib);

        let writer = std::thread::spawn(move || {
            for i in 0..200 {
                let plan = if i % 2 == 0 {
                    sort::SortPlan::default()
                } else {
                    sort::SortPlan {
                        artist: sort::ArtistMetric::LexDesc,
                        ..sort::SortPlan::default()
                    }
                };
                writer_lib.apply_sort_plan(&plan);
            }
        });

        // Readers always observe a complete permutation, never a torn map.
        for _ in 0..200 {
            let mut count = 0;
            lib.for_each_song(|_, _, _, _, _, _| count += 1);
            assert_eq!(count, 4);
        }

        writer.join().unwrap();
    }

    #[test]
    fn test_reader_sees_new_order_after_sort() {
        let lib = sample_library();
        lib.apply_sort_plan(&sort::SortPlan {
            artist: sort::ArtistMetric::LexDesc,
            ..sort::SortPlan::default()
        });

        let mut artists = Vec::new();
        lib.for_each_artist(|a, _| artists.push(a.to_string()));
        assert_eq!(artists, vec!["Zed", "Apex"]);
    }
}
