//! Sort plans for the hierarchical song index.
//!
//! A plan names one total order per hierarchy level; applying it reorders
//! every level of the map in place. Application is a pure permutation:
//! the set of songs never changes, only iteration order.

use serde::{Deserialize, Serialize};

use super::{AlbumMap, DiscMap, SongMap, TrackMap};

/// Ordering of the artist level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ArtistMetric {
    #[default]
    LexAsc,
    LexDesc,
}

/// Ordering of the album level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AlbumMetric {
    #[default]
    LexAsc,
    LexDesc,
    /// By earliest release year tagged inside the album, ties broken
    /// lexically by album name.
    YearAsc,
    YearDesc,
}

/// Ordering of the disc level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DiscMetric {
    #[default]
    Asc,
    Desc,
}

/// Ordering of the track level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TrackMetric {
    #[default]
    Asc,
    Desc,
}

impl ArtistMetric {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "lex_asc" => Some(Self::LexAsc),
            "lex_desc" => Some(Self::LexDesc),
            _ => None,
        }
    }
}

impl AlbumMetric {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "lex_asc" => Some(Self::LexAsc),
            "lex_desc" => Some(Self::LexDesc),
            "year_asc" => Some(Self::YearAsc),
            "year_desc" => Some(Self::YearDesc),
            _ => None,
        }
    }
}

impl DiscMetric {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "disc_asc" => Some(Self::Asc),
            "disc_desc" => Some(Self::Desc),
            _ => None,
        }
    }
}

impl TrackMetric {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "track_asc" => Some(Self::Asc),
            "track_desc" => Some(Self::Desc),
            _ => None,
        }
    }
}

/// One total order per level of the song map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SortPlan {
    pub artist: ArtistMetric,
    pub album: AlbumMetric,
    pub disc: DiscMetric,
    pub track: TrackMetric,
}

impl SortPlan {
    /// Resolve metric names into a plan.
    ///
    /// Unknown names warn and fall back to the ascending default for that
    /// level.
    pub fn from_names(artist: &str, album: &str, disc: &str, track: &str) -> Self {
        Self {
            artist: parse_or_default(artist, ArtistMetric::parse, "artist"),
            album: parse_or_default(album, AlbumMetric::parse, "album"),
            disc: parse_or_default(disc, DiscMetric::parse, "disc"),
            track: parse_or_default(track, TrackMetric::parse, "track"),
        }
    }
}

fn parse_or_default<T: Default>(name: &str, parse: fn(&str) -> Option<T>, level: &str) -> T {
    match parse(name) {
        Some(metric) => metric,
        None => {
            tracing::warn!(
                target: "library::sort",
                level,
                name,
                "unknown sort metric, falling back to ascending default"
            );
            T::default()
        }
    }
}

/// Earliest tagged year inside an album (0 when nothing is tagged).
fn album_year(discs: &DiscMap) -> u32 {
    discs
        .values()
        .flat_map(|tracks| tracks.values())
        .flat_map(|inodes| inodes.values())
        .map(|song| song.metadata.year)
        .filter(|&y| y > 0)
        .min()
        .unwrap_or(0)
}

fn lex_cmp(a: &str, b: &str) -> std::cmp::Ordering {
    let folded = a.to_lowercase().cmp(&b.to_lowercase());
    // Stable tie-break so "Abc" and "abc" keep a deterministic order.
    folded.then_with(|| a.cmp(b))
}

/// Reorder every level of `map` according to `plan`.
///
/// Holding the write side of the library lock across this call is the
/// caller's responsibility.
pub fn apply_sort_plan(map: &mut SongMap, plan: &SortPlan) {
    map.sort_by(|a, _, b, _| match plan.artist {
        ArtistMetric::LexAsc => lex_cmp(a, b),
        ArtistMetric::LexDesc => lex_cmp(b, a),
    });

    for albums in map.values_mut() {
        sort_albums(albums, plan);
    }

    tracing::debug!(target: "library::sort", ?plan, "applied sort plan");
}

fn sort_albums(albums: &mut AlbumMap, plan: &SortPlan) {
    albums.sort_by(|a_name, a_discs, b_name, b_discs| match plan.album {
        AlbumMetric::LexAsc => lex_cmp(a_name, b_name),
        AlbumMetric::LexDesc => lex_cmp(b_name, a_name),
        AlbumMetric::YearAsc => album_year(a_discs)
            .cmp(&album_year(b_discs))
            .then_with(|| lex_cmp(a_name, b_name)),
        AlbumMetric::YearDesc => album_year(b_discs)
            .cmp(&album_year(a_discs))
            .then_with(|| lex_cmp(a_name, b_name)),
    });

    for discs in albums.values_mut() {
        sort_discs(discs, plan);
    }
}

fn sort_discs(discs: &mut DiscMap, plan: &SortPlan) {
    discs.sort_by(|a, _, b, _| match plan.disc {
        DiscMetric::Asc => a.cmp(b),
        DiscMetric::Desc => b.cmp(a),
    });

    for tracks in discs.values_mut() {
        sort_tracks(tracks, plan);
    }
}

fn sort_tracks(tracks: &mut TrackMap, plan: &SortPlan) {
    tracks.sort_by(|a, _, b, _| match plan.track {
        TrackMetric::Asc => a.cmp(b),
        TrackMetric::Desc => b.cmp(a),
    });

    // Innermost level keeps its natural key order regardless of plan.
    for inodes in tracks.values_mut() {
        inodes.sort_by(|a, _, b, _| a.cmp(b));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::insert_song;
    use crate::library::song::{Metadata, Song};

    fn song(artist: &str, album: &str, disc: u32, track: u32, inode: u64, year: u32) -> Song {
        Song::new(
            inode,
            Metadata {
                title: format!("t{inode}"),
                artist: artist.to_string(),
                album: album.to_string(),
                disc,
                track,
                year,
                ..Metadata::default()
            },
        )
    }

    fn collect_artists(map: &SongMap) -> Vec<&str> {
        map.keys().map(String::as_str).collect()
    }

    fn count_songs(map: &SongMap) -> usize {
        map.values()
            .flat_map(|a| a.values())
            .flat_map(|d| d.values())
            .flat_map(|t| t.values())
            .count()
    }

    #[test]
    fn test_artist_lex_orders() {
        let mut map = SongMap::default();
        for artist in ["Zed", "Apex", "Mid"] {
            insert_song(&mut map, song(artist, "A", 1, 1, 1, 0));
        }

        apply_sort_plan(&mut map, &SortPlan::default());
        assert_eq!(collect_artists(&map), vec!["Apex", "Mid", "Zed"]);

        let desc = SortPlan {
            artist: ArtistMetric::LexDesc,
            ..SortPlan::default()
        };
        apply_sort_plan(&mut map, &desc);
        assert_eq!(collect_artists(&map), vec!["Zed", "Mid", "Apex"]);
    }

    #[test]
    fn test_album_year_order() {
        let mut map = SongMap::default();
        insert_song(&mut map, song("A", "Newer", 1, 1, 1, 2020));
        insert_song(&mut map, song("A", "Older", 1, 1, 2, 1999));
        insert_song(&mut map, song("A", "Untagged", 1, 1, 3, 0));

        let plan = SortPlan {
            album: AlbumMetric::YearAsc,
            ..SortPlan::default()
        };
        apply_sort_plan(&mut map, &plan);

        let albums: Vec<&str> = map["A"].keys().map(String::as_str).collect();
        // Untagged year sorts as 0, i.e. first in ascending order.
        assert_eq!(albums, vec!["Untagged", "Older", "Newer"]);
    }

    #[test]
    fn test_track_and_disc_order() {
        let mut map = SongMap::default();
        insert_song(&mut map, song("A", "X", 2, 2, 1, 0));
        insert_song(&mut map, song("A", "X", 1, 3, 2, 0));
        insert_song(&mut map, song("A", "X", 1, 1, 3, 0));

        apply_sort_plan(&mut map, &SortPlan::default());

        let discs: Vec<u32> = map["A"]["X"].keys().copied().collect();
        assert_eq!(discs, vec![1, 2]);
        let tracks: Vec<u32> = map["A"]["X"][&1].keys().copied().collect();
        assert_eq!(tracks, vec![1, 3]);
    }

    #[test]
    fn test_sort_is_permutation() {
        let mut map = SongMap::default();
        let inodes = [11u64, 7, 23, 5, 19];
        for (i, inode) in inodes.iter().enumerate() {
            insert_song(
                &mut map,
                song(
                    ["Zed", "Apex", "Mid"][i % 3],
                    ["One", "Two"][i % 2],
                    (i as u32 % 2) + 1,
                    i as u32 + 1,
                    *inode,
                    1990 + i as u32,
                ),
            );
        }
        let before = count_songs(&map);

        for plan in [
            SortPlan::default(),
            SortPlan {
                artist: ArtistMetric::LexDesc,
                album: AlbumMetric::YearDesc,
                disc: DiscMetric::Desc,
                track: TrackMetric::Desc,
            },
        ] {
            apply_sort_plan(&mut map, &plan);
            assert_eq!(count_songs(&map), before);
        }
    }

    #[test]
    fn test_metric_parsing() {
        assert_eq!(ArtistMetric::parse("lex_desc"), Some(ArtistMetric::LexDesc));
        assert_eq!(AlbumMetric::parse("year_desc"), Some(AlbumMetric::YearDesc));
        assert_eq!(DiscMetric::parse("disc_asc"), Some(DiscMetric::Asc));
        assert_eq!(TrackMetric::parse("bogus"), None);

        let plan = SortPlan::from_names("nope", "nope", "nope", "nope");
        assert_eq!(plan, SortPlan::default());
    }
}
