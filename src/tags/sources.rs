//! Per-container tag strategies.
//!
//! lofty does the heavy lifting for every container it understands; the
//! strategies share helpers for the common read/write path and only
//! diverge where the container actually behaves differently. WMA/ASF has
//! no lofty backend, so that strategy degrades to filename-derived
//! metadata and refuses writes.

use std::path::Path;

use lofty::config::WriteOptions;
use lofty::file::{AudioFile, TaggedFile, TaggedFileExt};
use lofty::probe::Probe;
use lofty::tag::{Accessor, ItemKey, Tag, TagExt};

use super::{TagError, TagSource};
use crate::library::song::Metadata;

fn read_tagged(path: &Path) -> Result<TaggedFile, TagError> {
    Probe::open(path)
        .map_err(|e| TagError::Open {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?
        .read()
        .map_err(|e| TagError::Read {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
}

/// Title fallback when the tag is empty: the file stem.
fn title_from_filename(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

/// The shared read path: tags with placeholder fallbacks plus audio
/// properties.
fn read_common(path: &Path) -> Result<Metadata, TagError> {
    let tagged = read_tagged(path)?;
    let tag = tagged.primary_tag().or_else(|| tagged.first_tag());

    let mut meta = Metadata {
        file_path: path.to_path_buf(),
        ..Metadata::default()
    };

    if let Some(tag) = tag {
        if let Some(title) = tag.title() {
            if !title.is_empty() {
                meta.title = title.into_owned();
            }
        }
        if let Some(artist) = tag.artist() {
            if !artist.is_empty() {
                meta.artist = artist.into_owned();
            }
        }
        if let Some(album) = tag.album() {
            if !album.is_empty() {
                meta.album = album.into_owned();
            }
        }
        if let Some(genre) = tag.genre() {
            if !genre.is_empty() {
                meta.genre = genre.into_owned();
            }
        }
        if let Some(comment) = tag.comment() {
            if !comment.is_empty() {
                meta.comment = comment.into_owned();
            }
        }
        meta.year = tag.year().unwrap_or(0);
        meta.track = tag.track().unwrap_or(0);
        meta.track_total = tag.track_total().unwrap_or(0);
        meta.disc = tag.disk().unwrap_or(0);
        meta.disc_total = tag.disk_total().unwrap_or(0);
        if let Some(lyrics) = tag.get_string(&ItemKey::Lyrics) {
            if !lyrics.is_empty() {
                meta.lyrics = lyrics.to_string();
            }
        }
    }

    if meta.title.is_empty() {
        meta.title = title_from_filename(path);
    }

    let properties = tagged.properties();
    meta.duration = properties.duration().as_secs_f32();
    meta.bitrate = properties
        .audio_bitrate()
        .or_else(|| properties.overall_bitrate())
        .unwrap_or(0);

    Ok(meta)
}

/// The shared write path: rewrite the file's primary tag from `metadata`.
fn write_common(path: &Path, metadata: &Metadata) -> Result<(), TagError> {
    let mut tagged = read_tagged(path)?;
    let tag_type = tagged.primary_tag_type();

    let tag = if let Some(tag) = tagged.tag_mut(tag_type) {
        tag
    } else {
        tagged.insert_tag(Tag::new(tag_type));
        tagged
            .tag_mut(tag_type)
            .expect("tag was just inserted")
    };

    tag.set_title(metadata.title.clone());
    tag.set_artist(metadata.artist.clone());
    tag.set_album(metadata.album.clone());
    tag.set_genre(metadata.genre.clone());
    tag.set_comment(metadata.comment.clone());
    if metadata.year > 0 {
        tag.set_year(metadata.year);
    }
    if metadata.track > 0 {
        tag.set_track(metadata.track);
    }
    if metadata.track_total > 0 {
        tag.set_track_total(metadata.track_total);
    }
    if metadata.disc > 0 {
        tag.set_disk(metadata.disc);
    }
    if metadata.disc_total > 0 {
        tag.set_disk_total(metadata.disc_total);
    }
    if !metadata.lyrics.is_empty() {
        tag.insert_text(ItemKey::Lyrics, metadata.lyrics.clone());
    }

    tag.save_to_path(path, WriteOptions::default())
        .map_err(|e| TagError::Write {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
}

/// Pull the front cover (or first picture) out of the file's tags.
pub(super) fn embedded_picture(path: &Path) -> Result<Option<Vec<u8>>, TagError> {
    let tagged = read_tagged(path)?;
    let Some(tag) = tagged.primary_tag().or_else(|| tagged.first_tag()) else {
        return Ok(None);
    };

    let pictures = tag.pictures();
    let picture = pictures
        .iter()
        .find(|p| p.pic_type() == lofty::picture::PictureType::CoverFront)
        .or_else(|| pictures.first());

    Ok(picture.map(|p| p.data().to_vec()))
}

fn write_picture_to(path: &Path, dest: &Path) -> Result<bool, TagError> {
    match embedded_picture(path)? {
        Some(data) => {
            if let Some(dir) = dest.parent() {
                std::fs::create_dir_all(dir).map_err(TagError::Art)?;
            }
            std::fs::write(dest, data).map_err(TagError::Art)?;
            Ok(true)
        }
        None => Ok(false),
    }
}

/// MP3 (ID3v2).
pub struct Mp3Source;

impl TagSource for Mp3Source {
    fn parse(&self, path: &Path) -> Result<Metadata, TagError> {
        read_common(path)
    }

    fn modify(&self, path: &Path, metadata: &Metadata) -> Result<(), TagError> {
        write_common(path, metadata)
    }

    fn extract_thumbnail(&self, path: &Path, dest: &Path) -> Result<bool, TagError> {
        write_picture_to(path, dest)
    }
}

/// FLAC (Vorbis comments + FLAC picture blocks).
pub struct FlacSource;

impl TagSource for FlacSource {
    fn parse(&self, path: &Path) -> Result<Metadata, TagError> {
        read_common(path)
    }

    fn modify(&self, path: &Path, metadata: &Metadata) -> Result<(), TagError> {
        write_common(path, metadata)
    }

    fn extract_thumbnail(&self, path: &Path, dest: &Path) -> Result<bool, TagError> {
        write_picture_to(path, dest)
    }
}

/// OGG Vorbis.
pub struct VorbisSource;

impl TagSource for VorbisSource {
    fn parse(&self, path: &Path) -> Result<Metadata, TagError> {
        read_common(path)
    }

    fn modify(&self, path: &Path, metadata: &Metadata) -> Result<(), TagError> {
        write_common(path, metadata)
    }

    fn extract_thumbnail(&self, path: &Path, dest: &Path) -> Result<bool, TagError> {
        write_picture_to(path, dest)
    }
}

/// Opus in OGG.
pub struct OpusSource;

impl TagSource for OpusSource {
    fn parse(&self, path: &Path) -> Result<Metadata, TagError> {
        read_common(path)
    }

    fn modify(&self, path: &Path, metadata: &Metadata) -> Result<(), TagError> {
        write_common(path, metadata)
    }

    fn extract_thumbnail(&self, path: &Path, dest: &Path) -> Result<bool, TagError> {
        write_picture_to(path, dest)
    }
}

/// MP4 family: m4a containers holding AAC or ALAC.
pub struct Mp4Source;

impl TagSource for Mp4Source {
    fn parse(&self, path: &Path) -> Result<Metadata, TagError> {
        read_common(path)
    }

    fn modify(&self, path: &Path, metadata: &Metadata) -> Result<(), TagError> {
        write_common(path, metadata)
    }

    fn extract_thumbnail(&self, path: &Path, dest: &Path) -> Result<bool, TagError> {
        write_picture_to(path, dest)
    }
}

/// WAV (RIFF INFO and/or ID3 chunks; frequently untagged).
pub struct WavSource;

impl TagSource for WavSource {
    fn parse(&self, path: &Path) -> Result<Metadata, TagError> {
        read_common(path)
    }

    fn modify(&self, path: &Path, metadata: &Metadata) -> Result<(), TagError> {
        write_common(path, metadata)
    }

    fn extract_thumbnail(&self, path: &Path, dest: &Path) -> Result<bool, TagError> {
        write_picture_to(path, dest)
    }
}

/// WMA/ASF. No tag backend available; metadata degrades to the filename
/// and writes are refused.
pub struct AsfSource;

impl TagSource for AsfSource {
    fn parse(&self, path: &Path) -> Result<Metadata, TagError> {
        Ok(Metadata {
            title: title_from_filename(path),
            file_path: path.to_path_buf(),
            ..Metadata::default()
        })
    }

    fn modify(&self, path: &Path, _metadata: &Metadata) -> Result<(), TagError> {
        Err(TagError::WriteUnsupported(path.to_path_buf()))
    }

    fn extract_thumbnail(&self, _path: &Path, _dest: &Path) -> Result<bool, TagError> {
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_title_from_filename() {
        assert_eq!(title_from_filename(Path::new("/a/b/Song Name.mp3")), "Song Name");
        assert_eq!(title_from_filename(Path::new("noext")), "noext");
    }

    #[test]
    fn test_wav_roundtrip_write_read() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("track.wav");
        crate::test_utils::write_test_wav(&path, 300);

        let mut meta = read_common(&path).unwrap();
        meta.title = "Written Title".to_string();
        meta.artist = "Written Artist".to_string();
        meta.track = 4;
        WavSource.modify(&path, &meta).unwrap();

        let back = WavSource.parse(&path).unwrap();
        assert_eq!(back.title, "Written Title");
        assert_eq!(back.artist, "Written Artist");
        assert_eq!(back.track, 4);
    }

    #[test]
    fn test_asf_refuses_writes() {
        let result = AsfSource.modify(Path::new("x.wma"), &Metadata::default());
        assert!(matches!(result, Err(TagError::WriteUnsupported(_))));
    }

    #[test]
    fn test_thumbnail_absent_returns_false() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("plain.wav");
        crate::test_utils::write_test_wav(&path, 100);

        let dest = dir.path().join("art").join("cover.jpg");
        let wrote = WavSource.extract_thumbnail(&path, &dest).unwrap();
        assert!(!wrote);
        assert!(!dest.exists());
    }
}
