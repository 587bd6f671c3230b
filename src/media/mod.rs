//! Media-control surface.
//!
//! [`MediaBackend`] is the narrow interface an OS media-control bridge
//! (MPRIS on Linux) consumes; [`ServiceBackend`] adapts the playback
//! service to it. The souvlaki-driven bridge lives in [`controls`].

pub mod controls;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::player::PlaybackService;

/// What a media-control bridge needs from the player.
///
/// `take_metadata_changed` is the change event: it returns true once per
/// track change and resets, so pollers push fresh metadata exactly when
/// needed.
pub trait MediaBackend: Send + Sync {
    fn play(&self);
    fn pause(&self);
    fn stop(&self);
    fn next(&self);
    fn previous(&self);

    /// Relative seek in seconds (negative = backward).
    fn seek_seconds(&self, offset: f64);
    /// Absolute position in seconds.
    fn set_position_seconds(&self, position: f64);

    fn is_playing(&self) -> bool;
    fn position_seconds(&self) -> f64;
    fn duration_seconds(&self) -> f64;

    fn title(&self) -> String;
    fn artist(&self) -> String;
    fn album(&self) -> String;
    fn art_url(&self) -> String;

    fn volume(&self) -> f64;
    fn set_volume(&self, volume: f64);

    /// True once after each track change.
    fn take_metadata_changed(&self) -> bool;
}

/// [`MediaBackend`] over the playback service.
pub struct ServiceBackend {
    service: Arc<PlaybackService>,
    /// Playlist handle id last reported through the change event
    last_track_id: AtomicU64,
}

impl ServiceBackend {
    pub fn new(service: Arc<PlaybackService>) -> Self {
        Self {
            service,
            last_track_id: AtomicU64::new(0),
        }
    }
}

impl MediaBackend for ServiceBackend {
    fn play(&self) {
        self.service.play_current();
    }

    fn pause(&self) {
        self.service.pause_current();
    }

    fn stop(&self) {
        self.service.shutdown();
    }

    fn next(&self) {
        if let Err(e) = self.service.next_track() {
            tracing::warn!(target: "media", error = %e, "next failed");
        }
    }

    fn previous(&self) {
        if let Err(e) = self.service.previous_track() {
            tracing::warn!(target: "media", error = %e, "previous failed");
        }
    }

    fn seek_seconds(&self, offset: f64) {
        if offset >= 0.0 {
            self.service.seek_forward(offset);
        } else {
            self.service.seek_backward(-offset);
        }
    }

    fn set_position_seconds(&self, position: f64) {
        self.service.seek_absolute(position);
    }

    fn is_playing(&self) -> bool {
        self.service.is_playing()
    }

    fn position_seconds(&self) -> f64 {
        self.service.playback_time().map(|(p, _)| p).unwrap_or(0.0)
    }

    fn duration_seconds(&self) -> f64 {
        self.service.playback_time().map(|(_, l)| l).unwrap_or(0.0)
    }

    fn title(&self) -> String {
        self.service
            .current_metadata()
            .map(|m| m.title)
            .unwrap_or_default()
    }

    fn artist(&self) -> String {
        self.service
            .current_metadata()
            .map(|m| m.artist)
            .unwrap_or_default()
    }

    fn album(&self) -> String {
        self.service
            .current_metadata()
            .map(|m| m.album)
            .unwrap_or_default()
    }

    fn art_url(&self) -> String {
        self.service
            .current_metadata()
            .map(|m| m.art_url)
            .unwrap_or_default()
    }

    fn volume(&self) -> f64 {
        f64::from(self.service.volume())
    }

    fn set_volume(&self, volume: f64) {
        self.service.set_volume(volume as f32);
    }

    fn take_metadata_changed(&self) -> bool {
        let current = self
            .service
            .current_track()
            .map(|h| h.id())
            .unwrap_or(0);
        let previous = self.last_track_id.swap(current, Ordering::AcqRel);
        current != previous
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::song::{Metadata, Song};
    use tempfile::tempdir;

    fn service_with_track(titles: &[&str]) -> (Arc<PlaybackService>, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let service = Arc::new(PlaybackService::default());
        for title in titles {
            let path = dir.path().join(format!("{title}.wav"));
            crate::test_utils::write_test_wav(&path, 300);
            let song = Arc::new(Song::new(
                title.len() as u64,
                Metadata {
                    title: title.to_string(),
                    artist: "Someone".to_string(),
                    album: "Somewhere".to_string(),
                    file_path: path,
                    ..Metadata::default()
                },
            ));
            let h = service.register_track(song);
            service.add_to_playlist(h);
        }
        (service, dir)
    }

    #[test]
    fn test_backend_reports_metadata() {
        let (service, _dir) = service_with_track(&["Tune"]);
        let backend = ServiceBackend::new(Arc::clone(&service));

        assert_eq!(backend.title(), "Tune");
        assert_eq!(backend.artist(), "Someone");
        assert_eq!(backend.album(), "Somewhere");
        assert_eq!(backend.art_url(), "");
    }

    #[test]
    fn test_backend_empty_service() {
        let service = Arc::new(PlaybackService::default());
        let backend = ServiceBackend::new(service);

        assert_eq!(backend.title(), "");
        assert_eq!(backend.position_seconds(), 0.0);
        assert_eq!(backend.duration_seconds(), 0.0);
        assert!(!backend.is_playing());
    }

    #[test]
    fn test_metadata_changed_fires_once_per_change() {
        let (service, _dir) = service_with_track(&["One", "Two"]);
        let backend = ServiceBackend::new(Arc::clone(&service));

        // First observation of a current track counts as a change.
        assert!(backend.take_metadata_changed());
        assert!(!backend.take_metadata_changed());

        service.next_track().unwrap();
        assert!(backend.take_metadata_changed());
        assert!(!backend.take_metadata_changed());

        service.shutdown();
    }

    #[test]
    fn test_volume_roundtrip() {
        let service = Arc::new(PlaybackService::default());
        let backend = ServiceBackend::new(service);
        backend.set_volume(0.5);
        assert!((backend.volume() - 0.5).abs() < 1e-6);
    }
}
