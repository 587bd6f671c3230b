//! OS media-controls bridge via souvlaki (MPRIS on Linux).
//!
//! Runs on its own thread: pushes metadata and playback state from the
//! [`MediaBackend`] into the OS controls, and feeds key presses and seek
//! requests back into it. The bridge only ever talks to the backend
//! trait, never to the service directly.

use souvlaki::{
    MediaControlEvent, MediaControls, MediaMetadata, MediaPlayback, MediaPosition,
    PlatformConfig, SeekDirection,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use super::MediaBackend;

/// Relative seek step for media-key seek events, in seconds.
const SEEK_STEP_SECS: f64 = 5.0;

/// Handle to the running bridge; dropping it shuts the thread down.
pub struct MediaBridge {
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl MediaBridge {
    /// Spawn the bridge thread for `backend`.
    ///
    /// Returns `None` when the platform controls are unavailable (e.g. no
    /// D-Bus session); the player carries on without them.
    pub fn spawn(backend: Arc<dyn MediaBackend>) -> Option<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let thread_running = Arc::clone(&running);

        let thread = std::thread::Builder::new()
            .name("media-controls".to_string())
            .spawn(move || {
                if let Err(e) = run_bridge(backend, &thread_running) {
                    tracing::warn!(target: "media::controls", error = %e, "media controls unavailable");
                }
            })
            .ok()?;

        Some(Self {
            running,
            thread: Some(thread),
        })
    }

    pub fn shutdown(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for MediaBridge {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_bridge(backend: Arc<dyn MediaBackend>, running: &AtomicBool) -> Result<(), String> {
    let config = PlatformConfig {
        dbus_name: "inlimbo",
        display_name: "inLimbo",
        hwnd: None,
    };

    let mut controls =
        MediaControls::new(config).map_err(|e| format!("failed to create controls: {e:?}"))?;

    let event_backend = Arc::clone(&backend);
    controls
        .attach(move |event: MediaControlEvent| {
            tracing::debug!(target: "media::controls", ?event, "media control event");
            match event {
                MediaControlEvent::Play => event_backend.play(),
                MediaControlEvent::Pause => event_backend.pause(),
                MediaControlEvent::Toggle => {
                    if event_backend.is_playing() {
                        event_backend.pause();
                    } else {
                        event_backend.play();
                    }
                }
                MediaControlEvent::Stop => event_backend.stop(),
                MediaControlEvent::Next => event_backend.next(),
                MediaControlEvent::Previous => event_backend.previous(),
                MediaControlEvent::Seek(direction) => {
                    let step = match direction {
                        SeekDirection::Forward => SEEK_STEP_SECS,
                        SeekDirection::Backward => -SEEK_STEP_SECS,
                    };
                    event_backend.seek_seconds(step);
                }
                MediaControlEvent::SeekBy(direction, amount) => {
                    let secs = amount.as_secs_f64();
                    let step = match direction {
                        SeekDirection::Forward => secs,
                        SeekDirection::Backward => -secs,
                    };
                    event_backend.seek_seconds(step);
                }
                MediaControlEvent::SetPosition(position) => {
                    event_backend.set_position_seconds(position.0.as_secs_f64());
                }
                MediaControlEvent::SetVolume(volume) => event_backend.set_volume(volume),
                MediaControlEvent::OpenUri(_)
                | MediaControlEvent::Raise
                | MediaControlEvent::Quit => {}
            }
        })
        .map_err(|e| format!("failed to attach handler: {e:?}"))?;

    tracing::info!(target: "media::controls", "media controls attached");

    let mut was_playing = false;
    while running.load(Ordering::Acquire) {
        if backend.take_metadata_changed() {
            let title = backend.title();
            let artist = backend.artist();
            let album = backend.album();
            let art_url = backend.art_url();
            let duration = backend.duration_seconds();

            let metadata = MediaMetadata {
                title: Some(title.as_str()),
                artist: Some(artist.as_str()),
                album: Some(album.as_str()),
                duration: (duration > 0.0).then(|| Duration::from_secs_f64(duration)),
                cover_url: (!art_url.is_empty()).then_some(art_url.as_str()),
            };
            if let Err(e) = controls.set_metadata(metadata) {
                tracing::debug!(target: "media::controls", error = ?e, "set_metadata failed");
            }
        }

        let playing = backend.is_playing();
        if playing != was_playing || backend.is_playing() {
            let progress = Some(MediaPosition(Duration::from_secs_f64(
                backend.position_seconds().max(0.0),
            )));
            let playback = if playing {
                MediaPlayback::Playing { progress }
            } else {
                MediaPlayback::Paused { progress }
            };
            if let Err(e) = controls.set_playback(playback) {
                tracing::debug!(target: "media::controls", error = ?e, "set_playback failed");
            }
            was_playing = playing;
        }

        std::thread::sleep(Duration::from_millis(250));
    }

    Ok(())
}
