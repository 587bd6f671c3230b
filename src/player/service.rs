//! Playback service: the concurrency boundary in front of the engine.
//!
//! A single mutex serializes every control path. The service owns the
//! handle table mapping opaque [`Handle`]s to `Arc<Song>`; the playlist
//! holds only handles, so observers can still resolve a handle after the
//! track leaves the playlist. Volume is the one exception to the mutex:
//! it is an atomic on the engine and readable lock-free.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::library::{Metadata, Song};

use super::EngineError;
use super::engine::{AudioEngine, BackendInfo, DeviceInfo, VolumeCtl};
use super::playlist::{Handle, Playlist};

/// Monotonic snapshot id; observers compare it instead of deep-comparing
/// metadata.
static TID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Playback service errors.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// A handle that was never minted (or whose entry vanished) was
    /// dereferenced. This is a logic error in the caller, not a user
    /// condition.
    #[error("invalid track handle {0} (logic error)")]
    HandleInvalid(u64),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Point-in-time view of the playing track.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackSnapshot {
    pub position_sec: f64,
    pub length_sec: f64,
    pub playing: bool,
    pub sample_rate: u32,
    pub channels: u32,
    pub format: String,
    /// Monotonically increasing id, fresh per query
    pub tid: u64,
}

struct ServiceInner {
    engine: AudioEngine,
    table: HashMap<u64, Arc<Song>>,
    playlist: Playlist,
    next_handle_id: u64,
}

/// Mutex-guarded façade over the engine and the track table.
pub struct PlaybackService {
    inner: Mutex<ServiceInner>,
    volume: Arc<VolumeCtl>,
}

impl Default for PlaybackService {
    fn default() -> Self {
        Self::new(AudioEngine::new())
    }
}

impl PlaybackService {
    pub fn new(engine: AudioEngine) -> Self {
        let volume = engine.volume_ctl();
        Self {
            inner: Mutex::new(ServiceInner {
                engine,
                table: HashMap::new(),
                playlist: Playlist::new(),
                next_handle_id: 1,
            }),
            volume,
        }
    }

    // ---- device ----------------------------------------------------------

    pub fn enumerate_devices(&self) -> Vec<DeviceInfo> {
        AudioEngine::enumerate_devices()
    }

    pub fn init_device(&self, device: &str) -> Result<(), EngineError> {
        self.inner.lock().engine.init_for_device(device)
    }

    pub fn switch_device(&self, device: &str) {
        self.inner.lock().engine.switch_device(device);
    }

    pub fn backend_info(&self) -> BackendInfo {
        self.inner.lock().engine.backend_info()
    }

    // ---- track registration & playlist -----------------------------------

    /// Mint a handle for `song` and retain it in the table.
    ///
    /// The entry outlives playlist membership: a handle stays resolvable
    /// for the service lifetime.
    pub fn register_track(&self, song: Arc<Song>) -> Handle {
        let mut inner = self.inner.lock();
        let id = inner.next_handle_id;
        inner.next_handle_id += 1;
        inner.table.insert(id, song);
        Handle::new(id)
    }

    pub fn add_to_playlist(&self, handle: Handle) {
        self.inner.lock().playlist.push(handle);
    }

    /// Remove playlist entry `index`.
    ///
    /// Removing the current track stops the engine and starts the track
    /// that slid into the slot (or stays stopped on an emptied playlist).
    pub fn remove_from_playlist(&self, index: usize) -> Result<(), ServiceError> {
        let mut inner = self.inner.lock();

        if index >= inner.playlist.len() {
            return Ok(());
        }
        let removing_current = index == inner.playlist.current_index();

        inner.playlist.remove_at(index);

        if removing_current {
            inner.engine.stop();
            if !inner.playlist.is_empty() {
                load_current_locked(&mut inner)?;
                inner.engine.play();
            }
        }
        Ok(())
    }

    pub fn clear_playlist(&self) {
        self.inner.lock().playlist.clear();
    }

    pub fn playlist_len(&self) -> usize {
        self.inner.lock().playlist.len()
    }

    pub fn current_index(&self) -> usize {
        self.inner.lock().playlist.current_index()
    }

    pub fn current_track(&self) -> Option<Handle> {
        self.inner.lock().playlist.current_track()
    }

    // ---- transport -------------------------------------------------------

    /// Load the current playlist entry and play it. No-op on an empty
    /// playlist.
    pub fn start(&self) -> Result<(), ServiceError> {
        let mut inner = self.inner.lock();
        if inner.playlist.is_empty() {
            return Ok(());
        }
        load_current_locked(&mut inner)?;
        inner.engine.play();
        Ok(())
    }

    pub fn play_current(&self) {
        self.inner.lock().engine.play();
    }

    pub fn pause_current(&self) {
        self.inner.lock().engine.pause();
    }

    /// Reload the current track from the top and play.
    pub fn restart(&self) -> Result<(), ServiceError> {
        let mut inner = self.inner.lock();
        if inner.playlist.is_empty() {
            return Ok(());
        }
        load_current_locked(&mut inner)?;
        inner.engine.play();
        Ok(())
    }

    /// Advance the playlist, load and play. `None` on an empty playlist.
    pub fn next_track(&self) -> Result<Option<Handle>, ServiceError> {
        let mut inner = self.inner.lock();
        let Some(handle) = inner.playlist.next() else {
            return Ok(None);
        };
        load_current_locked(&mut inner)?;
        inner.engine.play();
        Ok(Some(handle))
    }

    /// Advance the playlist and queue the new track for gapless hand-off.
    /// The engine keeps running; the output thread swaps on ring drain.
    pub fn next_track_gapless(&self) -> Result<Option<Handle>, ServiceError> {
        let mut inner = self.inner.lock();
        let Some(handle) = inner.playlist.next() else {
            return Ok(None);
        };
        queue_handle_locked(&mut inner, handle)?;
        Ok(Some(handle))
    }

    /// Step back, load and play. `None` on an empty playlist.
    pub fn previous_track(&self) -> Result<Option<Handle>, ServiceError> {
        let mut inner = self.inner.lock();
        let Some(handle) = inner.playlist.previous() else {
            return Ok(None);
        };
        load_current_locked(&mut inner)?;
        inner.engine.play();
        Ok(Some(handle))
    }

    /// Step back and queue for gapless hand-off.
    pub fn previous_track_gapless(&self) -> Result<Option<Handle>, ServiceError> {
        let mut inner = self.inner.lock();
        let Some(handle) = inner.playlist.previous() else {
            return Ok(None);
        };
        queue_handle_locked(&mut inner, handle)?;
        Ok(Some(handle))
    }

    /// Jump to a uniformly random playlist position, load and play.
    pub fn random_track(&self) -> Result<Option<Handle>, ServiceError> {
        let mut inner = self.inner.lock();
        let Some(handle) = inner.playlist.jump_to_random() else {
            return Ok(None);
        };
        tracing::trace!(target: "player::service", id = handle.id(), "random track selected");
        load_current_locked(&mut inner)?;
        inner.engine.play();
        Ok(Some(handle))
    }

    pub fn is_playing(&self) -> bool {
        self.inner.lock().engine.is_playing()
    }

    // ---- seek & volume ---------------------------------------------------

    pub fn seek_absolute(&self, seconds: f64) {
        self.inner.lock().engine.seek_absolute(seconds);
    }

    pub fn seek_forward(&self, seconds: f64) {
        self.inner.lock().engine.seek_forward(seconds);
    }

    pub fn seek_backward(&self, seconds: f64) {
        self.inner.lock().engine.seek_backward(seconds);
    }

    /// Lock-free volume write (engine-side atomic).
    pub fn set_volume(&self, volume: f32) {
        self.volume.set(volume);
    }

    /// Lock-free volume read.
    pub fn volume(&self) -> f32 {
        self.volume.get()
    }

    // ---- observation -----------------------------------------------------

    pub fn is_track_finished(&self) -> bool {
        self.inner.lock().engine.is_track_finished()
    }

    pub fn clear_track_finished_flag(&self) {
        self.inner.lock().engine.clear_track_finished_flag();
    }

    pub fn playback_time(&self) -> Option<(f64, f64)> {
        self.inner.lock().engine.playback_time()
    }

    /// Visualization tap sequence number.
    pub fn copy_seq(&self) -> u64 {
        self.inner.lock().engine.copy_seq()
    }

    /// Snapshot of position/format state, stamped with a fresh `tid`.
    pub fn current_track_info(&self) -> Option<TrackSnapshot> {
        let inner = self.inner.lock();
        let (position_sec, length_sec) = inner.engine.playback_time()?;
        let backend = inner.engine.backend_info();

        Some(TrackSnapshot {
            position_sec,
            length_sec,
            playing: inner.engine.is_playing(),
            sample_rate: backend.sample_rate,
            channels: backend.channels,
            format: backend.format_name,
            tid: TID_COUNTER.fetch_add(1, Ordering::Relaxed),
        })
    }

    /// Metadata of the current playlist entry.
    pub fn current_metadata(&self) -> Option<Metadata> {
        let inner = self.inner.lock();
        let handle = inner.playlist.current_track()?;
        inner
            .table
            .get(&handle.id())
            .map(|song| song.metadata.clone())
    }

    /// Metadata at playlist position `index`.
    pub fn metadata_at(&self, index: usize) -> Option<Metadata> {
        let inner = self.inner.lock();
        let handle = inner.playlist.track_at(index)?;
        inner
            .table
            .get(&handle.id())
            .map(|song| song.metadata.clone())
    }

    /// Metadata by handle; works for tracks no longer in the playlist.
    pub fn metadata_for(&self, handle: Handle) -> Option<Metadata> {
        self.inner
            .lock()
            .table
            .get(&handle.id())
            .map(|song| song.metadata.clone())
    }

    /// Stop the engine and drop it.
    pub fn shutdown(&self) {
        let mut inner = self.inner.lock();
        inner.engine.stop();
        tracing::info!(target: "player::service", "service shut down");
    }
}

/// Resolve the current handle and (re)load its file into the engine.
/// Precondition: playlist non-empty.
fn load_current_locked(inner: &mut ServiceInner) -> Result<(), ServiceError> {
    let Some(handle) = inner.playlist.current_track() else {
        return Ok(());
    };

    let path = inner
        .table
        .get(&handle.id())
        .ok_or(ServiceError::HandleInvalid(handle.id()))?
        .metadata
        .file_path
        .clone();

    inner.engine.stop();
    inner.engine.load(&path)?;
    Ok(())
}

/// Resolve `handle` and queue its file for gapless hand-off.
fn queue_handle_locked(inner: &mut ServiceInner, handle: Handle) -> Result<(), ServiceError> {
    let path = inner
        .table
        .get(&handle.id())
        .ok_or(ServiceError::HandleInvalid(handle.id()))?
        .metadata
        .file_path
        .clone();

    inner.engine.queue_next(&path)?;
    Ok(())
}
