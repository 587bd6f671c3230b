//! Play queue of track handles.
//!
//! The playlist stores opaque [`Handle`]s, never songs: the service's
//! handle table owns the `Arc<Song>`s, which keeps the ownership graph
//! acyclic. Navigation wraps at both ends.

use rand::Rng;

/// Opaque id for a registered track, minted by the playback service.
///
/// Stays resolvable through the service for its whole lifetime, even after
/// the track leaves the playlist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle(u64);

impl Handle {
    pub(crate) fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Ordered track handles plus the current position.
#[derive(Debug, Clone, Default)]
pub struct Playlist {
    tracks: Vec<Handle>,
    current: usize,
}

impl Playlist {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn tracks(&self) -> &[Handle] {
        &self.tracks
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    /// Append a handle at the end.
    pub fn push(&mut self, handle: Handle) {
        self.tracks.push(handle);
    }

    pub fn clear(&mut self) {
        self.tracks.clear();
        self.current = 0;
    }

    /// The handle at the current position, if any.
    pub fn current_track(&self) -> Option<Handle> {
        self.tracks.get(self.current).copied()
    }

    /// Handle at an arbitrary index.
    pub fn track_at(&self, index: usize) -> Option<Handle> {
        self.tracks.get(index).copied()
    }

    /// Advance (wrapping) and return the new current handle.
    pub fn next(&mut self) -> Option<Handle> {
        if self.tracks.is_empty() {
            return None;
        }
        self.current = (self.current + 1) % self.tracks.len();
        self.current_track()
    }

    /// Step back (wrapping) and return the new current handle.
    pub fn previous(&mut self) -> Option<Handle> {
        if self.tracks.is_empty() {
            return None;
        }
        self.current = (self.current + self.tracks.len() - 1) % self.tracks.len();
        self.current_track()
    }

    /// Uniformly random index into the playlist.
    pub fn random_index(&self) -> Option<usize> {
        if self.tracks.is_empty() {
            return None;
        }
        Some(rand::rng().random_range(0..self.tracks.len()))
    }

    /// Jump to a random position and return its handle.
    pub fn jump_to_random(&mut self) -> Option<Handle> {
        self.current = self.random_index()?;
        self.current_track()
    }

    /// Remove the entry at `index`.
    ///
    /// Removing before the current position shifts it down; removing the
    /// current entry leaves the index in place (the next track slides into
    /// the slot); a trailing removal clamps the index back into range.
    pub fn remove_at(&mut self, index: usize) -> Option<Handle> {
        if index >= self.tracks.len() {
            return None;
        }
        let removed = self.tracks.remove(index);

        if index < self.current {
            self.current -= 1;
        }
        if !self.tracks.is_empty() && self.current >= self.tracks.len() {
            self.current = self.tracks.len() - 1;
        }
        if self.tracks.is_empty() {
            self.current = 0;
        }

        Some(removed)
    }
}
