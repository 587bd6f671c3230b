//! Gapless audio playback.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                PlaybackService (any caller thread)            │
//! │   handle table + playlist; serializes every engine control    │
//! └──────────────────────────────┬────────────────────────────────┘
//!                                │ mutex + atomics
//!                                ▼
//! ┌───────────────────────────────────────────────────────────────┐
//! │                 AudioEngine output thread                     │
//! │   seek → decode → resample → ring → volume → PCM write        │
//! └──────────────────────────────┬────────────────────────────────┘
//!                                │ snd_pcm_writei
//!                                ▼
//! ┌───────────────────────────────────────────────────────────────┐
//! │                      ALSA device                              │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! Controls published by other threads (seek targets, volume, the
//! track-finished flag) cross over through atomics so the output thread
//! never waits on a caller and callers never wait on a device write.

pub mod engine;
pub mod playlist;
pub mod resampler;
pub mod ring;
pub mod service;
pub mod sound;

pub use engine::{
    AudioEngine, BackendInfo, DeviceInfo, PcmSampleFormat, PlaybackState, VolumeCtl,
};
pub use playlist::{Handle, Playlist};
pub use resampler::Resampler;
pub use ring::Ring;
pub use service::{PlaybackService, ServiceError, TrackSnapshot};
pub use sound::{Sound, SoundCtl, StreamSpec};

/// Frames moved to the device per output step.
pub const FRAMES_PER_BUFFER: usize = 1024;

/// Audio engine errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum EngineError {
    #[error("failed to open input: {0}")]
    OpenInputFailed(String),

    #[error("no audio stream in input")]
    NoAudioStream,

    #[error("decoder init failed: {0}")]
    DecoderInitFailed(String),

    #[error("resampler init failed: {0}")]
    ResamplerInitFailed(String),

    #[error("failed to open device: {0}")]
    DeviceOpenFailed(String),

    #[error("device {0} rejected every supported PCM format")]
    DeviceFormatUnsupported(String),
}
