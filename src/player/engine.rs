//! ALSA playback engine.
//!
//! One output thread owns the PCM handle and runs the decode+write loop:
//! apply pending seeks, keep the ring topped up, scale by volume, convert
//! to the negotiated device format and write one period. Everything other
//! threads need to touch crosses over through atomics (volume, seek,
//! cursor, track-finished) or a briefly-held mutex (sound hand-off,
//! device switch).
//!
//! Device format negotiation tries FLOAT_LE, then S32_LE, then S16_LE;
//! the first format the device accepts wins. Xruns are recovered in place
//! with `prepare` and only counted, never surfaced.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU32, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use alsa::pcm::{Access, Format, HwParams, PCM};
use alsa::{Direction, ValueOr};
use parking_lot::Mutex;

use super::sound::{Sound, SoundCtl};
use super::{EngineError, FRAMES_PER_BUFFER};

/// Samples mirrored into the visualization tap per output step.
pub const COPY_SAMPLES: usize = 2048;

/// PCM sample formats the engine negotiates, in preference order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PcmSampleFormat {
    #[default]
    FloatLe,
    S32Le,
    S16Le,
}

impl PcmSampleFormat {
    pub fn name(&self) -> &'static str {
        match self {
            Self::FloatLe => "FLOAT_LE",
            Self::S32Le => "S32_LE",
            Self::S16Le => "S16_LE",
        }
    }

    fn to_alsa(self) -> Format {
        match self {
            Self::FloatLe => Format::FloatLE,
            Self::S32Le => Format::S32LE,
            Self::S16Le => Format::S16LE,
        }
    }
}

/// One enumerated playback device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub name: String,
    pub description: String,
    pub card_index: i32,
    pub device_index: i32,
    pub is_default: bool,
}

/// Observable engine state.
#[derive(Debug, Clone)]
pub struct BackendInfo {
    pub device: String,
    pub sample_rate: u32,
    pub channels: u32,
    pub format: PcmSampleFormat,
    pub format_name: String,
    pub period_frames: i64,
    pub buffer_frames: i64,
    pub codec_name: String,
    pub codec_long_name: String,
    pub latency_ms: f64,
    pub xruns: u64,
    pub writes: u64,
    pub is_active: bool,
    pub is_playing: bool,
    pub is_paused: bool,
}

impl Default for BackendInfo {
    fn default() -> Self {
        Self {
            device: "default".to_string(),
            sample_rate: 48000,
            channels: 2,
            format: PcmSampleFormat::FloatLe,
            format_name: PcmSampleFormat::FloatLe.name().to_string(),
            period_frames: FRAMES_PER_BUFFER as i64,
            buffer_frames: 4 * FRAMES_PER_BUFFER as i64,
            codec_name: String::new(),
            codec_long_name: String::new(),
            latency_ms: 0.0,
            xruns: 0,
            writes: 0,
            is_active: false,
            is_playing: false,
            is_paused: false,
        }
    }
}

/// Playback state, exactly one at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Stopped,
    Paused,
    Playing,
}

impl PlaybackState {
    fn from_u8(v: u8) -> Self {
        match v {
            2 => Self::Playing,
            1 => Self::Paused,
            _ => Self::Stopped,
        }
    }
}

/// Volume as an atomic f32, clamped to [0.0, 1.5].
#[derive(Debug)]
pub struct VolumeCtl {
    bits: AtomicU32,
}

impl VolumeCtl {
    fn new(volume: f32) -> Arc<Self> {
        Arc::new(Self {
            bits: AtomicU32::new(volume.clamp(0.0, 1.5).to_bits()),
        })
    }

    #[inline]
    pub fn get(&self) -> f32 {
        f32::from_bits(self.bits.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn set(&self, volume: f32) {
        self.bits
            .store(volume.clamp(0.0, 1.5).to_bits(), Ordering::Relaxed);
    }
}

/// State shared with the output thread.
struct Shared {
    inner: Mutex<Inner>,
    volume: Arc<VolumeCtl>,
    running: AtomicBool,
    state: AtomicU8,
    track_finished: AtomicBool,
    xruns: AtomicU64,
    writes: AtomicU64,
    backend: Mutex<BackendInfo>,
    current_ctl: Mutex<Option<Arc<SoundCtl>>>,
    pending_device: Mutex<Option<String>>,
    copy_buf: Mutex<Vec<f32>>,
    copy_seq: AtomicU64,
}

/// Output-thread-owned resources (behind the shared mutex).
struct Inner {
    pcm: Option<PCM>,
    sound: Option<Box<Sound>>,
    next_sound: Option<Box<Sound>>,
    playback_buf: Vec<f32>,
    scratch_i16: Vec<i16>,
    scratch_i32: Vec<i32>,
}

impl Shared {
    fn playback_state(&self) -> PlaybackState {
        PlaybackState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_playback_state(&self, state: PlaybackState) {
        self.state.store(state as u8, Ordering::Release);
        let mut backend = self.backend.lock();
        backend.is_playing = state == PlaybackState::Playing;
        backend.is_paused = state == PlaybackState::Paused;
    }
}

/// The playback engine. All control methods are cheap; the decode/output
/// work happens on the engine-owned output thread.
pub struct AudioEngine {
    shared: Arc<Shared>,
    thread: Option<JoinHandle<()>>,
}

impl Default for AudioEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioEngine {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    pcm: None,
                    sound: None,
                    next_sound: None,
                    playback_buf: vec![0.0; FRAMES_PER_BUFFER * 2],
                    scratch_i16: Vec::new(),
                    scratch_i32: Vec::new(),
                }),
                volume: VolumeCtl::new(1.0),
                running: AtomicBool::new(false),
                state: AtomicU8::new(PlaybackState::Stopped as u8),
                track_finished: AtomicBool::new(false),
                xruns: AtomicU64::new(0),
                writes: AtomicU64::new(0),
                backend: Mutex::new(BackendInfo::default()),
                current_ctl: Mutex::new(None),
                pending_device: Mutex::new(None),
                copy_buf: Mutex::new(Vec::with_capacity(COPY_SAMPLES)),
                copy_seq: AtomicU64::new(0),
            }),
            thread: None,
        }
    }

    /// List playback devices; index 0 is always the ALSA default.
    pub fn enumerate_devices() -> Vec<DeviceInfo> {
        let mut devices = vec![DeviceInfo {
            name: "default".to_string(),
            description: "Default Audio Device".to_string(),
            card_index: -1,
            device_index: -1,
            is_default: true,
        }];

        for card in alsa::card::Iter::new() {
            let Ok(card) = card else { continue };
            let card_index = card.get_index();
            let card_name = card
                .get_name()
                .unwrap_or_else(|_| format!("card{card_index}"));

            let iface = std::ffi::CString::new("pcm").expect("static iface name");
            let Ok(hints) = alsa::device_name::HintIter::new(Some(&card), &iface) else {
                continue;
            };

            for hint in hints {
                let Some(name) = hint.name else { continue };
                if name == "null" {
                    continue;
                }
                if !matches!(hint.direction, None | Some(Direction::Playback)) {
                    continue;
                }

                let description = match &hint.desc {
                    Some(desc) => format!("{} [{}]", desc.replace('\n', " - "), name),
                    None => format!("{card_name} [{name}]"),
                };

                devices.push(DeviceInfo {
                    device_index: parse_dev_index(&name),
                    name,
                    description,
                    card_index,
                    is_default: false,
                });
            }
        }

        devices
    }

    /// Shared volume control (readable without any engine lock).
    pub fn volume_ctl(&self) -> Arc<VolumeCtl> {
        Arc::clone(&self.shared.volume)
    }

    pub fn set_volume(&self, volume: f32) {
        self.shared.volume.set(volume);
    }

    pub fn volume(&self) -> f32 {
        self.shared.volume.get()
    }

    /// Open `device` and negotiate the output format. An already-open
    /// device is drained and closed first.
    pub fn init_for_device(&mut self, device: &str) -> Result<(), EngineError> {
        let mut inner = self.shared.inner.lock();

        if let Some(pcm) = inner.pcm.take() {
            let _ = pcm.drain();
        }

        let mut backend = self.shared.backend.lock();
        backend.device = device.to_string();
        backend.is_active = false;
        backend.is_playing = false;
        backend.is_paused = false;
        self.shared.xruns.store(0, Ordering::Relaxed);
        self.shared.writes.store(0, Ordering::Relaxed);

        let pcm = open_device(device, &mut backend)?;

        let samples = FRAMES_PER_BUFFER * backend.channels as usize;
        inner.playback_buf.resize(samples, 0.0);
        inner.scratch_i16.resize(samples, 0);
        inner.scratch_i32.resize(samples, 0);
        inner.pcm = Some(pcm);

        tracing::info!(
            target: "player::engine",
            device,
            format = backend.format_name,
            rate = backend.sample_rate,
            channels = backend.channels,
            period = backend.period_frames,
            buffer = backend.buffer_frames,
            latency_ms = backend.latency_ms,
            "device initialized"
        );
        Ok(())
    }

    /// Ask the output thread to reopen on another device at its next step.
    pub fn switch_device(&self, device: &str) {
        *self.shared.pending_device.lock() = Some(device.to_string());
    }

    /// Prepare `path` and make it the current sound. The previous sound
    /// (and any queued one) is dropped.
    pub fn load(&mut self, path: &Path) -> Result<(), EngineError> {
        let (rate, channels) = {
            let backend = self.shared.backend.lock();
            (backend.sample_rate, backend.channels as usize)
        };

        let sound = Sound::prepare(path, rate, channels)?;

        let mut inner = self.shared.inner.lock();
        *self.shared.current_ctl.lock() = Some(sound.ctl());
        {
            let mut backend = self.shared.backend.lock();
            backend.codec_name = sound.codec_name.clone();
            backend.codec_long_name = sound.codec_long_name.clone();
        }
        inner.sound = Some(Box::new(sound));
        inner.next_sound = None;
        self.shared.track_finished.store(false, Ordering::Release);

        tracing::info!(target: "player::engine", path = %path.display(), "sound loaded");
        Ok(())
    }

    /// Eagerly prepare the next track for gapless hand-off. A previously
    /// queued sound is replaced.
    pub fn queue_next(&mut self, path: &Path) -> Result<(), EngineError> {
        let (rate, channels) = {
            let backend = self.shared.backend.lock();
            (backend.sample_rate, backend.channels as usize)
        };

        let sound = Sound::prepare(path, rate, channels)?;

        let mut inner = self.shared.inner.lock();
        inner.next_sound = Some(Box::new(sound));

        tracing::debug!(target: "player::engine", path = %path.display(), "next sound queued");
        Ok(())
    }

    pub fn has_queued_next(&self) -> bool {
        self.shared.inner.lock().next_sound.is_some()
    }

    /// Start (or resume) playback; spawns the output thread if needed.
    pub fn play(&mut self) {
        if self.shared.playback_state() == PlaybackState::Playing {
            return;
        }

        if self.shared.playback_state() == PlaybackState::Paused {
            let inner = self.shared.inner.lock();
            if let Some(pcm) = inner.pcm.as_ref() {
                let _ = pcm.prepare();
            }
        }

        self.shared.set_playback_state(PlaybackState::Playing);
        self.shared.backend.lock().is_active = true;
        self.start_thread();
    }

    /// Pause playback, dropping queued device samples so audio stops now.
    pub fn pause(&mut self) {
        if self.shared.playback_state() != PlaybackState::Playing {
            return;
        }

        self.shared.set_playback_state(PlaybackState::Paused);

        let inner = self.shared.inner.lock();
        if let Some(pcm) = inner.pcm.as_ref() {
            let _ = pcm.drop();
            let _ = pcm.prepare();
        }
    }

    /// Stop playback and join the output thread.
    pub fn stop(&mut self) {
        self.shared.set_playback_state(PlaybackState::Stopped);
        self.shared.backend.lock().is_active = false;
        self.shared.running.store(false, Ordering::Release);

        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }

        let inner = self.shared.inner.lock();
        if let Some(pcm) = inner.pcm.as_ref() {
            let _ = pcm.drop();
            let _ = pcm.prepare();
        }
    }

    /// Seek to zero and play.
    pub fn restart(&mut self) {
        self.seek_absolute(0.0);
        self.play();
    }

    /// (position, length) of the current sound, in seconds.
    pub fn playback_time(&self) -> Option<(f64, f64)> {
        self.shared
            .current_ctl
            .lock()
            .as_ref()
            .map(|ctl| ctl.playback_time())
    }

    /// Publish an absolute seek; the output thread applies it on its next
    /// step. Out-of-range targets clamp.
    pub fn seek_absolute(&self, seconds: f64) {
        if let Some(ctl) = self.shared.current_ctl.lock().as_ref() {
            ctl.request_seek(seconds);
        }
    }

    pub fn seek_forward(&self, seconds: f64) {
        if let Some((pos, len)) = self.playback_time() {
            self.seek_absolute((pos + seconds).min(len));
        }
    }

    pub fn seek_backward(&self, seconds: f64) {
        if let Some((pos, _)) = self.playback_time() {
            self.seek_absolute((pos - seconds).max(0.0));
        }
    }

    pub fn is_playing(&self) -> bool {
        self.shared.playback_state() == PlaybackState::Playing
    }

    pub fn is_paused(&self) -> bool {
        self.shared.playback_state() == PlaybackState::Paused
    }

    pub fn playback_state(&self) -> PlaybackState {
        self.shared.playback_state()
    }

    /// Snapshot of the observable engine state.
    pub fn backend_info(&self) -> BackendInfo {
        let mut info = self.shared.backend.lock().clone();
        info.xruns = self.shared.xruns.load(Ordering::Relaxed);
        info.writes = self.shared.writes.load(Ordering::Relaxed);
        info
    }

    pub fn is_track_finished(&self) -> bool {
        self.shared.track_finished.load(Ordering::Acquire)
    }

    pub fn clear_track_finished_flag(&self) {
        self.shared.track_finished.store(false, Ordering::Release);
    }

    /// Sequence number of the visualization tap; bumped after every copy.
    pub fn copy_seq(&self) -> u64 {
        self.shared.copy_seq.load(Ordering::Acquire)
    }

    /// Read the latest visualization samples under the tap lock.
    pub fn with_copy_buffer<R>(&self, f: impl FnOnce(&[f32]) -> R) -> R {
        f(&self.shared.copy_buf.lock())
    }

    fn start_thread(&mut self) {
        if let Some(handle) = &self.thread {
            if !handle.is_finished() {
                return;
            }
        }
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }

        self.shared.running.store(true, Ordering::Release);
        let shared = Arc::clone(&self.shared);
        self.thread = Some(
            thread::Builder::new()
                .name("audio-output".to_string())
                .spawn(move || output_loop(&shared))
                .expect("failed to spawn audio output thread"),
        );
    }
}

impl Drop for AudioEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

// ============================================================================
// Output thread
// ============================================================================

fn output_loop(shared: &Shared) {
    tracing::debug!(target: "player::engine", "output thread started");

    while shared.running.load(Ordering::Acquire) {
        if shared.playback_state() != PlaybackState::Playing {
            thread::sleep(Duration::from_millis(2));
            continue;
        }
        decode_and_play(shared);
    }

    tracing::debug!(target: "player::engine", "output thread exiting");
}

/// One output step: device switch, seek, gapless hand-off, ring fill,
/// volume, format conversion, device write, cursor advance.
fn decode_and_play(shared: &Shared) {
    let mut guard = shared.inner.lock();
    let inner = &mut *guard;

    if let Some(device) = shared.pending_device.lock().take() {
        apply_device_switch(shared, inner, &device);
    }

    let Some(sound) = inner.sound.as_mut() else {
        drop(guard);
        thread::sleep(Duration::from_millis(2));
        return;
    };

    sound.take_pending_seek();

    if sound.is_eof() && sound.ring.available() == 0 {
        if !sound.finished_raised {
            sound.finished_raised = true;
            shared.track_finished.store(true, Ordering::Release);
            tracing::debug!(target: "player::engine", "track finished");
        }

        // Gapless hand-off: swap in the queued sound without touching the
        // device.
        if let Some(mut next) = inner.next_sound.take() {
            next.reset_for_start();
            *shared.current_ctl.lock() = Some(next.ctl());
            {
                let mut backend = shared.backend.lock();
                backend.codec_name = next.codec_name.clone();
                backend.codec_long_name = next.codec_long_name.clone();
            }
            tracing::debug!(target: "player::engine", "gapless hand-off to queued sound");
            inner.sound = Some(next);
        } else {
            drop(guard);
            thread::sleep(Duration::from_millis(2));
        }
        return;
    }

    let channels = {
        let backend = shared.backend.lock();
        backend.channels as usize
    };
    let samples_needed = FRAMES_PER_BUFFER * channels;

    if inner.playback_buf.len() < samples_needed {
        inner.playback_buf.resize(samples_needed, 0.0);
    }

    while sound.ring.available() < samples_needed && !sound.is_eof() && sound.ring.space() > 0 {
        sound.decode_step();
    }

    // At end of stream drain whatever is left, whole frames only.
    let available = sound.ring.available();
    let to_read = if available >= samples_needed {
        samples_needed
    } else if sound.is_eof() {
        (available / channels) * channels
    } else {
        return;
    };
    if to_read == 0 {
        return;
    }

    let n = sound.ring.read(&mut inner.playback_buf[..to_read]);
    let frames = n / channels;
    if frames == 0 {
        return;
    }

    // Visualization tap: mirror the newest samples, bump the sequence.
    {
        let mut copy = shared.copy_buf.lock();
        let m = n.min(COPY_SAMPLES);
        copy.clear();
        copy.extend_from_slice(&inner.playback_buf[..m]);
    }
    shared.copy_seq.fetch_add(1, Ordering::Release);

    let volume = shared.volume.get();
    let format = shared.backend.lock().format;

    let written = match inner.pcm.as_ref() {
        Some(pcm) => write_period(
            shared,
            pcm,
            format,
            &mut inner.playback_buf[..n],
            &mut inner.scratch_i16,
            &mut inner.scratch_i32,
            frames,
            channels,
            volume,
        ),
        // No device (init failed or never called): consume at full speed
        // so playback state still progresses.
        None => frames,
    };

    sound.advance_cursor(written as i64);
}

fn apply_device_switch(shared: &Shared, inner: &mut Inner, device: &str) {
    if let Some(pcm) = inner.pcm.take() {
        let _ = pcm.drain();
    }

    let mut backend = shared.backend.lock();
    backend.device = device.to_string();

    match open_device(device, &mut backend) {
        Ok(pcm) => {
            let samples = FRAMES_PER_BUFFER * backend.channels as usize;
            inner.playback_buf.resize(samples, 0.0);
            inner.scratch_i16.resize(samples, 0);
            inner.scratch_i32.resize(samples, 0);
            let _ = pcm.prepare();
            inner.pcm = Some(pcm);
            tracing::info!(target: "player::engine", device, "switched output device");
        }
        Err(e) => {
            tracing::error!(target: "player::engine", device, error = %e, "device switch failed");
        }
    }
}

/// Scale by volume, convert to the device format, write one period.
/// Returns frames actually written.
#[allow(clippy::too_many_arguments)]
fn write_period(
    shared: &Shared,
    pcm: &PCM,
    format: PcmSampleFormat,
    samples: &mut [f32],
    scratch_i16: &mut Vec<i16>,
    scratch_i32: &mut Vec<i32>,
    frames: usize,
    _channels: usize,
    volume: f32,
) -> usize {
    let result = match format {
        PcmSampleFormat::FloatLe => {
            for s in samples.iter_mut() {
                *s *= volume;
            }
            pcm.io_f32().and_then(|io| io.writei(samples))
        }
        PcmSampleFormat::S16Le => {
            if scratch_i16.len() < samples.len() {
                scratch_i16.resize(samples.len(), 0);
            }
            for (out, s) in scratch_i16.iter_mut().zip(samples.iter()) {
                let v = (s * volume).clamp(-1.0, 1.0);
                *out = (v * 32767.0) as i16;
            }
            pcm.io_i16()
                .and_then(|io| io.writei(&scratch_i16[..samples.len()]))
        }
        PcmSampleFormat::S32Le => {
            if scratch_i32.len() < samples.len() {
                scratch_i32.resize(samples.len(), 0);
            }
            for (out, s) in scratch_i32.iter_mut().zip(samples.iter()) {
                let v = (s * volume).clamp(-1.0, 1.0);
                *out = (v * 2_147_483_647.0) as i32;
            }
            pcm.io_i32()
                .and_then(|io| io.writei(&scratch_i32[..samples.len()]))
        }
    };

    match result {
        Ok(written) => {
            shared.writes.fetch_add(1, Ordering::Relaxed);
            written
        }
        Err(e) if e.errno() == libc::EPIPE => {
            // Underrun: prepare and carry on.
            let _ = pcm.prepare();
            shared.xruns.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(target: "player::engine", "xrun recovered");
            frames
        }
        Err(e) => {
            let _ = pcm.try_recover(e, true);
            0
        }
    }
}

/// Open `device` for playback and negotiate format/geometry.
fn open_device(device: &str, backend: &mut BackendInfo) -> Result<PCM, EngineError> {
    let pcm = PCM::new(device, Direction::Playback, false)
        .map_err(|e| EngineError::DeviceOpenFailed(format!("{device}: {e}")))?;

    let mut negotiated = None;
    for format in [
        PcmSampleFormat::FloatLe,
        PcmSampleFormat::S32Le,
        PcmSampleFormat::S16Le,
    ] {
        let attempt = (|| -> alsa::Result<()> {
            let hwp = HwParams::any(&pcm)?;
            hwp.set_access(Access::RWInterleaved)?;
            hwp.set_format(format.to_alsa())?;
            hwp.set_channels(2)?;
            hwp.set_rate(48000, ValueOr::Nearest)?;
            pcm.hw_params(&hwp)?;
            Ok(())
        })();

        if attempt.is_ok() {
            negotiated = Some(format);
            break;
        }
    }

    let format = negotiated.ok_or_else(|| EngineError::DeviceFormatUnsupported(device.into()))?;

    let (channels, rate, period, buffer) = {
        let hwp = pcm
            .hw_params_current()
            .map_err(|e| EngineError::DeviceOpenFailed(e.to_string()))?;
        (
            hwp.get_channels()
                .map_err(|e| EngineError::DeviceOpenFailed(e.to_string()))?,
            hwp.get_rate()
                .map_err(|e| EngineError::DeviceOpenFailed(e.to_string()))?,
            hwp.get_period_size().unwrap_or(FRAMES_PER_BUFFER as i64),
            hwp.get_buffer_size().unwrap_or(4 * FRAMES_PER_BUFFER as i64),
        )
    };

    pcm.prepare()
        .map_err(|e| EngineError::DeviceOpenFailed(e.to_string()))?;

    backend.format = format;
    backend.format_name = format.name().to_string();
    backend.channels = channels;
    backend.sample_rate = rate;
    backend.period_frames = period;
    backend.buffer_frames = buffer;
    backend.latency_ms = buffer as f64 / f64::from(rate) * 1000.0;

    Ok(pcm)
}

fn parse_dev_index(name: &str) -> i32 {
    name.split("DEV=")
        .nth(1)
        .and_then(|s| s.split(',').next())
        .and_then(|s| s.parse().ok())
        .unwrap_or(-1)
}
