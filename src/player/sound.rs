//! Per-track decode state.
//!
//! A [`Sound`] owns everything needed to turn one audio file into device-
//! rate interleaved f32: the symphonia reader and decoder, the channel
//! map, the resampler, and the ring the output step drains. Control state
//! the rest of the system needs to touch (cursor, seek request, EOF) lives
//! in a shared [`SoundCtl`] of atomics, so seeks never block on the output
//! thread.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use symphonia::core::audio::{AudioBufferRef, Signal};
use symphonia::core::codecs::{CODEC_TYPE_NULL, Decoder, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::Time;

use super::resampler::Resampler;
use super::ring::Ring;
use super::{EngineError, FRAMES_PER_BUFFER};

/// Rate and channel count of one side of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSpec {
    pub rate: u32,
    pub channels: usize,
}

/// Shared playback-control state of one sound.
///
/// Writers publish with release stores, the output thread observes with
/// acquire loads on its next step.
#[derive(Debug)]
pub struct SoundCtl {
    /// Frames played so far, in device-rate frames past `start_skip`
    cursor_frames: AtomicI64,
    seek_pending: AtomicBool,
    seek_target_frame: AtomicI64,
    eof: AtomicBool,
    /// Device rate the cursor counts against
    rate: u32,
    duration_frames: i64,
    start_skip: i64,
}

impl SoundCtl {
    fn new(rate: u32, duration_frames: i64, start_skip: i64) -> Arc<Self> {
        Arc::new(Self {
            cursor_frames: AtomicI64::new(0),
            seek_pending: AtomicBool::new(false),
            seek_target_frame: AtomicI64::new(0),
            eof: AtomicBool::new(false),
            rate,
            duration_frames,
            start_skip,
        })
    }

    /// (position, length) in seconds.
    pub fn playback_time(&self) -> (f64, f64) {
        let pos = self.cursor_frames.load(Ordering::Relaxed).max(0) as f64 / f64::from(self.rate);
        let len = self.duration_frames as f64 / f64::from(self.rate);
        (pos, len)
    }

    /// Publish a seek request; the output thread picks it up on its next
    /// step. Out-of-range positions clamp to the playable span.
    pub fn request_seek(&self, seconds: f64) {
        let len = self.duration_frames as f64 / f64::from(self.rate);
        let seconds = seconds.clamp(0.0, len);

        let target = (seconds * f64::from(self.rate)) as i64 + self.start_skip;
        let target = target.clamp(self.start_skip, self.start_skip + self.duration_frames);

        self.seek_target_frame.store(target, Ordering::Release);
        self.seek_pending.store(true, Ordering::Release);
    }

    pub fn is_eof(&self) -> bool {
        self.eof.load(Ordering::Acquire)
    }

    fn advance_cursor(&self, frames: i64) {
        self.cursor_frames.fetch_add(frames, Ordering::Relaxed);
    }

    fn reset_for_start(&self) {
        self.cursor_frames.store(0, Ordering::Relaxed);
        self.seek_pending.store(false, Ordering::Release);
        self.eof.store(false, Ordering::Release);
    }
}

/// One loaded track: demux, decode, remap, resample, buffer.
pub struct Sound {
    reader: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    pub source: StreamSpec,
    pub target: StreamSpec,
    resampler: Resampler,
    pub ring: Ring,
    /// Resampled output waiting for ring space
    pending: Vec<f32>,
    pending_offset: usize,
    input_done: bool,
    flushed: bool,
    /// Track-finished has been raised for this sound
    pub finished_raised: bool,
    start_skip: i64,
    end_skip: i64,
    pub duration_frames: i64,
    pub codec_name: String,
    pub codec_long_name: String,
    ctl: Arc<SoundCtl>,
}

impl Sound {
    /// Open `path` and build the full decode pipeline targeting the
    /// device format (`target_rate`, `target_channels`, f32).
    pub fn prepare(
        path: &Path,
        target_rate: u32,
        target_channels: usize,
    ) -> Result<Self, EngineError> {
        let file = File::open(path)
            .map_err(|e| EngineError::OpenInputFailed(format!("{}: {e}", path.display())))?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension() {
            hint.with_extension(&ext.to_string_lossy());
        }

        let format_opts = FormatOptions {
            enable_gapless: true,
            ..Default::default()
        };

        let mut probed = symphonia::default::get_probe()
            .format(&hint, mss, &format_opts, &MetadataOptions::default())
            .map_err(|e| EngineError::OpenInputFailed(e.to_string()))?;

        let reader = probed.format;

        let track = reader
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or(EngineError::NoAudioStream)?;
        let track_id = track.id;
        let codec_params = track.codec_params.clone();

        let source_rate = codec_params
            .sample_rate
            .ok_or_else(|| EngineError::DecoderInitFailed("unknown sample rate".into()))?;
        let source_channels = codec_params
            .channels
            .map(|c| c.count())
            .unwrap_or(2)
            .max(1);

        let (codec_name, codec_long_name) = symphonia::default::get_codecs()
            .get_codec(codec_params.codec)
            .map(|d| (d.short_name.to_string(), d.long_name.to_string()))
            .unwrap_or_else(|| ("unknown".to_string(), "unknown codec".to_string()));

        let decoder = symphonia::default::get_codecs()
            .make(&codec_params, &DecoderOptions::default())
            .map_err(|e| EngineError::DecoderInitFailed(e.to_string()))?;

        let time_base = codec_params.time_base;
        let duration_secs = match (codec_params.n_frames, time_base) {
            (Some(n), Some(tb)) => {
                let t = tb.calc_time(n);
                t.seconds as f64 + t.frac
            }
            (Some(n), None) => n as f64 / f64::from(source_rate),
            _ => 0.0,
        };

        // Encoder delay/padding from container metadata, in source frames;
        // absent means 0. Scaled to device-rate frames for the cursor math.
        let (delay_src, padding_src) = read_skip_tags(probed.metadata.get().as_ref());
        let scale = f64::from(target_rate) / f64::from(source_rate);
        let start_skip = (delay_src as f64 * scale) as i64;
        let end_skip = (padding_src as f64 * scale) as i64;

        let duration_frames =
            ((duration_secs * f64::from(target_rate)) as i64 - start_skip - end_skip).max(0);

        let resampler = Resampler::new(source_rate, target_rate, target_channels)?;

        let ring = Ring::with_capacity(4 * FRAMES_PER_BUFFER * target_channels);

        let sound = Self {
            reader,
            decoder,
            track_id,
            source: StreamSpec {
                rate: source_rate,
                channels: source_channels,
            },
            target: StreamSpec {
                rate: target_rate,
                channels: target_channels,
            },
            resampler,
            ring,
            pending: Vec::new(),
            pending_offset: 0,
            input_done: false,
            flushed: false,
            finished_raised: false,
            start_skip,
            end_skip,
            duration_frames,
            codec_name,
            codec_long_name,
            ctl: SoundCtl::new(target_rate, duration_frames, start_skip),
        };

        tracing::debug!(
            target: "player::sound",
            path = %path.display(),
            codec = %sound.codec_name,
            source_rate = sound.source.rate,
            source_channels = sound.source.channels,
            target_rate,
            target_channels,
            duration_secs,
            start_skip = sound.start_skip,
            end_skip = sound.end_skip,
            "sound prepared"
        );

        Ok(sound)
    }

    pub fn ctl(&self) -> Arc<SoundCtl> {
        Arc::clone(&self.ctl)
    }

    pub fn is_eof(&self) -> bool {
        self.ctl.is_eof()
    }

    pub fn advance_cursor(&self, frames: i64) {
        self.ctl.advance_cursor(frames);
    }

    /// Clear all playback flags before a gapless hand-off makes this the
    /// current sound.
    pub fn reset_for_start(&mut self) {
        self.finished_raised = false;
        self.ctl.reset_for_start();
    }

    /// If a seek was published, perform it: container seek (backward-
    /// biased), decoder flush, ring clear, cursor rewrite. Returns whether
    /// a seek happened.
    pub fn take_pending_seek(&mut self) -> bool {
        if !self.ctl.seek_pending.swap(false, Ordering::AcqRel) {
            return false;
        }

        let frame = self.ctl.seek_target_frame.load(Ordering::Acquire);
        let seconds = frame as f64 / f64::from(self.target.rate);

        let result = self.reader.seek(
            SeekMode::Accurate,
            SeekTo::Time {
                time: Time::from(seconds),
                track_id: Some(self.track_id),
            },
        );
        if let Err(e) = result {
            tracing::warn!(target: "player::sound", error = %e, "container seek failed");
        }

        self.decoder.reset();
        self.resampler.reset();
        self.pending.clear();
        self.pending_offset = 0;
        self.ring.clear();
        self.input_done = false;
        self.flushed = false;
        self.ctl
            .cursor_frames
            .store(frame - self.start_skip, Ordering::Relaxed);
        self.ctl.eof.store(false, Ordering::Release);

        tracing::debug!(target: "player::sound", frame, seconds, "seek applied");
        true
    }

    /// Advance decoding by one unit of work.
    ///
    /// Either moves leftover resampled samples into the ring, or decodes
    /// one packet, or (at end of input) flushes the resampler and raises
    /// EOF once everything is buffered.
    pub fn decode_step(&mut self) {
        if self.flush_pending() {
            return;
        }

        if self.input_done {
            if !self.flushed {
                let tail = self.resampler.flush();
                self.stash(tail);
                self.flushed = true;
            }
            if self.pending.is_empty() {
                self.ctl.eof.store(true, Ordering::Release);
            } else {
                self.flush_pending();
                if self.pending.is_empty() {
                    self.ctl.eof.store(true, Ordering::Release);
                }
            }
            return;
        }

        loop {
            let packet = match self.reader.next_packet() {
                Ok(p) => p,
                Err(SymphoniaError::IoError(e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    self.input_done = true;
                    return;
                }
                Err(SymphoniaError::ResetRequired) => {
                    self.decoder.reset();
                    continue;
                }
                Err(e) => {
                    tracing::warn!(target: "player::sound", error = %e, "demux error, ending stream");
                    self.input_done = true;
                    return;
                }
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            match self.decoder.decode(&packet) {
                Ok(decoded) => {
                    let samples = interleaved_f32(&decoded);
                    let mapped =
                        remap_channels(&samples, self.source.channels, self.target.channels);
                    let out = self.resampler.process(&mapped);
                    self.stash(out);
                    self.flush_pending();
                    return;
                }
                Err(SymphoniaError::DecodeError(e)) => {
                    // Bad frame; skip it and keep going.
                    tracing::debug!(target: "player::sound", error = %e, "skipping undecodable frame");
                    continue;
                }
                Err(e) => {
                    tracing::warn!(target: "player::sound", error = %e, "decode error, ending stream");
                    self.input_done = true;
                    return;
                }
            }
        }
    }

    fn stash(&mut self, samples: Vec<f32>) {
        if self.pending.is_empty() {
            self.pending = samples;
            self.pending_offset = 0;
        } else {
            self.pending.extend_from_slice(&samples);
        }
    }

    /// Move as much pending output into the ring as fits. Returns true if
    /// samples remain pending (ring is the bottleneck right now).
    fn flush_pending(&mut self) -> bool {
        if self.pending_offset < self.pending.len() {
            let n = self.ring.write(&self.pending[self.pending_offset..]);
            self.pending_offset += n;
            if self.pending_offset >= self.pending.len() {
                self.pending.clear();
                self.pending_offset = 0;
            }
        }
        !self.pending.is_empty()
    }
}

/// Flatten a symphonia audio buffer into interleaved f32.
fn interleaved_f32(buffer: &AudioBufferRef) -> Vec<f32> {
    match buffer {
        AudioBufferRef::F32(buf) => {
            let planes = buf.planes();
            let planes = planes.planes();
            let frames = buf.frames();
            let mut out = Vec::with_capacity(frames * planes.len());
            for frame in 0..frames {
                for plane in planes {
                    out.push(plane[frame]);
                }
            }
            out
        }
        AudioBufferRef::S16(buf) => {
            let planes = buf.planes();
            let planes = planes.planes();
            let mut out = Vec::with_capacity(buf.frames() * planes.len());
            for frame in 0..buf.frames() {
                for plane in planes {
                    out.push(f32::from(plane[frame]) / 32768.0);
                }
            }
            out
        }
        AudioBufferRef::S24(buf) => {
            let planes = buf.planes();
            let planes = planes.planes();
            let mut out = Vec::with_capacity(buf.frames() * planes.len());
            for frame in 0..buf.frames() {
                for plane in planes {
                    out.push(plane[frame].0 as f32 / 8_388_608.0);
                }
            }
            out
        }
        AudioBufferRef::S32(buf) => {
            let planes = buf.planes();
            let planes = planes.planes();
            let mut out = Vec::with_capacity(buf.frames() * planes.len());
            for frame in 0..buf.frames() {
                for plane in planes {
                    out.push(plane[frame] as f32 / 2_147_483_648.0);
                }
            }
            out
        }
        AudioBufferRef::U8(buf) => {
            let planes = buf.planes();
            let planes = planes.planes();
            let mut out = Vec::with_capacity(buf.frames() * planes.len());
            for frame in 0..buf.frames() {
                for plane in planes {
                    out.push((f32::from(plane[frame]) - 128.0) / 128.0);
                }
            }
            out
        }
        AudioBufferRef::F64(buf) => {
            let planes = buf.planes();
            let planes = planes.planes();
            let mut out = Vec::with_capacity(buf.frames() * planes.len());
            for frame in 0..buf.frames() {
                for plane in planes {
                    out.push(plane[frame] as f32);
                }
            }
            out
        }
        _ => Vec::new(),
    }
}

/// Map interleaved samples from `src` channels to `dst` channels.
///
/// Mono fans out to every output channel; extra source channels fold into
/// the last output channel so nothing is silently dropped.
fn remap_channels(samples: &[f32], src: usize, dst: usize) -> Vec<f32> {
    if src == dst || src == 0 {
        return samples.to_vec();
    }

    let frames = samples.len() / src;
    let mut out = Vec::with_capacity(frames * dst);

    for frame in 0..frames {
        let s = &samples[frame * src..(frame + 1) * src];
        if src == 1 {
            for _ in 0..dst {
                out.push(s[0]);
            }
        } else {
            for c in 0..dst {
                if c < dst - 1 && c < src {
                    out.push(s[c]);
                } else {
                    // Fold remaining source channels into the last slot.
                    let rest = &s[c.min(src - 1)..];
                    out.push(rest.iter().sum::<f32>() / rest.len() as f32);
                }
            }
        }
    }

    out
}

fn read_skip_tags(metadata: Option<&symphonia::core::meta::Metadata<'_>>) -> (i64, i64) {
    let mut delay = 0;
    let mut padding = 0;

    if let Some(log) = metadata {
        if let Some(rev) = log.current() {
            for tag in rev.tags() {
                if tag.key.eq_ignore_ascii_case("encoder_delay") {
                    delay = tag.value.to_string().parse().unwrap_or(0);
                } else if tag.key.eq_ignore_ascii_case("encoder_padding") {
                    padding = tag.value.to_string().parse().unwrap_or(0);
                }
            }
        }
    }

    (delay, padding)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_prepare_nonexistent_file() {
        let result = Sound::prepare(Path::new("/nonexistent/file.mp3"), 48000, 2);
        assert!(matches!(result, Err(EngineError::OpenInputFailed(_))));
    }

    #[test]
    fn test_prepare_wav_and_decode_to_eof() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        crate::test_utils::write_test_wav(&path, 250);

        let mut sound = Sound::prepare(&path, 8000, 1).unwrap();
        assert_eq!(sound.source.rate, 8000);
        assert_eq!(sound.source.channels, 1);
        // 250ms at 8kHz
        assert!((sound.duration_frames - 2000).abs() <= 2);

        let mut drained = 0usize;
        let mut buf = vec![0.0f32; 256];
        while !sound.is_eof() || sound.ring.available() > 0 {
            while sound.ring.available() < buf.len() && !sound.is_eof() {
                sound.decode_step();
            }
            let n = sound.ring.read(&mut buf);
            drained += n;
            if n == 0 && sound.is_eof() {
                break;
            }
        }
        assert!((drained as i64 - 2000).abs() <= 16, "drained {drained}");
    }

    #[test]
    fn test_seek_publish_and_apply() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        crate::test_utils::write_test_wav(&path, 1000);

        let mut sound = Sound::prepare(&path, 8000, 1).unwrap();
        let ctl = sound.ctl();

        ctl.request_seek(0.5);
        assert!(sound.take_pending_seek());
        // No second application without a new request.
        assert!(!sound.take_pending_seek());

        let (pos, len) = ctl.playback_time();
        assert!((pos - 0.5).abs() < 0.01, "pos = {pos}");
        assert!((len - 1.0).abs() < 0.01, "len = {len}");
    }

    #[test]
    fn test_seek_clamps_to_duration() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        crate::test_utils::write_test_wav(&path, 500);

        let sound = Sound::prepare(&path, 8000, 1).unwrap();
        let ctl = sound.ctl();

        ctl.request_seek(99.0);
        let target = ctl.seek_target_frame.load(Ordering::Acquire);
        assert_eq!(target, sound.duration_frames);

        ctl.request_seek(-5.0);
        let target = ctl.seek_target_frame.load(Ordering::Acquire);
        assert_eq!(target, 0);
    }

    #[test]
    fn test_remap_mono_to_stereo() {
        let out = remap_channels(&[0.5, -0.5], 1, 2);
        assert_eq!(out, vec![0.5, 0.5, -0.5, -0.5]);
    }

    #[test]
    fn test_remap_stereo_to_mono() {
        let out = remap_channels(&[1.0, 0.0, 0.5, 0.5], 2, 1);
        assert_eq!(out, vec![0.5, 0.5]);
    }

    #[test]
    fn test_remap_passthrough() {
        let samples = [0.1, 0.2, 0.3, 0.4];
        assert_eq!(remap_channels(&samples, 2, 2), samples.to_vec());
    }
}
