//! Sample-rate conversion on the decode path.
//!
//! Wraps rubato's FFT fixed-input resampler behind an interleaved-sample
//! API. Input accumulates per channel until a full chunk is ready; output
//! comes back interleaved. When source and device rates match this is a
//! pass-through.

use rubato::{FftFixedIn, Resampler as RubatoResampler};

use super::EngineError;

const CHUNK_FRAMES: usize = 1024;

pub struct Resampler {
    inner: Option<FftFixedIn<f32>>,
    input_rate: u32,
    output_rate: u32,
    channels: usize,
    /// Per-channel staging for not-yet-complete chunks
    staging: Vec<Vec<f32>>,
}

impl Resampler {
    /// Build a converter from `input_rate` to `output_rate`.
    pub fn new(input_rate: u32, output_rate: u32, channels: usize) -> Result<Self, EngineError> {
        let inner = if input_rate == output_rate {
            None
        } else {
            let r = FftFixedIn::<f32>::new(
                input_rate as usize,
                output_rate as usize,
                CHUNK_FRAMES,
                2,
                channels,
            )
            .map_err(|e| EngineError::ResamplerInitFailed(e.to_string()))?;

            tracing::info!(
                target: "player::resampler",
                input_rate,
                output_rate,
                channels,
                "resampling enabled"
            );
            Some(r)
        };

        Ok(Self {
            inner,
            input_rate,
            output_rate,
            channels,
            staging: vec![Vec::new(); channels],
        })
    }

    pub fn is_passthrough(&self) -> bool {
        self.inner.is_none()
    }

    pub fn ratio(&self) -> f64 {
        f64::from(self.output_rate) / f64::from(self.input_rate)
    }

    /// Feed interleaved input, get whatever full chunks produce back
    /// (also interleaved). May return empty while the staging fills.
    pub fn process(&mut self, input: &[f32]) -> Vec<f32> {
        let Some(ref mut inner) = self.inner else {
            return input.to_vec();
        };

        for (i, sample) in input.iter().enumerate() {
            self.staging[i % self.channels].push(*sample);
        }

        let mut output = Vec::new();
        while self.staging[0].len() >= CHUNK_FRAMES {
            let chunk: Vec<Vec<f32>> = self
                .staging
                .iter_mut()
                .map(|ch| ch.drain(..CHUNK_FRAMES).collect())
                .collect();

            match inner.process(&chunk, None) {
                Ok(resampled) => interleave_into(&resampled, &mut output),
                Err(e) => {
                    tracing::warn!(target: "player::resampler", error = %e, "resampling error");
                }
            }
        }

        output
    }

    /// Drain the staging at end of stream (zero-padded final chunk).
    pub fn flush(&mut self) -> Vec<f32> {
        let Some(ref mut inner) = self.inner else {
            return Vec::new();
        };

        let remaining = self.staging[0].len();
        if remaining == 0 {
            return Vec::new();
        }

        for ch in &mut self.staging {
            ch.resize(CHUNK_FRAMES, 0.0);
        }
        let chunk: Vec<Vec<f32>> = self.staging.iter_mut().map(std::mem::take).collect();

        let mut output = Vec::new();
        match inner.process(&chunk, None) {
            Ok(resampled) => {
                let wanted = (remaining as f64 * self.ratio()).ceil() as usize;
                let trimmed: Vec<Vec<f32>> = resampled
                    .iter()
                    .map(|ch| ch.iter().copied().take(wanted).collect())
                    .collect();
                interleave_into(&trimmed, &mut output);
            }
            Err(e) => {
                tracing::warn!(target: "player::resampler", error = %e, "flush error");
            }
        }
        output
    }

    /// Forget staged input and converter history (call after a seek).
    pub fn reset(&mut self) {
        for ch in &mut self.staging {
            ch.clear();
        }
        if let Some(ref mut inner) = self.inner {
            inner.reset();
        }
    }
}

fn interleave_into(planar: &[Vec<f32>], out: &mut Vec<f32>) {
    if planar.is_empty() || planar[0].is_empty() {
        return;
    }
    let frames = planar[0].len();
    out.reserve(frames * planar.len());
    for frame in 0..frames {
        for ch in planar {
            out.push(ch[frame]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passthrough_when_rates_match() {
        let mut r = Resampler::new(48000, 48000, 2).unwrap();
        assert!(r.is_passthrough());
        let input = vec![0.1, 0.2, 0.3, 0.4];
        assert_eq!(r.process(&input), input);
        assert!(r.flush().is_empty());
    }

    #[test]
    fn test_conversion_active_when_rates_differ() {
        let r = Resampler::new(44100, 48000, 2).unwrap();
        assert!(!r.is_passthrough());
        assert!((r.ratio() - 48000.0 / 44100.0).abs() < 1e-6);
    }

    #[test]
    fn test_produces_roughly_ratio_scaled_output() {
        let mut r = Resampler::new(44100, 48000, 2).unwrap();
        // 4 full chunks of stereo input.
        let frames = CHUNK_FRAMES * 4;
        let input = vec![0.25f32; frames * 2];
        let mut total = r.process(&input).len();
        total += r.flush().len();

        let expected = (frames as f64 * r.ratio()) as usize * 2;
        let tolerance = CHUNK_FRAMES * 2 * 2;
        assert!(
            total.abs_diff(expected) < tolerance,
            "got {total}, expected ~{expected}"
        );
    }

    #[test]
    fn test_reset_discards_staging() {
        let mut r = Resampler::new(44100, 48000, 2).unwrap();
        r.process(&vec![0.5f32; 100]);
        r.reset();
        assert!(r.flush().is_empty());
    }
}
