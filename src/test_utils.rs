//! Shared helpers for tests.

use std::path::Path;

/// Write a minimal valid mono 16-bit PCM WAV file.
///
/// `millis` of silence at 8 kHz; enough for tag probing and duration
/// calculation without shipping binary fixtures.
pub fn write_test_wav(path: &Path, millis: u32) {
    const SAMPLE_RATE: u32 = 8000;
    const BITS: u16 = 16;
    const CHANNELS: u16 = 1;

    let frames = SAMPLE_RATE * millis / 1000;
    let data_len = frames * u32::from(BITS / 8) * u32::from(CHANNELS);
    let byte_rate = SAMPLE_RATE * u32::from(BITS / 8) * u32::from(CHANNELS);
    let block_align = CHANNELS * (BITS / 8);

    let mut buf = Vec::with_capacity(44 + data_len as usize);
    buf.extend_from_slice(b"RIFF");
    buf.extend_from_slice(&(36 + data_len).to_le_bytes());
    buf.extend_from_slice(b"WAVE");
    buf.extend_from_slice(b"fmt ");
    buf.extend_from_slice(&16u32.to_le_bytes());
    buf.extend_from_slice(&1u16.to_le_bytes()); // PCM
    buf.extend_from_slice(&CHANNELS.to_le_bytes());
    buf.extend_from_slice(&SAMPLE_RATE.to_le_bytes());
    buf.extend_from_slice(&byte_rate.to_le_bytes());
    buf.extend_from_slice(&block_align.to_le_bytes());
    buf.extend_from_slice(&BITS.to_le_bytes());
    buf.extend_from_slice(b"data");
    buf.extend_from_slice(&data_len.to_le_bytes());
    buf.resize(44 + data_len as usize, 0);

    std::fs::write(path, buf).expect("failed to write test wav");
}
