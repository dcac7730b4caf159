//! Audio format helpers
//!
//! Raw PCM on the wire is 16-bit little-endian mono; services that need a
//! containered format get a WAV (RIFF) wrapper built with hound. The mime
//! string carries the sample rate (`audio/pcm;rate=16000`).

use anyhow::{Context, Result};
use std::io::Cursor;

/// Fallback when a PCM mime string does not declare a rate
pub const DEFAULT_SAMPLE_RATE: u32 = 16_000;

/// Extract the sample rate from a mime string like `audio/pcm;rate=16000`
pub fn extract_sample_rate(mime_type: &str) -> u32 {
    mime_type
        .split(";rate=")
        .nth(1)
        .and_then(|rate| rate.split(';').next())
        .and_then(|rate| rate.trim().parse().ok())
        .unwrap_or(DEFAULT_SAMPLE_RATE)
}

/// Wrap raw 16-bit mono PCM in a WAV container, taking the rate from the
/// mime string. Data already in WAV form passes through unchanged.
pub fn pcm_to_wav(data: &[u8], mime_type: &str) -> Result<Vec<u8>> {
    if mime_type == "audio/wav" {
        return Ok(data.to_vec());
    }

    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: extract_sample_rate(mime_type),
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).context("creating WAV writer")?;
        for sample in pcm_samples(data) {
            writer.write_sample(sample).context("writing WAV sample")?;
        }
        writer.finalize().context("finalizing WAV container")?;
    }
    Ok(cursor.into_inner())
}

/// Decode raw little-endian 16-bit PCM bytes into samples. A trailing odd
/// byte is dropped.
pub fn pcm_samples(data: &[u8]) -> Vec<i16> {
    data.chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

/// Duration of a raw 16-bit mono PCM byte buffer
pub fn pcm_duration_secs(byte_len: usize, sample_rate: u32) -> f64 {
    (byte_len / 2) as f64 / sample_rate as f64
}
