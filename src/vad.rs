//! Voice Activity Detection
//!
//! Frame-by-frame RMS energy analysis over 16-bit mono PCM with onset and
//! hangover smoothing. Produces the speech segments (sample ranges) that
//! the step-by-step turn detector inspects for trailing silence.

use serde::Serialize;

/// Frame length in milliseconds
pub const DEFAULT_FRAME_MS: u32 = 20;

/// RMS threshold over raw i16 samples above which a frame counts as speech
pub const DEFAULT_SPEECH_RMS_THRESHOLD: f32 = 250.0;

/// Consecutive speech frames required to open a segment (40ms)
pub const DEFAULT_ONSET_FRAMES: usize = 2;

/// Consecutive silent frames required to close a segment (300ms)
pub const DEFAULT_HANGOVER_FRAMES: usize = 15;

/// VAD tuning parameters
#[derive(Debug, Clone, Copy)]
pub struct VadConfig {
    pub frame_ms: u32,
    pub speech_rms_threshold: f32,
    pub onset_frames: usize,
    pub hangover_frames: usize,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            frame_ms: DEFAULT_FRAME_MS,
            speech_rms_threshold: DEFAULT_SPEECH_RMS_THRESHOLD,
            onset_frames: DEFAULT_ONSET_FRAMES,
            hangover_frames: DEFAULT_HANGOVER_FRAMES,
        }
    }
}

/// A contiguous span of detected speech, in sample offsets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SpeechSegment {
    pub start_sample: usize,
    pub end_sample: usize,
}

impl SpeechSegment {
    pub fn duration_secs(&self, sample_rate: u32) -> f64 {
        (self.end_sample - self.start_sample) as f64 / sample_rate as f64
    }
}

/// Compute RMS energy of raw i16 samples
pub fn rms_energy(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = samples.iter().map(|&s| (s as f32).powi(2)).sum();
    (sum_sq / samples.len() as f32).sqrt()
}

/// Detect speech segments in a PCM buffer with default tuning
pub fn detect_speech_segments(samples: &[i16], sample_rate: u32) -> Vec<SpeechSegment> {
    detect_speech_segments_with(samples, sample_rate, &VadConfig::default())
}

/// Detect speech segments in a PCM buffer.
///
/// A segment opens after `onset_frames` consecutive voiced frames (its start
/// backdated to the first of them) and closes after `hangover_frames`
/// consecutive silent frames, ending at the last voiced frame. A segment
/// still open at the end of the buffer is emitted as ending at the buffer
/// end.
pub fn detect_speech_segments_with(
    samples: &[i16],
    sample_rate: u32,
    config: &VadConfig,
) -> Vec<SpeechSegment> {
    let frame_size = (sample_rate as usize * config.frame_ms as usize) / 1000;
    if frame_size == 0 {
        return Vec::new();
    }

    let mut segments = Vec::new();
    let mut voiced_run = 0usize;
    let mut silent_run = 0usize;
    let mut in_speech = false;
    let mut segment_start = 0usize;
    let mut last_voiced_end = 0usize;

    for (index, frame) in samples.chunks(frame_size).enumerate() {
        if frame.len() < frame_size {
            break; // partial frame at the end
        }
        let frame_start = index * frame_size;
        let is_voiced = rms_energy(frame) > config.speech_rms_threshold;

        if is_voiced {
            voiced_run += 1;
            silent_run = 0;
            last_voiced_end = frame_start + frame_size;
            if !in_speech && voiced_run >= config.onset_frames {
                in_speech = true;
                segment_start = frame_start + frame_size - voiced_run * frame_size;
            }
        } else {
            voiced_run = 0;
            if in_speech {
                silent_run += 1;
                if silent_run >= config.hangover_frames {
                    segments.push(SpeechSegment {
                        start_sample: segment_start,
                        end_sample: last_voiced_end,
                    });
                    in_speech = false;
                    silent_run = 0;
                }
            }
        }
    }

    if in_speech {
        segments.push(SpeechSegment {
            start_sample: segment_start,
            end_sample: last_voiced_end,
        });
    }

    segments
}
