//! Turn boundary detection (step-by-step mode)
//!
//! A user turn closes on an explicit `end_of_turn` flag, or when the
//! accumulated audio shows roughly a second of trailing silence after
//! detected speech. Detection runs over the whole buffer each time, so the
//! caller resets state simply by draining the buffer.

use std::time::Duration;

use crate::audio::pcm_samples;
use crate::vad::detect_speech_segments;

/// Trailing silence that ends a turn
pub const DEFAULT_TRAILING_SILENCE: Duration = Duration::from_secs(1);

/// Decides when buffered user audio constitutes a finished turn
#[derive(Debug, Clone, Copy)]
pub struct TurnDetector {
    sample_rate: u32,
    trailing_silence: Duration,
}

impl TurnDetector {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            trailing_silence: DEFAULT_TRAILING_SILENCE,
        }
    }

    pub fn with_trailing_silence(mut self, trailing_silence: Duration) -> Self {
        self.trailing_silence = trailing_silence;
        self
    }

    /// Whether the buffered PCM (16-bit mono bytes) ends a turn.
    ///
    /// Runs VAD only once the buffer exceeds the silence window, and closes
    /// when the last detected speech ended more than the window before the
    /// buffer end. A buffer with no detected speech at all never closes a
    /// turn; it waits for an explicit flag instead.
    pub fn should_close(&self, pcm: &[u8]) -> bool {
        let window = (self.sample_rate as f64 * self.trailing_silence.as_secs_f64()) as usize;
        let samples = pcm_samples(pcm);
        if samples.len() <= window {
            return false;
        }
        match detect_speech_segments(&samples, self.sample_rate).last() {
            Some(segment) => segment.end_sample < samples.len() - window,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: u32 = 16_000;

    fn pcm(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    fn speech(secs: f64) -> Vec<i16> {
        (0..(secs * RATE as f64) as usize)
            .map(|i| if i % 2 == 0 { 3000 } else { -3000 })
            .collect()
    }

    fn silence(secs: f64) -> Vec<i16> {
        vec![0; (secs * RATE as f64) as usize]
    }

    #[test]
    fn test_short_buffer_never_closes() {
        let detector = TurnDetector::new(RATE);
        assert!(!detector.should_close(&pcm(&speech(0.5))));
    }

    #[test]
    fn test_trailing_silence_closes() {
        let detector = TurnDetector::new(RATE);
        let mut samples = speech(3.0);
        samples.extend(silence(1.5));
        assert!(detector.should_close(&pcm(&samples)));
    }

    #[test]
    fn test_ongoing_speech_does_not_close() {
        let detector = TurnDetector::new(RATE);
        let mut samples = speech(3.0);
        samples.extend(silence(0.5));
        assert!(!detector.should_close(&pcm(&samples)));
    }

    #[test]
    fn test_pure_silence_waits_for_explicit_flag() {
        let detector = TurnDetector::new(RATE);
        assert!(!detector.should_close(&pcm(&silence(5.0))));
    }
}
