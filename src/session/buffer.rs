//! Per-role turn accumulator
//!
//! Collects a role's audio bytes and text fragments until the turn closes,
//! then drains both atomically. Owned by a single enrichment subscriber, so
//! callers hold it behind that subscriber's own lock.

use crate::types::Role;

/// Rolling audio + text accumulator with a turn boundary
#[derive(Debug)]
pub struct MessageBuffer {
    pub role: Role,
    current_audio: Vec<u8>,
    current_text: String,
    turn_complete: bool,
    turns_completed: u64,
}

impl MessageBuffer {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            current_audio: Vec::new(),
            current_text: String::new(),
            turn_complete: false,
            turns_completed: 0,
        }
    }

    pub fn add_audio(&mut self, audio: &[u8]) {
        self.current_audio.extend_from_slice(audio);
    }

    pub fn add_text(&mut self, text: &str, end_of_turn: bool) {
        self.current_text.push_str(text);
        self.turn_complete = end_of_turn;
    }

    /// Drain and reset atomically, returning the completed turn's content
    pub fn end_turn(&mut self) -> (Vec<u8>, String) {
        let audio = std::mem::take(&mut self.current_audio);
        let text = std::mem::take(&mut self.current_text);
        self.turn_complete = false;
        self.turns_completed += 1;
        (audio, text)
    }

    pub fn audio(&self) -> &[u8] {
        &self.current_audio
    }

    /// Whether the most recent text fragment carried the end-of-turn flag
    pub fn turn_complete(&self) -> bool {
        self.turn_complete
    }

    pub fn is_empty(&self) -> bool {
        self.current_audio.is_empty() && self.current_text.is_empty()
    }

    /// Index of the turn currently being accumulated (0-based)
    pub fn turn_index(&self) -> u64 {
        self.turns_completed
    }
}
