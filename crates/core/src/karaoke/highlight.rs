use crate::config::SyncTuning;
use crate::karaoke::{map_time_to_word_index, PlaybackState, WordTimeline};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum WordState {
    Spoken,
    Current,
    Unspoken,
}

/// The highlighted word as seen by whatever renders the story text.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct HighlightState {
    current: Option<usize>,
}

impl HighlightState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<usize> {
        self.current
    }

    pub fn is_reading(&self) -> bool {
        self.current.is_some()
    }

    /// Recomputes the highlight for `playback`. Returns true when it moved.
    pub fn apply(
        &mut self,
        playback: PlaybackState,
        timeline: &WordTimeline,
        tuning: &SyncTuning,
    ) -> bool {
        let next = map_time_to_word_index(
            playback.current_time_secs,
            playback.total_duration_secs,
            timeline,
            tuning,
        );
        let changed = next != self.current;
        self.current = next;
        changed
    }

    pub fn reset(&mut self) -> bool {
        self.current.take().is_some()
    }

    pub fn word_state(&self, index: usize) -> WordState {
        match self.current {
            Some(cur) if index < cur => WordState::Spoken,
            Some(cur) if index == cur => WordState::Current,
            _ => WordState::Unspoken,
        }
    }
}
