//! Karaoke-style word highlighting for narrated stories.
//!
//! A [`WordTimeline`] is derived once from the story text. Each playback tick
//! is then mapped to a word index by [`map_time_to_word_index`], a pure
//! function of the playback position, the track duration and the timeline.

mod highlight;
mod mapper;
mod session;
mod weights;

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use highlight::{HighlightState, WordState};
pub use mapper::map_time_to_word_index;
pub use session::{HighlightUpdate, KaraokeSession};
pub use weights::{tokenize, word_weight, WordTimeline, WordToken};

/// Snapshot of the audio player's clock. Owned by the player, read here.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct PlaybackState {
    pub current_time_secs: f64,
    pub total_duration_secs: f64,
}

impl PlaybackState {
    pub fn new(current: Duration, total: Duration) -> Self {
        Self {
            current_time_secs: current.as_secs_f64(),
            total_duration_secs: total.as_secs_f64(),
        }
    }

    pub fn loaded(total: Duration) -> Self {
        Self::new(Duration::ZERO, total)
    }
}
