use crate::config::{ConfigError, SyncTuning};
use crate::karaoke::{HighlightState, PlaybackState, WordState, WordTimeline};
use crate::playback::PlaybackEvent;
use std::time::Duration;

const LOG_TARGET: &str = "karaoke::session";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HighlightUpdate {
    pub index: Option<usize>,
    pub position: Duration,
}

/// Drives a [`HighlightState`] from the events of one loaded track.
#[derive(Clone, Debug)]
pub struct KaraokeSession {
    timeline: WordTimeline,
    tuning: SyncTuning,
    highlight: HighlightState,
    duration: Option<Duration>,
}

impl KaraokeSession {
    pub fn new(text: &str, tuning: SyncTuning) -> Result<Self, ConfigError> {
        let timeline = WordTimeline::from_text(text, &tuning.weights)?;
        Ok(Self::from_timeline(timeline, tuning))
    }

    pub fn from_timeline(timeline: WordTimeline, tuning: SyncTuning) -> Self {
        Self {
            timeline,
            tuning,
            highlight: HighlightState::new(),
            duration: None,
        }
    }

    pub fn timeline(&self) -> &WordTimeline {
        &self.timeline
    }

    pub fn highlight(&self) -> HighlightState {
        self.highlight
    }

    pub fn on_event(&mut self, event: PlaybackEvent) -> Option<HighlightUpdate> {
        match event {
            PlaybackEvent::Loaded { duration } => {
                tracing::debug!(
                    target: LOG_TARGET,
                    duration_secs = duration.as_secs_f64(),
                    words = self.timeline.len(),
                    "track loaded"
                );
                self.duration = Some(duration);
                self.reset_at(Duration::ZERO)
            }
            PlaybackEvent::TimeUpdate { position } => {
                let Some(total) = self.duration else {
                    tracing::debug!(target: LOG_TARGET, "time update before metadata; ignoring");
                    return None;
                };
                let changed = self.highlight.apply(
                    PlaybackState::new(position, total),
                    &self.timeline,
                    &self.tuning,
                );
                changed.then_some(HighlightUpdate {
                    index: self.highlight.current(),
                    position,
                })
            }
            PlaybackEvent::Ended { position } | PlaybackEvent::Stopped { position } => {
                self.duration = None;
                self.reset_at(position)
            }
        }
    }

    fn reset_at(&mut self, position: Duration) -> Option<HighlightUpdate> {
        self.highlight.reset().then_some(HighlightUpdate {
            index: None,
            position,
        })
    }

    pub fn current_word(&self) -> Option<&str> {
        self.highlight
            .current()
            .and_then(|i| self.timeline.tokens().get(i))
            .map(|t| t.text.as_str())
    }

    /// Renders the story as one line, letting `mark` decorate each word.
    pub fn render(&self, mark: impl Fn(&str, WordState) -> String) -> String {
        self.timeline
            .words()
            .enumerate()
            .map(|(i, word)| mark(word, self.highlight.word_state(i)))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> KaraokeSession {
        KaraokeSession::new("The cat sat. The dog ran!", SyncTuning::default()).unwrap()
    }

    fn brackets(word: &str, state: WordState) -> String {
        match state {
            WordState::Current => format!("[{word}]"),
            _ => word.to_owned(),
        }
    }

    #[test]
    fn ticks_before_load_are_ignored() {
        let mut s = session();
        assert_eq!(
            s.on_event(PlaybackEvent::TimeUpdate {
                position: Duration::from_secs(1)
            }),
            None
        );
        assert!(!s.highlight().is_reading());
    }

    #[test]
    fn forward_playback_emits_each_change_once() {
        let mut s = session();
        assert_eq!(
            s.on_event(PlaybackEvent::Loaded {
                duration: Duration::from_millis(5100)
            }),
            None
        );

        let mut seen = Vec::new();
        for ms in (0..=5100).step_by(50) {
            if let Some(update) = s.on_event(PlaybackEvent::TimeUpdate {
                position: Duration::from_millis(ms),
            }) {
                seen.push(update.index);
            }
        }
        assert_eq!(
            seen,
            vec![Some(0), Some(1), Some(2), Some(3), Some(4), Some(5)]
        );
        assert_eq!(s.current_word(), Some("ran!"));
    }

    #[test]
    fn seek_back_moves_highlight_back() {
        let mut s = session();
        s.on_event(PlaybackEvent::Loaded {
            duration: Duration::from_millis(5100),
        });
        s.on_event(PlaybackEvent::TimeUpdate {
            position: Duration::from_millis(4500),
        });
        let update = s
            .on_event(PlaybackEvent::TimeUpdate {
                position: Duration::from_millis(600),
            })
            .expect("changed");
        assert_eq!(update.index, Some(0));
    }

    #[test]
    fn end_and_stop_clear_highlight() {
        let mut s = session();
        s.on_event(PlaybackEvent::Loaded {
            duration: Duration::from_secs(5),
        });
        s.on_event(PlaybackEvent::TimeUpdate {
            position: Duration::from_secs(2),
        });
        let update = s
            .on_event(PlaybackEvent::Ended {
                position: Duration::from_secs(5),
            })
            .expect("cleared");
        assert_eq!(update.index, None);
        assert_eq!(s.current_word(), None);

        // nothing left to clear
        assert_eq!(
            s.on_event(PlaybackEvent::Stopped {
                position: Duration::ZERO
            }),
            None
        );
        // ticks after stop wait for the next track
        assert_eq!(
            s.on_event(PlaybackEvent::TimeUpdate {
                position: Duration::from_secs(1)
            }),
            None
        );
    }

    #[test]
    fn render_marks_current_word() {
        let mut s = session();
        assert_eq!(s.render(brackets), "The cat sat. The dog ran!");
        s.on_event(PlaybackEvent::Loaded {
            duration: Duration::from_millis(5100),
        });
        s.on_event(PlaybackEvent::TimeUpdate {
            position: Duration::from_millis(2000),
        });
        assert_eq!(s.render(brackets), "The cat [sat.] The dog ran!");
    }
}
