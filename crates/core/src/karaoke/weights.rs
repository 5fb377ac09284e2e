use crate::config::{ConfigError, WeightTuning};
use serde::{Deserialize, Serialize};

const SENTENCE_END: [char; 3] = ['.', '!', '?'];
const CLAUSE_END: [char; 3] = [',', ';', ':'];
const QUOTE_MARKS: [char; 3] = ['"', '\'', '—'];

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct WordToken {
    pub text: String,
    pub weight: f64,
    pub cumulative_weight: f64,
}

/// Whitespace-split story words with their estimated relative speaking time.
///
/// Built once per story text and never mutated afterwards, so a single
/// timeline can be shared by any number of playback sources.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct WordTimeline {
    tokens: Vec<WordToken>,
    total_weight: f64,
}

impl WordTimeline {
    /// Fails when `tuning` would give a word zero or negative weight.
    pub fn from_text(text: &str, tuning: &WeightTuning) -> Result<Self, ConfigError> {
        tuning.validate()?;

        let mut tokens = Vec::new();
        let mut running = 0.0f64;

        for word in tokenize(text) {
            let weight = word_weight(word, tuning);
            running += weight;
            tokens.push(WordToken {
                text: word.to_owned(),
                weight,
                cumulative_weight: running,
            });
        }

        Ok(Self {
            tokens,
            total_weight: running,
        })
    }

    pub fn tokens(&self) -> &[WordToken] {
        &self.tokens
    }

    pub fn total_weight(&self) -> f64 {
        self.total_weight
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn last_index(&self) -> Option<usize> {
        self.tokens.len().checked_sub(1)
    }

    pub fn words(&self) -> impl Iterator<Item = &str> {
        self.tokens.iter().map(|t| t.text.as_str())
    }
}

pub fn tokenize(text: &str) -> impl Iterator<Item = &str> {
    text.split_whitespace()
}

/// Relative speaking time of one token.
///
/// Words shorter than one length unit all take the floor weight, longer ones
/// scale with their character count. Pause bonuses are added on top.
pub fn word_weight(word: &str, tuning: &WeightTuning) -> f64 {
    let chars = word.chars().count() as f64;
    let mut weight = if chars < tuning.chars_per_unit {
        tuning.min_weight
    } else {
        (chars / tuning.chars_per_unit).max(tuning.min_weight)
    };

    if word.ends_with(SENTENCE_END) {
        weight += tuning.sentence_pause;
    }
    if word.ends_with(CLAUSE_END) {
        weight += tuning.clause_pause;
    }
    if word.contains(QUOTE_MARKS) {
        weight += tuning.quote_pause;
    }

    weight
}
