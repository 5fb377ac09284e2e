mod openai;
mod prompt;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use openai::{OpenAiStoryGenerator, DEFAULT_MODEL};
pub use prompt::{system_prompt, user_prompt};

pub const MIN_PROMPT_CHARS: usize = 10;
pub const DEFAULT_TITLE: &str = "A Magical Story";
/// Unhurried bedtime reading pace.
pub const NARRATION_WORDS_PER_MINUTE: f64 = 120.0;

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgeGroup {
    Toddler,
    #[default]
    Preschool,
    EarlyReader,
    ChapterBook,
}

impl AgeGroup {
    pub const ALL: [AgeGroup; 4] = [
        AgeGroup::Toddler,
        AgeGroup::Preschool,
        AgeGroup::EarlyReader,
        AgeGroup::ChapterBook,
    ];

    pub fn code(self) -> &'static str {
        match self {
            AgeGroup::Toddler => "TODDLER",
            AgeGroup::Preschool => "PRESCHOOL",
            AgeGroup::EarlyReader => "EARLY_READER",
            AgeGroup::ChapterBook => "CHAPTER_BOOK",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            AgeGroup::Toddler => "TODDLER",
            AgeGroup::Preschool => "PRESCHOOL",
            AgeGroup::EarlyReader => "EARLY READER",
            AgeGroup::ChapterBook => "CHAPTER BOOK",
        }
    }
}

impl fmt::Display for AgeGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for AgeGroup {
    type Err = StoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let norm = s.trim().to_ascii_uppercase().replace(['-', ' '], "_");
        AgeGroup::ALL
            .into_iter()
            .find(|g| g.code() == norm)
            .ok_or_else(|| StoryError::InvalidRequest(format!("unknown age group: {s}")))
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoryRequest {
    pub prompt: String,
    pub child_name: Option<String>,
    pub age_group: AgeGroup,
}

impl StoryRequest {
    pub fn new(
        prompt: impl Into<String>,
        child_name: Option<String>,
        age_group: AgeGroup,
    ) -> Result<Self, StoryError> {
        let prompt = prompt.into().trim().to_owned();
        if prompt.chars().count() < MIN_PROMPT_CHARS {
            return Err(StoryError::InvalidRequest(
                "Please describe your story idea in more detail".to_owned(),
            ));
        }
        let child_name = child_name
            .map(|n| n.trim().to_owned())
            .filter(|n| !n.is_empty());
        Ok(Self {
            prompt,
            child_name,
            age_group,
        })
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct GeneratedStory {
    pub title: String,
    pub content: String,
}

impl GeneratedStory {
    pub fn estimated_narration_secs(&self) -> u64 {
        estimate_narration_secs(&self.content)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum StoryError {
    #[error("invalid story request: {0}")]
    InvalidRequest(String),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("story api returned HTTP {status}: {message}")]
    Api { status: u16, message: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("story generator returned no story text")]
    EmptyStory,
}

impl StoryError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(e) => e.is_timeout() || e.is_connect(),
            Self::Api { status, .. } => crate::util::is_http_retryable(*status),
            _ => false,
        }
    }
}

pub trait StoryGenerator: Send + Sync {
    fn generate(&self, request: StoryRequest) -> BoxFuture<'_, Result<GeneratedStory, StoryError>>;
}

/// Splits a `TITLE: ...\n---\n<story>` completion into title and body.
pub fn parse_story_response(raw: &str) -> GeneratedStory {
    let title = raw
        .find("TITLE:")
        .map(|start| {
            let rest = &raw[start + "TITLE:".len()..];
            let end = [rest.find('\n'), rest.find("---")]
                .into_iter()
                .flatten()
                .min()
                .unwrap_or(rest.len());
            rest[..end].trim()
        })
        .filter(|t| !t.is_empty())
        .unwrap_or(DEFAULT_TITLE)
        .to_owned();

    let content = match raw.find("---") {
        Some(idx) => raw[idx + 3..].trim().to_owned(),
        None => strip_title_line(raw).trim().to_owned(),
    };

    GeneratedStory { title, content }
}

fn strip_title_line(raw: &str) -> String {
    match raw.find("TITLE:") {
        Some(start) => {
            let end = raw[start..]
                .find('\n')
                .map(|i| start + i + 1)
                .unwrap_or(raw.len());
            format!("{}{}", &raw[..start], &raw[end..])
        }
        None => raw.to_owned(),
    }
}

/// Narration length in whole seconds, rounded up.
pub fn estimate_narration_secs(content: &str) -> u64 {
    let words = content.split_whitespace().count() as f64;
    (words / NARRATION_WORDS_PER_MINUTE * 60.0).ceil() as u64
}
