mod memory;

use crate::story::AgeGroup;
use crate::tts::VoiceId;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

pub use memory::InMemoryStore;

pub type StoryId = u64;
pub type VoiceRecordId = u64;

pub const PENDING_TITLE: &str = "Generating...";

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StoryStatus {
    Draft,
    Generating,
    Ready,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct StoryRecord {
    pub id: StoryId,
    pub prompt: String,
    pub child_name: Option<String>,
    pub age_group: AgeGroup,
    pub voice: Option<VoiceRecordId>,
    pub title: String,
    pub content: String,
    pub duration_secs: Option<u64>,
    pub status: StoryStatus,
    pub created_at: SystemTime,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct NewStory {
    pub prompt: String,
    pub child_name: Option<String>,
    pub age_group: AgeGroup,
    pub voice: Option<VoiceRecordId>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct VoiceRecord {
    pub id: VoiceRecordId,
    pub name: String,
    pub description: Option<String>,
    pub provider_voice_id: VoiceId,
    pub created_at: SystemTime,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct NewVoice {
    pub name: String,
    pub description: Option<String>,
    pub provider_voice_id: VoiceId,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("story {0} not found")]
    StoryNotFound(StoryId),
    #[error("voice {0} not found")]
    VoiceNotFound(VoiceRecordId),
}

/// Persistence for story and voice records.
pub trait StoryStore: Send + Sync {
    fn insert_story(&self, story: NewStory) -> BoxFuture<'_, Result<StoryRecord, StoreError>>;

    fn update_story(&self, story: StoryRecord) -> BoxFuture<'_, Result<StoryRecord, StoreError>>;

    fn get_story(&self, id: StoryId) -> BoxFuture<'_, Result<StoryRecord, StoreError>>;

    /// Newest first.
    fn list_stories(&self) -> BoxFuture<'_, Result<Vec<StoryRecord>, StoreError>>;

    fn insert_voice(&self, voice: NewVoice) -> BoxFuture<'_, Result<VoiceRecord, StoreError>>;

    fn get_voice(&self, id: VoiceRecordId) -> BoxFuture<'_, Result<VoiceRecord, StoreError>>;

    fn list_voices(&self) -> BoxFuture<'_, Result<Vec<VoiceRecord>, StoreError>>;

    fn delete_voice(&self, id: VoiceRecordId) -> BoxFuture<'_, Result<VoiceRecord, StoreError>>;
}

/// Download name for a story's narration: every character outside
/// `[A-Za-z0-9]` becomes `_`.
pub fn audio_file_name(title: &str) -> String {
    let stem: String = title
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("{stem}.mp3")
}
