use crate::library::{
    NewStory, NewVoice, StoreError, StoryId, StoryRecord, StoryStatus, StoryStore, VoiceRecord,
    VoiceRecordId, PENDING_TITLE,
};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::BTreeMap;
use std::time::SystemTime;
use tokio::sync::RwLock;

const LOG_TARGET: &str = "library::memory";

#[derive(Default)]
struct Tables {
    next_story: StoryId,
    next_voice: VoiceRecordId,
    stories: BTreeMap<StoryId, StoryRecord>,
    voices: BTreeMap<VoiceRecordId, VoiceRecord>,
}

/// Process-local store. Ids start at 1 and are never reused.
#[derive(Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StoryStore for InMemoryStore {
    fn insert_story(&self, story: NewStory) -> BoxFuture<'_, Result<StoryRecord, StoreError>> {
        async move {
            let mut tables = self.tables.write().await;
            tables.next_story += 1;
            let record = StoryRecord {
                id: tables.next_story,
                prompt: story.prompt,
                child_name: story.child_name,
                age_group: story.age_group,
                voice: story.voice,
                title: PENDING_TITLE.to_owned(),
                content: String::new(),
                duration_secs: None,
                status: StoryStatus::Generating,
                created_at: SystemTime::now(),
            };
            tables.stories.insert(record.id, record.clone());
            tracing::debug!(target: LOG_TARGET, id = record.id, "story inserted");
            Ok(record)
        }
        .boxed()
    }

    fn update_story(&self, story: StoryRecord) -> BoxFuture<'_, Result<StoryRecord, StoreError>> {
        async move {
            let mut tables = self.tables.write().await;
            let slot = tables
                .stories
                .get_mut(&story.id)
                .ok_or(StoreError::StoryNotFound(story.id))?;
            *slot = story.clone();
            Ok(story)
        }
        .boxed()
    }

    fn get_story(&self, id: StoryId) -> BoxFuture<'_, Result<StoryRecord, StoreError>> {
        async move {
            self.tables
                .read()
                .await
                .stories
                .get(&id)
                .cloned()
                .ok_or(StoreError::StoryNotFound(id))
        }
        .boxed()
    }

    fn list_stories(&self) -> BoxFuture<'_, Result<Vec<StoryRecord>, StoreError>> {
        async move {
            // Ids are assigned in insertion order, so reverse id order is newest first.
            Ok(self
                .tables
                .read()
                .await
                .stories
                .values()
                .rev()
                .cloned()
                .collect())
        }
        .boxed()
    }

    fn insert_voice(&self, voice: NewVoice) -> BoxFuture<'_, Result<VoiceRecord, StoreError>> {
        async move {
            let mut tables = self.tables.write().await;
            tables.next_voice += 1;
            let record = VoiceRecord {
                id: tables.next_voice,
                name: voice.name,
                description: voice.description,
                provider_voice_id: voice.provider_voice_id,
                created_at: SystemTime::now(),
            };
            tables.voices.insert(record.id, record.clone());
            tracing::debug!(target: LOG_TARGET, id = record.id, "voice inserted");
            Ok(record)
        }
        .boxed()
    }

    fn get_voice(&self, id: VoiceRecordId) -> BoxFuture<'_, Result<VoiceRecord, StoreError>> {
        async move {
            self.tables
                .read()
                .await
                .voices
                .get(&id)
                .cloned()
                .ok_or(StoreError::VoiceNotFound(id))
        }
        .boxed()
    }

    fn list_voices(&self) -> BoxFuture<'_, Result<Vec<VoiceRecord>, StoreError>> {
        async move { Ok(self.tables.read().await.voices.values().rev().cloned().collect()) }
            .boxed()
    }

    fn delete_voice(&self, id: VoiceRecordId) -> BoxFuture<'_, Result<VoiceRecord, StoreError>> {
        async move {
            let mut tables = self.tables.write().await;
            let removed = tables
                .voices
                .remove(&id)
                .ok_or(StoreError::VoiceNotFound(id))?;
            // Stories keep their text but fall back to the stock voice.
            for story in tables.stories.values_mut() {
                if story.voice == Some(id) {
                    story.voice = None;
                }
            }
            tracing::debug!(target: LOG_TARGET, id, "voice deleted");
            Ok(removed)
        }
        .boxed()
    }
}
