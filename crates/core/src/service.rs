//! Story lifecycle: generate text, narrate it, manage cloned voices.

use crate::library::{
    NewStory, NewVoice, StoreError, StoryId, StoryRecord, StoryStatus, StoryStore, VoiceRecord,
    VoiceRecordId,
};
use crate::story::{StoryError, StoryGenerator, StoryRequest};
use crate::tts::{
    default_voice, TtsAudio, TtsClient, TtsError, TtsRequest, VoiceCloner, VoiceId, VoiceSample,
    VoiceSettings,
};

const LOG_TARGET: &str = "service";

#[derive(thiserror::Error, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    Story(#[from] StoryError),

    #[error(transparent)]
    Tts(#[from] TtsError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("story {0} has no content to narrate")]
    EmptyStory(StoryId),

    #[error("voice name must not be empty")]
    EmptyVoiceName,
}

pub type Result<T> = std::result::Result<T, ServiceError>;

pub struct StoryService<G, T, S> {
    generator: G,
    tts: T,
    store: S,
}

impl<G, T, S> StoryService<G, T, S> {
    pub fn new(generator: G, tts: T, store: S) -> Self {
        Self {
            generator,
            tts,
            store,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

impl<G, T, S> StoryService<G, T, S>
where
    G: StoryGenerator,
    T: TtsClient,
    S: StoryStore,
{
    /// Records a pending story, then fills it in from the generator. A failed
    /// generation leaves the record behind as a draft.
    pub async fn create_story(
        &self,
        request: StoryRequest,
        voice: Option<VoiceRecordId>,
    ) -> Result<StoryRecord> {
        if let Some(id) = voice {
            self.store.get_voice(id).await?;
        }

        let mut record = self
            .store
            .insert_story(NewStory {
                prompt: request.prompt.clone(),
                child_name: request.child_name.clone(),
                age_group: request.age_group,
                voice,
            })
            .await?;

        match self.generator.generate(request).await {
            Ok(story) => {
                record.duration_secs = Some(story.estimated_narration_secs());
                record.title = story.title;
                record.content = story.content;
                record.status = StoryStatus::Ready;
                let record = self.store.update_story(record).await?;
                tracing::info!(target: LOG_TARGET, id = record.id, title = %record.title, "story ready");
                Ok(record)
            }
            Err(e) => {
                tracing::warn!(target: LOG_TARGET, id = record.id, error = %e, "story generation failed");
                record.status = StoryStatus::Draft;
                self.store.update_story(record).await?;
                Err(e.into())
            }
        }
    }

    pub async fn narrate_story(&self, id: StoryId) -> Result<TtsAudio> {
        let story = self.store.get_story(id).await?;
        if story.content.trim().is_empty() {
            return Err(ServiceError::EmptyStory(id));
        }

        let voice = match story.voice {
            Some(voice_id) => match self.store.get_voice(voice_id).await {
                Ok(v) => v.provider_voice_id,
                Err(StoreError::VoiceNotFound(_)) => default_voice(),
                Err(e) => return Err(e.into()),
            },
            None => default_voice(),
        };

        tracing::info!(target: LOG_TARGET, id, voice = voice.as_str(), "narrating story");
        let audio = self
            .tts
            .synthesize(TtsRequest {
                text: story.content,
                voice: Some(voice),
                settings: Some(VoiceSettings::narration()),
            })
            .await?;
        Ok(audio)
    }
}

// No generator bound: a voice-only service can pass `()` for it.
impl<G, T, S> StoryService<G, T, S>
where
    T: VoiceCloner,
    S: StoryStore,
{
    pub async fn clone_voice(
        &self,
        name: String,
        description: Option<String>,
        samples: Vec<VoiceSample>,
    ) -> Result<VoiceRecord> {
        let name = name.trim().to_owned();
        if name.is_empty() {
            return Err(ServiceError::EmptyVoiceName);
        }
        if samples.is_empty() {
            return Err(TtsError::NoSamples.into());
        }

        let cloned = self
            .tts
            .clone_voice(name.clone(), description.clone(), samples)
            .await?;
        let record = self
            .store
            .insert_voice(NewVoice {
                name,
                description,
                provider_voice_id: cloned.voice_id,
            })
            .await?;
        tracing::info!(target: LOG_TARGET, id = record.id, voice = record.provider_voice_id.as_str(), "voice cloned");
        Ok(record)
    }

    pub async fn delete_voice(&self, id: VoiceRecordId) -> Result<VoiceRecord> {
        let voice = self.store.get_voice(id).await?;
        self.tts
            .delete_voice(voice.provider_voice_id.clone())
            .await?;
        let removed = self.store.delete_voice(id).await?;
        tracing::info!(target: LOG_TARGET, id, "voice deleted");
        Ok(removed)
    }

    /// Deletes a voice known only by its provider id. The local record, if
    /// any, is removed as well and returned.
    pub async fn delete_provider_voice(&self, voice: VoiceId) -> Result<Option<VoiceRecord>> {
        let local = self
            .store
            .list_voices()
            .await?
            .into_iter()
            .find(|v| v.provider_voice_id == voice);
        match local {
            Some(record) => self.delete_voice(record.id).await.map(Some),
            None => {
                self.tts.delete_voice(voice.clone()).await?;
                tracing::info!(target: LOG_TARGET, voice = voice.as_str(), "remote voice deleted");
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::InMemoryStore;
    use crate::story::{AgeGroup, GeneratedStory};
    use crate::tts::{ClonedVoice, DEFAULT_VOICE_ID};
    use bytes::Bytes;
    use futures::future::BoxFuture;
    use futures::FutureExt;
    use std::sync::Mutex;

    struct FixedGenerator(Option<&'static str>);

    impl StoryGenerator for FixedGenerator {
        fn generate(
            &self,
            _request: StoryRequest,
        ) -> BoxFuture<'_, std::result::Result<GeneratedStory, StoryError>> {
            let out = match self.0 {
                Some(content) => Ok(GeneratedStory {
                    title: "The Quiet Owl".to_owned(),
                    content: content.to_owned(),
                }),
                None => Err(StoryError::EmptyStory),
            };
            async move { out }.boxed()
        }
    }

    #[derive(Default)]
    struct RecordingTts {
        requests: Mutex<Vec<TtsRequest>>,
        deleted: Mutex<Vec<VoiceId>>,
    }

    impl TtsClient for RecordingTts {
        fn synthesize(
            &self,
            request: TtsRequest,
        ) -> BoxFuture<'_, std::result::Result<TtsAudio, TtsError>> {
            async move {
                self.requests.lock().unwrap().push(request);
                Ok(TtsAudio::mpeg(Bytes::from_static(b"ID3")))
            }
            .boxed()
        }
    }

    impl VoiceCloner for RecordingTts {
        fn clone_voice(
            &self,
            name: String,
            _description: Option<String>,
            _samples: Vec<VoiceSample>,
        ) -> BoxFuture<'_, std::result::Result<ClonedVoice, TtsError>> {
            async move {
                Ok(ClonedVoice {
                    voice_id: VoiceId::new("cloned-123"),
                    name,
                })
            }
            .boxed()
        }

        fn list_voices(&self) -> BoxFuture<'_, std::result::Result<Vec<ClonedVoice>, TtsError>> {
            async move { Ok(Vec::new()) }.boxed()
        }

        fn delete_voice(&self, voice: VoiceId) -> BoxFuture<'_, std::result::Result<(), TtsError>> {
            async move {
                self.deleted.lock().unwrap().push(voice);
                Ok(())
            }
            .boxed()
        }
    }

    fn service(
        content: Option<&'static str>,
    ) -> StoryService<FixedGenerator, RecordingTts, InMemoryStore> {
        StoryService::new(
            FixedGenerator(content),
            RecordingTts::default(),
            InMemoryStore::new(),
        )
    }

    fn request() -> StoryRequest {
        StoryRequest::new("an owl who cannot hoot", None, AgeGroup::Toddler).unwrap()
    }

    fn sample() -> VoiceSample {
        VoiceSample {
            file_name: "grandpa.mp3".to_owned(),
            bytes: Bytes::from_static(b"ID3"),
        }
    }

    #[tokio::test]
    async fn create_story_marks_ready_with_estimate() {
        let svc = service(Some("The owl sat on a branch and listened."));
        let story = svc.create_story(request(), None).await.unwrap();
        assert_eq!(story.status, StoryStatus::Ready);
        assert_eq!(story.title, "The Quiet Owl");
        assert_eq!(story.duration_secs, Some(4));
        assert_eq!(svc.store().get_story(story.id).await.unwrap(), story);
    }

    #[tokio::test]
    async fn failed_generation_leaves_draft() {
        let svc = service(None);
        let err = svc.create_story(request(), None).await.unwrap_err();
        assert!(matches!(err, ServiceError::Story(StoryError::EmptyStory)));

        let stories = svc.store().list_stories().await.unwrap();
        assert_eq!(stories.len(), 1);
        assert_eq!(stories[0].status, StoryStatus::Draft);
    }

    #[tokio::test]
    async fn create_story_rejects_unknown_voice() {
        let svc = service(Some("Hoot."));
        let err = svc.create_story(request(), Some(7)).await.unwrap_err();
        assert!(matches!(err, ServiceError::Store(StoreError::VoiceNotFound(7))));
        assert!(svc.store().list_stories().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn narration_uses_default_voice_and_narration_settings() {
        let svc = service(Some("The owl slept."));
        let story = svc.create_story(request(), None).await.unwrap();
        svc.narrate_story(story.id).await.unwrap();

        let requests = svc.tts.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].text, "The owl slept.");
        assert_eq!(requests[0].voice.as_ref().unwrap().as_str(), DEFAULT_VOICE_ID);
        assert_eq!(requests[0].settings, Some(VoiceSettings::narration()));
    }

    #[tokio::test]
    async fn narration_uses_cloned_voice() {
        let svc = service(Some("The owl slept."));
        let voice = svc
            .clone_voice("Grandpa".to_owned(), None, vec![sample()])
            .await
            .unwrap();
        let story = svc.create_story(request(), Some(voice.id)).await.unwrap();
        svc.narrate_story(story.id).await.unwrap();

        let requests = svc.tts.requests.lock().unwrap();
        assert_eq!(requests[0].voice.as_ref().unwrap().as_str(), "cloned-123");
    }

    #[tokio::test]
    async fn narrating_a_draft_fails() {
        let svc = service(None);
        let _ = svc.create_story(request(), None).await;
        let err = svc.narrate_story(1).await.unwrap_err();
        assert!(matches!(err, ServiceError::EmptyStory(1)));
    }

    #[tokio::test]
    async fn clone_voice_validates_input() {
        let svc = service(None);
        assert!(matches!(
            svc.clone_voice("  ".to_owned(), None, vec![sample()]).await,
            Err(ServiceError::EmptyVoiceName)
        ));
        assert!(matches!(
            svc.clone_voice("Nana".to_owned(), None, Vec::new()).await,
            Err(ServiceError::Tts(TtsError::NoSamples))
        ));
    }

    #[tokio::test]
    async fn voice_management_works_without_a_generator() {
        let svc = StoryService::new((), RecordingTts::default(), InMemoryStore::new());
        assert!(matches!(
            svc.clone_voice(" ".to_owned(), None, vec![sample()]).await,
            Err(ServiceError::EmptyVoiceName)
        ));
        let voice = svc
            .clone_voice("Nana".to_owned(), None, vec![sample()])
            .await
            .unwrap();
        assert_eq!(voice.provider_voice_id, VoiceId::new("cloned-123"));
    }

    #[tokio::test]
    async fn delete_by_provider_id_removes_local_record() {
        let svc = service(None);
        svc.clone_voice("Nana".to_owned(), None, vec![sample()])
            .await
            .unwrap();

        let removed = svc
            .delete_provider_voice(VoiceId::new("cloned-123"))
            .await
            .unwrap();
        assert_eq!(removed.map(|v| v.name), Some("Nana".to_owned()));
        assert!(svc.store().list_voices().await.unwrap().is_empty());
        assert_eq!(svc.tts.deleted.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn delete_by_provider_id_without_local_record() {
        let svc = service(None);
        let removed = svc
            .delete_provider_voice(VoiceId::new("made-elsewhere"))
            .await
            .unwrap();
        assert!(removed.is_none());
        assert_eq!(
            svc.tts.deleted.lock().unwrap().as_slice(),
            &[VoiceId::new("made-elsewhere")]
        );
    }

    #[tokio::test]
    async fn delete_voice_removes_remote_then_local() {
        let svc = service(None);
        let voice = svc
            .clone_voice("Nana".to_owned(), Some("bedtime voice".to_owned()), vec![sample()])
            .await
            .unwrap();
        svc.delete_voice(voice.id).await.unwrap();

        assert_eq!(
            svc.tts.deleted.lock().unwrap().as_slice(),
            &[VoiceId::new("cloned-123")]
        );
        assert!(svc.store().list_voices().await.unwrap().is_empty());
    }
}
