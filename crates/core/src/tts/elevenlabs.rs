use crate::config::DEFAULT_ELEVENLABS_BASE_URL;
use crate::tts::{
    default_voice, ClonedVoice, TtsAudio, TtsClient, TtsError, TtsRequest, VoiceCloner, VoiceId,
    VoiceSample, VoiceSettings,
};
use crate::util::{retry_with_backoff, RetryConfig};
use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};

pub const DEFAULT_MODEL_ID: &str = "eleven_multilingual_v2";
const LOG_TARGET: &str = "tts::elevenlabs";

#[derive(Clone)]
pub struct ElevenLabsClient {
    client: Client,
    api_key: String,
    base_url: String,
    model_id: String,
    retry: RetryConfig,
}

impl ElevenLabsClient {
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: DEFAULT_ELEVENLABS_BASE_URL.to_string(),
            model_id: DEFAULT_MODEL_ID.to_string(),
            retry: RetryConfig::default(),
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_owned();
        self
    }

    pub fn with_model_id(mut self, model_id: String) -> Self {
        self.model_id = model_id;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

#[derive(Serialize)]
struct SpeechRequest<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: VoiceSettings,
}

#[derive(Deserialize)]
struct AddVoiceResponse {
    voice_id: String,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Deserialize)]
struct VoicesResponse {
    voices: Vec<VoiceEntry>,
}

#[derive(Deserialize)]
struct VoiceEntry {
    voice_id: String,
    name: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    detail: Option<ErrorDetail>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ErrorDetail {
    Structured {
        #[serde(default)]
        status: Option<String>,
        #[serde(default)]
        message: Option<String>,
    },
    Text(String),
}

/// Turns a non-success response into a [`TtsError`], preferring the
/// service's own `detail.message`.
async fn error_from_response(response: Response, fallback: &str) -> TtsError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    classify_error(status, &body, fallback)
}

fn classify_error(status: u16, body: &str, fallback: &str) -> TtsError {
    let detail = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.detail);

    let (detail_status, message) = match detail {
        Some(ErrorDetail::Structured { status, message }) => (status, message),
        Some(ErrorDetail::Text(text)) => (None, Some(text)),
        None => (None, None),
    };

    if status == 401 && detail_status.as_deref() == Some("quota_exceeded") {
        return TtsError::QuotaExhausted;
    }

    TtsError::Api {
        status,
        message: message.unwrap_or_else(|| fallback.to_owned()),
    }
}

fn is_rate_limited(err: &TtsError) -> bool {
    matches!(err, TtsError::Api { status: 429, .. })
}

impl ElevenLabsClient {
    async fn post_speech(&self, url: &str, body: &SpeechRequest<'_>) -> Result<TtsAudio, TtsError> {
        let response = self
            .client
            .post(url)
            .header("xi-api-key", &self.api_key)
            .header("Accept", "audio/mpeg")
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response, "Failed to generate speech").await);
        }

        let mime_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_owned())
            .filter(|v| v.starts_with("audio/"))
            .unwrap_or_else(|| "audio/mpeg".to_owned());

        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Err(TtsError::InvalidResponse("empty audio body".to_owned()));
        }

        Ok(TtsAudio { mime_type, bytes })
    }

    async fn post_voice(
        &self,
        name: &str,
        description: Option<&str>,
        samples: &[VoiceSample],
    ) -> Result<ClonedVoice, TtsError> {
        let mut form = Form::new().text("name", name.to_owned());
        if let Some(description) = description {
            form = form.text("description", description.to_owned());
        }
        for sample in samples {
            let part = Part::bytes(sample.bytes.to_vec())
                .file_name(sample.file_name.clone())
                .mime_str(sample.mime_type())?;
            form = form.part("files", part);
        }

        let response = self
            .client
            .post(format!("{}/voices/add", self.base_url))
            .header("xi-api-key", &self.api_key)
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response, "Failed to clone voice").await);
        }

        let added: AddVoiceResponse = response
            .json()
            .await
            .map_err(|e| TtsError::InvalidResponse(format!("Failed to parse JSON: {e}")))?;

        Ok(ClonedVoice {
            voice_id: VoiceId(added.voice_id),
            name: added.name.unwrap_or_else(|| name.to_owned()),
        })
    }

    async fn get_voices(&self) -> Result<Vec<ClonedVoice>, TtsError> {
        let response = self
            .client
            .get(format!("{}/voices", self.base_url))
            .header("xi-api-key", &self.api_key)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response, "Failed to fetch voices").await);
        }

        let voices: VoicesResponse = response
            .json()
            .await
            .map_err(|e| TtsError::InvalidResponse(format!("Failed to parse JSON: {e}")))?;

        Ok(voices
            .voices
            .into_iter()
            .map(|v| ClonedVoice {
                voice_id: VoiceId(v.voice_id),
                name: v.name,
            })
            .collect())
    }

    async fn remove_voice(&self, voice: &VoiceId) -> Result<(), TtsError> {
        let url = format!(
            "{}/voices/{}",
            self.base_url,
            urlencoding::encode(voice.as_str())
        );
        let response = self
            .client
            .delete(url)
            .header("xi-api-key", &self.api_key)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response, "Failed to delete voice").await);
        }
        Ok(())
    }
}

impl TtsClient for ElevenLabsClient {
    fn synthesize(&self, request: TtsRequest) -> BoxFuture<'_, Result<TtsAudio, TtsError>> {
        async move {
            if request.text.trim().is_empty() {
                return Err(TtsError::EmptyText);
            }

            let voice = request.voice.unwrap_or_else(default_voice);
            let url = format!(
                "{}/text-to-speech/{}",
                self.base_url,
                urlencoding::encode(voice.as_str())
            );
            let body = SpeechRequest {
                text: &request.text,
                model_id: &self.model_id,
                voice_settings: request.settings.unwrap_or_default(),
            };

            tracing::debug!(
                target: LOG_TARGET,
                voice = %voice.as_str(),
                chars = request.text.chars().count(),
                "requesting speech"
            );

            let audio = retry_with_backoff(
                &self.retry,
                || self.post_speech(&url, &body),
                TtsError::is_retryable,
            )
            .await?;

            tracing::info!(
                target: LOG_TARGET,
                voice = %voice.as_str(),
                bytes = audio.bytes.len(),
                "speech generated"
            );
            Ok(audio)
        }
        .boxed()
    }
}

impl VoiceCloner for ElevenLabsClient {
    fn clone_voice(
        &self,
        name: String,
        description: Option<String>,
        samples: Vec<VoiceSample>,
    ) -> BoxFuture<'_, Result<ClonedVoice, TtsError>> {
        async move {
            if samples.is_empty() {
                return Err(TtsError::NoSamples);
            }
            // Not idempotent. Only a 429 is known to have created nothing.
            let voice = retry_with_backoff(
                &self.retry,
                || self.post_voice(&name, description.as_deref(), &samples),
                is_rate_limited,
            )
            .await?;
            tracing::info!(
                target: LOG_TARGET,
                voice = %voice.voice_id.as_str(),
                samples = samples.len(),
                "voice cloned"
            );
            Ok(voice)
        }
        .boxed()
    }

    fn list_voices(&self) -> BoxFuture<'_, Result<Vec<ClonedVoice>, TtsError>> {
        async move {
            retry_with_backoff(&self.retry, || self.get_voices(), TtsError::is_retryable).await
        }
        .boxed()
    }

    fn delete_voice(&self, voice: VoiceId) -> BoxFuture<'_, Result<(), TtsError>> {
        async move {
            retry_with_backoff(
                &self.retry,
                || self.remove_voice(&voice),
                TtsError::is_retryable,
            )
            .await?;
            tracing::info!(target: LOG_TARGET, voice = %voice.as_str(), "voice deleted");
            Ok(())
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tts::DEFAULT_VOICE_ID;
    use bytes::Bytes;
    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> ElevenLabsClient {
        ElevenLabsClient::new("xi-test".to_owned())
            .with_base_url(server.uri())
            .with_retry(RetryConfig::new(2, Duration::from_millis(1)))
    }

    fn request(voice: Option<&str>) -> TtsRequest {
        TtsRequest {
            text: "Once upon a time.".to_owned(),
            voice: voice.map(VoiceId::new),
            settings: Some(VoiceSettings::narration()),
        }
    }

    #[tokio::test]
    async fn synthesize_posts_text_and_settings() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/text-to-speech/voice-123"))
            .and(header("xi-api-key", "xi-test"))
            .and(body_partial_json(serde_json::json!({
                "text": "Once upon a time.",
                "model_id": "eleven_multilingual_v2",
                "voice_settings": {"stability": 0.6, "use_speaker_boost": true}
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "audio/mpeg")
                    .set_body_bytes(b"ID3audio".to_vec()),
            )
            .expect(1)
            .mount(&server)
            .await;

        let audio = client(&server)
            .synthesize(request(Some("voice-123")))
            .await
            .unwrap();
        assert_eq!(audio.mime_type, "audio/mpeg");
        assert_eq!(audio.bytes, Bytes::from_static(b"ID3audio"));
    }

    #[tokio::test]
    async fn synthesize_uses_default_voice() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("/text-to-speech/{DEFAULT_VOICE_ID}")))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"mp3".to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        client(&server).synthesize(request(None)).await.unwrap();
    }

    #[tokio::test]
    async fn quota_exceeded_is_recognised() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "detail": {"status": "quota_exceeded", "message": "You have 0 credits"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let err = client(&server).synthesize(request(None)).await.unwrap_err();
        assert!(matches!(err, TtsError::QuotaExhausted));
    }

    #[tokio::test]
    async fn server_errors_are_retried_then_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_json(serde_json::json!({
                "detail": {"message": "busy"}
            })))
            .expect(2)
            .mount(&server)
            .await;

        let err = client(&server).synthesize(request(None)).await.unwrap_err();
        match err {
            TtsError::Api { status, message } => {
                assert_eq!(status, 503);
                assert_eq!(message, "busy");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn blank_text_is_rejected_locally() {
        let server = MockServer::start().await;
        let mut req = request(None);
        req.text = "  ".to_owned();
        let err = client(&server).synthesize(req).await.unwrap_err();
        assert!(matches!(err, TtsError::EmptyText));
    }

    #[tokio::test]
    async fn clone_voice_uploads_samples() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/voices/add"))
            .and(body_string_contains("Grandma"))
            .and(body_string_contains("kitchen.mp3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "voice_id": "cloned-1",
                "requires_verification": false
            })))
            .expect(1)
            .mount(&server)
            .await;

        let voice = client(&server)
            .clone_voice(
                "Grandma".to_owned(),
                Some("warm and slow".to_owned()),
                vec![VoiceSample {
                    file_name: "kitchen.mp3".to_owned(),
                    bytes: Bytes::from_static(b"ID3sample"),
                }],
            )
            .await
            .unwrap();
        assert_eq!(voice.voice_id, VoiceId::new("cloned-1"));
        assert_eq!(voice.name, "Grandma");
    }

    #[tokio::test]
    async fn clone_voice_requires_samples() {
        let server = MockServer::start().await;
        let err = client(&server)
            .clone_voice("Grandma".to_owned(), None, Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(err, TtsError::NoSamples));
    }

    #[tokio::test]
    async fn clone_voice_surfaces_detail_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/voices/add"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "detail": {"status": "invalid_audio", "message": "Sample too short"}
            })))
            .mount(&server)
            .await;

        let err = client(&server)
            .clone_voice(
                "Dad".to_owned(),
                None,
                vec![VoiceSample {
                    file_name: "a.wav".to_owned(),
                    bytes: Bytes::from_static(b"RIFF"),
                }],
            )
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "speech api returned HTTP 400: Sample too short");
    }

    #[tokio::test]
    async fn clone_voice_is_sent_once_on_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/voices/add"))
            .respond_with(ResponseTemplate::new(502))
            .expect(1)
            .mount(&server)
            .await;

        let err = client(&server)
            .clone_voice(
                "Nana".to_owned(),
                None,
                vec![VoiceSample {
                    file_name: "nana.mp3".to_owned(),
                    bytes: Bytes::from_static(b"ID3sample"),
                }],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, TtsError::Api { status: 502, .. }));
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn clone_voice_retries_when_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/voices/add"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/voices/add"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"voice_id": "v2"})),
            )
            .mount(&server)
            .await;

        let voice = client(&server)
            .clone_voice(
                "Nana".to_owned(),
                None,
                vec![VoiceSample {
                    file_name: "nana.mp3".to_owned(),
                    bytes: Bytes::from_static(b"ID3sample"),
                }],
            )
            .await
            .unwrap();
        assert_eq!(voice.voice_id, VoiceId::new("v2"));
        assert_eq!(server.received_requests().await.unwrap().len(), 2);
    }

    #[test]
    fn only_rate_limits_count_for_voice_creation() {
        let api = |status| TtsError::Api {
            status,
            message: String::new(),
        };
        assert!(is_rate_limited(&api(429)));
        assert!(!is_rate_limited(&api(502)));
        assert!(!is_rate_limited(&api(503)));
        assert!(!is_rate_limited(&TtsError::QuotaExhausted));
    }

    #[tokio::test]
    async fn list_and_delete_voices() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/voices"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "voices": [
                    {"voice_id": "a", "name": "Mum", "category": "cloned"},
                    {"voice_id": "b", "name": "Rachel"}
                ]
            })))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/voices/a"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let c = client(&server);
        let voices = c.list_voices().await.unwrap();
        assert_eq!(voices.len(), 2);
        assert_eq!(voices[0].name, "Mum");
        c.delete_voice(VoiceId::new("a")).await.unwrap();
    }

    #[test]
    fn classify_error_falls_back_when_body_is_not_json() {
        let err = classify_error(500, "<html>oops</html>", "Failed to generate speech");
        assert_eq!(
            err.to_string(),
            "speech api returned HTTP 500: Failed to generate speech"
        );
        let err = classify_error(422, r#"{"detail":"bad voice"}"#, "x");
        assert_eq!(err.to_string(), "speech api returned HTTP 422: bad voice");
    }
}
