mod elevenlabs;

use crate::util::is_http_retryable;
use bytes::Bytes;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub use elevenlabs::{ElevenLabsClient, DEFAULT_MODEL_ID};

/// Rachel: warm, friendly stock voice used when no cloned voice is chosen.
pub const DEFAULT_VOICE_ID: &str = "21m00Tcm4TlvDq8ikWAM";

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct VoiceId(pub String);

impl VoiceId {
    pub fn new<S: Into<String>>(value: S) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

pub fn default_voice() -> VoiceId {
    VoiceId(DEFAULT_VOICE_ID.to_owned())
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct VoiceSettings {
    pub stability: f32,
    pub similarity_boost: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_speaker_boost: Option<bool>,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            stability: 0.5,
            similarity_boost: 0.75,
            style: Some(0.5),
            use_speaker_boost: Some(true),
        }
    }
}

impl VoiceSettings {
    /// Steadier, closer to the cloned speaker, a little more expressive.
    pub fn narration() -> Self {
        Self {
            stability: 0.6,
            similarity_boost: 0.85,
            style: Some(0.4),
            use_speaker_boost: Some(true),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TtsRequest {
    pub text: String,
    pub voice: Option<VoiceId>,
    pub settings: Option<VoiceSettings>,
}

/// Encoded audio exactly as returned by the speech service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TtsAudio {
    pub mime_type: String,
    pub bytes: Bytes,
}

impl TtsAudio {
    pub fn mpeg(bytes: Bytes) -> Self {
        Self {
            mime_type: "audio/mpeg".to_owned(),
            bytes,
        }
    }

    /// File extension used as a container hint when probing.
    pub fn extension(&self) -> &'static str {
        match self.mime_type.as_str() {
            "audio/wav" | "audio/x-wav" | "audio/wave" => "wav",
            "audio/ogg" => "ogg",
            "audio/flac" => "flac",
            _ => "mp3",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClonedVoice {
    pub voice_id: VoiceId,
    pub name: String,
}

/// One recording of the speaker, uploaded when cloning a voice.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VoiceSample {
    pub file_name: String,
    pub bytes: Bytes,
}

impl VoiceSample {
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, TtsError> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await.map_err(|source| TtsError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "sample.mp3".to_owned());
        Ok(Self {
            file_name,
            bytes: Bytes::from(bytes),
        })
    }

    pub fn mime_type(&self) -> &'static str {
        let ext = self
            .file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase());
        match ext.as_deref() {
            Some("mp3") => "audio/mpeg",
            Some("wav") => "audio/wav",
            Some("m4a") | Some("mp4") => "audio/mp4",
            Some("webm") => "audio/webm",
            Some("ogg") => "audio/ogg",
            Some("flac") => "audio/flac",
            _ => "application/octet-stream",
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum TtsError {
    #[error("nothing to synthesize")]
    EmptyText,

    #[error("at least one voice sample is required")]
    NoSamples,

    #[error("voice quota exhausted")]
    QuotaExhausted,

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("speech api returned HTTP {status}: {message}")]
    Api { status: u16, message: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl TtsError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(e) => e.is_timeout() || e.is_connect(),
            Self::Api { status, .. } => is_http_retryable(*status),
            _ => false,
        }
    }
}

pub trait TtsClient: Send + Sync {
    fn synthesize(&self, request: TtsRequest) -> BoxFuture<'_, Result<TtsAudio, TtsError>>;
}

pub trait VoiceCloner: Send + Sync {
    fn clone_voice(
        &self,
        name: String,
        description: Option<String>,
        samples: Vec<VoiceSample>,
    ) -> BoxFuture<'_, Result<ClonedVoice, TtsError>>;

    fn list_voices(&self) -> BoxFuture<'_, Result<Vec<ClonedVoice>, TtsError>>;

    fn delete_voice(&self, voice: VoiceId) -> BoxFuture<'_, Result<(), TtsError>>;
}
