use serde::{Deserialize, Serialize};
use std::{fmt, time::Duration};

pub const DEFAULT_SPEECH_START_OFFSET_SECS: f64 = 0.5;
pub const DEFAULT_MIN_WORD_WEIGHT: f64 = 0.5;
pub const DEFAULT_CHARS_PER_WEIGHT_UNIT: f64 = 5.0;
pub const DEFAULT_SENTENCE_PAUSE: f64 = 0.8;
pub const DEFAULT_CLAUSE_PAUSE: f64 = 0.3;
pub const DEFAULT_QUOTE_PAUSE: f64 = 0.1;
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_ELEVENLABS_BASE_URL: &str = "https://api.elevenlabs.io/v1";
pub const ENV_OPENAI_API_KEY: &str = "OPENAI_API_KEY";
pub const ENV_ELEVENLABS_API_KEY: &str = "ELEVENLABS_API_KEY";
pub const ENV_OPENAI_BASE_URL: &str = "OPENAI_BASE_URL";
pub const ENV_ELEVENLABS_BASE_URL: &str = "ELEVENLABS_BASE_URL";

#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new<S: Into<String>>(value: S) -> Result<Self, ConfigError> {
        let v = value.into();
        if v.trim().is_empty() {
            return Err(ConfigError::EmptyApiKey);
        }
        Ok(Self(v))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(**redacted**)")
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiKeys {
    pub openai: Option<ApiKey>,
    pub elevenlabs: Option<ApiKey>,
}

/// Per-word speaking-time heuristics used to build a word timeline.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct WeightTuning {
    pub min_weight: f64,
    pub chars_per_unit: f64,
    pub sentence_pause: f64,
    pub clause_pause: f64,
    pub quote_pause: f64,
}

impl Default for WeightTuning {
    fn default() -> Self {
        Self {
            min_weight: DEFAULT_MIN_WORD_WEIGHT,
            chars_per_unit: DEFAULT_CHARS_PER_WEIGHT_UNIT,
            sentence_pause: DEFAULT_SENTENCE_PAUSE,
            clause_pause: DEFAULT_CLAUSE_PAUSE,
            quote_pause: DEFAULT_QUOTE_PAUSE,
        }
    }
}

impl WeightTuning {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.min_weight.is_finite() && self.min_weight > 0.0) {
            return Err(ConfigError::NonPositiveMinWeight);
        }
        if !(self.chars_per_unit.is_finite() && self.chars_per_unit > 0.0) {
            return Err(ConfigError::NonPositiveCharsPerUnit);
        }
        for bonus in [self.sentence_pause, self.clause_pause, self.quote_pause] {
            if !(bonus.is_finite() && bonus >= 0.0) {
                return Err(ConfigError::NegativePause);
            }
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct SyncTuning {
    pub weights: WeightTuning,
    /// Silence emitted by the speech engine before the first word.
    pub speech_start_offset_secs: f64,
}

impl SyncTuning {
    pub fn new(weights: WeightTuning, speech_start_offset_secs: f64) -> Result<Self, ConfigError> {
        weights.validate()?;
        if !(speech_start_offset_secs.is_finite() && speech_start_offset_secs >= 0.0) {
            return Err(ConfigError::NegativeSpeechOffset);
        }
        Ok(Self {
            weights,
            speech_start_offset_secs,
        })
    }

    pub fn speech_start_offset(&self) -> Duration {
        Duration::from_secs_f64(self.speech_start_offset_secs)
    }
}

impl Default for SyncTuning {
    fn default() -> Self {
        Self {
            weights: WeightTuning::default(),
            speech_start_offset_secs: DEFAULT_SPEECH_START_OFFSET_SECS,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Endpoints {
    pub openai_base_url: String,
    pub elevenlabs_base_url: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            openai_base_url: DEFAULT_OPENAI_BASE_URL.to_owned(),
            elevenlabs_base_url: DEFAULT_ELEVENLABS_BASE_URL.to_owned(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    pub api_keys: ApiKeys,
    pub endpoints: Endpoints,
    pub sync: SyncTuning,
}

impl AppConfig {
    pub fn require_openai(&self) -> Result<&ApiKey, ConfigError> {
        self.api_keys
            .openai
            .as_ref()
            .ok_or(ConfigError::MissingApiKey(ENV_OPENAI_API_KEY))
    }

    pub fn require_elevenlabs(&self) -> Result<&ApiKey, ConfigError> {
        self.api_keys
            .elevenlabs
            .as_ref()
            .ok_or(ConfigError::MissingApiKey(ENV_ELEVENLABS_API_KEY))
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("api key must not be empty")]
    EmptyApiKey,
    #[error("{0} is not set")]
    MissingApiKey(&'static str),
    #[error("speech start offset must be a finite value >= 0 seconds")]
    NegativeSpeechOffset,
    #[error("minimum word weight must be > 0")]
    NonPositiveMinWeight,
    #[error("characters per weight unit must be > 0")]
    NonPositiveCharsPerUnit,
    #[error("pause bonuses must be >= 0")]
    NegativePause,
}

pub trait Env {
    fn var(&self, key: &str) -> Option<String>;
}

#[derive(Clone, Debug, Default)]
pub struct StdEnv;

impl Env for StdEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

#[derive(Clone, Debug, Default)]
pub struct MapEnv {
    vars: std::collections::BTreeMap<String, String>,
}

impl MapEnv {
    pub fn with_var(mut self, key: &str, value: &str) -> Self {
        self.vars.insert(key.to_owned(), value.to_owned());
        self
    }
}

impl Env for MapEnv {
    fn var(&self, key: &str) -> Option<String> {
        self.vars.get(key).cloned()
    }
}

pub fn resolve_api_key(
    cli_value: Option<String>,
    env_key: &str,
    env: &impl Env,
) -> Result<Option<ApiKey>, ConfigError> {
    match cli_value {
        Some(v) => Ok(Some(ApiKey::new(v)?)),
        None => match env.var(env_key) {
            Some(v) => Ok(Some(ApiKey::new(v)?)),
            None => Ok(None),
        },
    }
}

pub fn resolve_string_with_default(
    cli_value: Option<String>,
    env_key: &str,
    env: &impl Env,
    default: &str,
) -> String {
    match cli_value {
        Some(v) => v,
        None => env.var(env_key).unwrap_or_else(|| default.to_owned()),
    }
}
