#[cfg(feature = "rodio")]
mod audio;
mod simulated;

use crate::tts::TtsAudio;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[cfg(feature = "rodio")]
pub use audio::AudioPlaybackSink;
#[cfg(all(feature = "rodio", feature = "playback-device-enum"))]
pub use audio::enumerate_output_device_names;
pub use simulated::SimulatedPlaybackSink;

/// Cadence of `TimeUpdate` events while a track plays.
pub const TIME_UPDATE_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum PlaybackEvent {
    Loaded { duration: Duration },
    TimeUpdate { position: Duration },
    Ended { position: Duration },
    Stopped { position: Duration },
}

pub type EventCallback = Box<dyn FnMut(PlaybackEvent) + Send>;

#[derive(thiserror::Error, Debug)]
pub enum PlaybackError {
    #[error("audio output unavailable: {details}")]
    AudioOutputUnavailable { details: String },

    #[error("audio could not be decoded: {0}")]
    Decode(String),

    #[error("audio buffer is empty")]
    EmptyAudio,
}

/// Shared stop switch for a track that is playing.
#[derive(Clone, Debug, Default)]
pub struct PlaybackControl {
    stopped: Arc<AtomicBool>,
}

impl PlaybackControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Relaxed);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Relaxed)
    }
}

pub trait PlaybackSink: Send + Sync {
    /// Plays `audio` to the end (or until `control` is stopped), pushing
    /// events to `on_event` as it goes.
    fn play(
        &self,
        audio: TtsAudio,
        duration: Duration,
        control: PlaybackControl,
        on_event: EventCallback,
    ) -> BoxFuture<'_, Result<(), PlaybackError>>;
}
