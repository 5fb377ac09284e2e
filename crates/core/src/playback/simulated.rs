use crate::playback::{
    EventCallback, PlaybackControl, PlaybackError, PlaybackEvent, PlaybackSink,
    TIME_UPDATE_INTERVAL,
};
use crate::tts::TtsAudio;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::time::Duration;

/// Advances a virtual clock instead of driving an audio device.
#[derive(Clone, Debug)]
pub struct SimulatedPlaybackSink {
    tick: Duration,
    realtime: bool,
}

impl SimulatedPlaybackSink {
    /// Ticks in wall-clock time, like a real player would.
    pub fn realtime() -> Self {
        Self {
            tick: TIME_UPDATE_INTERVAL,
            realtime: true,
        }
    }

    /// Emits every tick immediately.
    pub fn instant(tick: Duration) -> Self {
        Self {
            tick,
            realtime: false,
        }
    }
}

impl Default for SimulatedPlaybackSink {
    fn default() -> Self {
        Self::realtime()
    }
}

impl PlaybackSink for SimulatedPlaybackSink {
    fn play(
        &self,
        audio: TtsAudio,
        duration: Duration,
        control: PlaybackControl,
        mut on_event: EventCallback,
    ) -> BoxFuture<'_, Result<(), PlaybackError>> {
        async move {
            if audio.bytes.is_empty() {
                return Err(PlaybackError::EmptyAudio);
            }
            if self.tick.is_zero() {
                return Err(PlaybackError::AudioOutputUnavailable {
                    details: "simulated tick must be > 0".to_owned(),
                });
            }

            on_event(PlaybackEvent::Loaded { duration });

            let mut position = Duration::ZERO;
            loop {
                if control.is_stopped() {
                    on_event(PlaybackEvent::Stopped { position });
                    return Ok(());
                }
                if position >= duration {
                    on_event(PlaybackEvent::Ended { position: duration });
                    return Ok(());
                }
                on_event(PlaybackEvent::TimeUpdate { position });
                if self.realtime {
                    tokio::time::sleep(self.tick).await;
                } else {
                    tokio::task::yield_now().await;
                }
                position = (position + self.tick).min(duration);
            }
        }
        .boxed()
    }
}
