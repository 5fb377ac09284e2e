use crate::playback::{
    EventCallback, PlaybackControl, PlaybackError, PlaybackEvent, PlaybackSink,
    TIME_UPDATE_INTERVAL,
};
use crate::tts::TtsAudio;
use futures::future::BoxFuture;
use futures::FutureExt;
use rodio::cpal::traits::DeviceTrait;
use rodio::cpal::traits::HostTrait;
use rodio::{Decoder, OutputStream, OutputStreamBuilder, Sink, StreamError};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const LOG_TARGET: &str = "playback::audio";

/// A minimal, poison-tolerant, lazy initializer for a single value.
///
/// [`rodio::OutputStream`] must outlive every sink connected to it; opening a
/// new stream per story drops the previous one and cuts its audio short.
struct LazyInit<T> {
    value: Mutex<Option<T>>,
}

impl<T> LazyInit<T> {
    fn new() -> Self {
        Self {
            value: Mutex::new(None),
        }
    }

    fn get_or_try_init_with<R, E>(
        &self,
        init: impl FnOnce() -> Result<T, E>,
        f: impl FnOnce(&T) -> R,
        invariant_err: impl FnOnce() -> E,
    ) -> Result<R, E> {
        let mut guard = match self.value.lock() {
            Ok(g) => g,
            Err(poisoned) => {
                tracing::warn!(
                    target: LOG_TARGET,
                    "output stream cache lock was poisoned; recovering and continuing"
                );
                poisoned.into_inner()
            }
        };

        if guard.is_none() {
            *guard = Some(init()?);
        }

        match guard.as_ref() {
            Some(v) => Ok(f(v)),
            None => Err(invariant_err()),
        }
    }
}

#[derive(Clone)]
pub struct AudioPlaybackSink {
    output_device_name: Option<String>,

    // Clones share a single stream.
    output_stream: Arc<LazyInit<OutputStream>>,
    output_stream_open_attempts: Arc<AtomicUsize>,
}

impl AudioPlaybackSink {
    pub fn new() -> Self {
        Self {
            output_device_name: None,
            output_stream: Arc::new(LazyInit::new()),
            output_stream_open_attempts: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_output_device_name<S: Into<String>>(mut self, name: S) -> Self {
        self.output_device_name = Some(name.into());
        self
    }

    fn open_output_stream(&self) -> Result<OutputStream, PlaybackError> {
        let attempt = self
            .output_stream_open_attempts
            .fetch_add(1, Ordering::Relaxed)
            + 1;
        tracing::debug!(
            target: LOG_TARGET,
            attempt,
            configured_output_device = %self.output_device_name.as_deref().unwrap_or("<default>"),
            "opening output stream"
        );

        match self.output_device_name.as_deref() {
            Some(wanted) => match open_named_output_stream(wanted) {
                Ok(stream) => Ok(stream),
                Err(NamedDeviceStreamError::DeviceNotFound { wanted, available }) => {
                    tracing::warn!(
                        target: LOG_TARGET,
                        wanted_device = %wanted,
                        available_devices = %format_device_list(&available),
                        "configured output device not found; falling back to default output device"
                    );
                    open_default_stream(Some(wanted.as_str()))
                }
                Err(NamedDeviceStreamError::OpenFailed {
                    wanted,
                    error,
                    available,
                }) => {
                    tracing::warn!(
                        target: LOG_TARGET,
                        wanted_device = %wanted,
                        error = %error,
                        available_devices = %format_device_list(&available),
                        "failed to open configured output device; falling back to default output device"
                    );
                    open_default_stream(Some(wanted.as_str()))
                }
            },
            None => open_default_stream(None),
        }
    }

    fn connect_sink(&self) -> Result<Sink, PlaybackError> {
        self.output_stream.get_or_try_init_with(
            || self.open_output_stream(),
            |stream| Sink::connect_new(stream.mixer()),
            || PlaybackError::AudioOutputUnavailable {
                details: "internal error: output stream cache invariant violated".to_owned(),
            },
        )
    }
}

impl Default for AudioPlaybackSink {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackSink for AudioPlaybackSink {
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

            let source = Decoder::new(Cursor::new(audio.bytes.to_vec()))
                .map_err(|e| PlaybackError::Decode(e.to_string()))?;
            let sink = self.connect_sink()?;
            sink.append(source);

            tracing::info!(
                target: LOG_TARGET,
                duration_secs = duration.as_secs_f64(),
                mime_type = %audio.mime_type,
                "playback started"
            );
            on_event(PlaybackEvent::Loaded { duration });

            let mut ticker = tokio::time::interval(TIME_UPDATE_INTERVAL);
            loop {
                ticker.tick().await;
                if control.is_stopped() {
                    let position = sink.get_pos();
                    sink.stop();
                    tracing::info!(target: LOG_TARGET, position_secs = position.as_secs_f64(), "playback stopped");
                    on_event(PlaybackEvent::Stopped { position });
                    return Ok(());
                }
                if sink.empty() {
                    tracing::info!(target: LOG_TARGET, "playback ended");
                    on_event(PlaybackEvent::Ended { position: duration });
                    return Ok(());
                }
                on_event(PlaybackEvent::TimeUpdate {
                    position: sink.get_pos(),
                });
            }
        }
        .boxed()
    }
}

#[derive(Debug)]
enum NamedDeviceStreamError {
    DeviceNotFound {
        wanted: String,
        available: Vec<String>,
    },
    OpenFailed {
        wanted: String,
        error: StreamError,
        available: Vec<String>,
    },
}

fn open_default_stream(wanted: Option<&str>) -> Result<OutputStream, PlaybackError> {
    let context = if wanted.is_some() {
        "default-device fallback after configured device failed"
    } else {
        "open default output stream"
    };
    OutputStreamBuilder::open_default_stream().map_err(|e| PlaybackError::AudioOutputUnavailable {
        details: format_stream_error_details(e, wanted, context),
    })
}

fn normalize_device_name(s: &str) -> String {
    s.trim().to_ascii_lowercase()
}

fn open_named_output_stream(wanted: &str) -> Result<OutputStream, NamedDeviceStreamError> {
    let wanted_norm = normalize_device_name(wanted);

    let host = rodio::cpal::default_host();
    let mut available: Vec<String> = Vec::new();
    let mut selected = None;

    if let Ok(devices) = host.output_devices() {
        for d in devices {
            let name = d.name().unwrap_or_else(|_| "<unnamed>".to_owned());
            if normalize_device_name(&name) == wanted_norm {
                selected = Some(d);
            }
            available.push(name);
        }
    }

    let Some(device) = selected else {
        return Err(NamedDeviceStreamError::DeviceNotFound {
            wanted: wanted.to_owned(),
            available,
        });
    };

    OutputStreamBuilder::from_device(device)
        .and_then(|b| b.open_stream_or_fallback())
        .map_err(|error| NamedDeviceStreamError::OpenFailed {
            wanted: wanted.to_owned(),
            error,
            available,
        })
}

fn format_device_list(devices: &[String]) -> String {
    if devices.is_empty() {
        return "<unknown>".to_owned();
    }
    devices.join(", ")
}

fn format_stream_error_details(err: StreamError, wanted: Option<&str>, context: &str) -> String {
    let mut s = format!("{context}: {err}");
    if let Some(w) = wanted {
        s.push_str(&format!(" (configured_device={w})"));
    }
    #[cfg(feature = "playback-device-enum")]
    {
        if let Ok(devices) = enumerate_output_device_names() {
            s.push_str("; available_output_devices=");
            s.push_str(&format_device_list(&devices));
        }
    }
    s
}

#[cfg(feature = "playback-device-enum")]
pub fn enumerate_output_device_names() -> Result<Vec<String>, PlaybackError> {
    let host = rodio::cpal::default_host();
    let devices = host
        .output_devices()
        .map_err(|e| PlaybackError::AudioOutputUnavailable {
            details: format!("failed to list output devices: {e}"),
        })?;

    Ok(devices
        .map(|d| d.name().unwrap_or_else(|_| "<unnamed>".to_owned()))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_device_name_trims_and_is_case_insensitive() {
        assert_eq!(normalize_device_name("  Speakers  "), "speakers");
        assert_eq!(normalize_device_name("HeAdPhOnEs"), "headphones");
    }

    #[test]
    fn format_device_list_handles_empty() {
        assert_eq!(format_device_list(&[]), "<unknown>");
        assert_eq!(
            format_device_list(&["A".to_owned(), "B".to_owned()]),
            "A, B"
        );
    }

    #[test]
    fn lazy_init_runs_init_only_once() {
        let cell: LazyInit<u32> = LazyInit::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let init = |value| {
            let calls = Arc::clone(&calls);
            move || {
                calls.fetch_add(1, Ordering::Relaxed);
                Ok(value)
            }
        };
        let v1 = cell.get_or_try_init_with(init(42), |v| *v, || ()).unwrap();
        let v2 = cell.get_or_try_init_with(init(99), |v| *v, || ()).unwrap();

        assert_eq!(v1, 42);
        assert_eq!(v2, 42);
        assert_eq!(calls.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn empty_audio_is_rejected_before_touching_the_device() {
        let sink = AudioPlaybackSink::new();
        let err = sink
            .play(
                TtsAudio::mpeg(bytes::Bytes::new()),
                Duration::from_secs(1),
                PlaybackControl::new(),
                Box::new(|_| {}),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PlaybackError::EmptyAudio));
        assert_eq!(sink.output_stream_open_attempts.load(Ordering::Relaxed), 0);
    }
}
