//! Audio metadata: how long a rendered narration runs.

use std::io::Cursor;
use std::time::Duration;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

const LOG_TARGET: &str = "decode";

#[derive(thiserror::Error, Debug)]
pub enum DecodeError {
    #[error("audio buffer is empty")]
    EmptyInput,

    #[error("unsupported or corrupt audio: {0}")]
    Unsupported(String),

    #[error("no audio track found")]
    NoAudioTrack,

    #[error("audio duration could not be determined")]
    UnknownDuration,
}

pub type Result<T> = std::result::Result<T, DecodeError>;

/// Total playing time of an encoded audio buffer.
///
/// Uses the container's frame count when it has one and otherwise walks the
/// packets of the default track.
pub fn probe_duration(bytes: &[u8], extension_hint: &str) -> Result<Duration> {
    if bytes.is_empty() {
        return Err(DecodeError::EmptyInput);
    }

    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes.to_vec())), Default::default());
    let mut hint = Hint::new();
    hint.with_extension(extension_hint);

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| DecodeError::Unsupported(e.to_string()))?;
    let mut format = probed.format;

    let track = format.default_track().ok_or(DecodeError::NoAudioTrack)?;
    let track_id = track.id;
    let params = track.codec_params.clone();

    if let (Some(frames), Some(rate)) = (params.n_frames, params.sample_rate) {
        let duration = duration_from_frames(frames, rate);
        tracing::debug!(target: LOG_TARGET, frames, rate, secs = duration.as_secs_f64(), "duration from header");
        return Ok(duration);
    }

    let end_ts = scan_end_timestamp(format.as_mut(), track_id)?;
    let duration = match (params.time_base, params.sample_rate) {
        (Some(tb), _) => {
            let t = tb.calc_time(end_ts);
            Duration::from_secs(t.seconds) + Duration::from_secs_f64(t.frac)
        }
        (None, Some(rate)) => duration_from_frames(end_ts, rate),
        (None, None) => return Err(DecodeError::UnknownDuration),
    };
    tracing::debug!(target: LOG_TARGET, end_ts, secs = duration.as_secs_f64(), "duration from packet scan");
    Ok(duration)
}

fn scan_end_timestamp(format: &mut dyn FormatReader, track_id: u32) -> Result<u64> {
    let mut end = None;
    loop {
        match format.next_packet() {
            Ok(packet) if packet.track_id() == track_id => {
                end = Some(packet.ts() + packet.dur());
            }
            Ok(_) => {}
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(DecodeError::Unsupported(e.to_string())),
        }
    }
    end.ok_or(DecodeError::UnknownDuration)
}

pub fn duration_from_frames(frames: u64, sample_rate_hz: u32) -> Duration {
    if sample_rate_hz == 0 {
        return Duration::ZERO;
    }
    let micros = (u128::from(frames) * 1_000_000u128) / u128::from(sample_rate_hz);
    Duration::from_micros(micros.min(u128::from(u64::MAX)) as u64)
}
