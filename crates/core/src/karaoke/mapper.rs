use crate::config::SyncTuning;
use crate::karaoke::WordTimeline;

/// Index of the word being spoken `current_time_secs` into a track of
/// `total_duration_secs`.
///
/// Pure: the result depends only on the arguments, so seeking backwards or
/// re-invoking after a track change needs no bookkeeping.
///
/// Returns `None` only for an empty timeline. Negative or NaN times count as
/// the start of the track. When the speech offset leaves no positive
/// effective duration the last word is reported.
pub fn map_time_to_word_index(
    current_time_secs: f64,
    total_duration_secs: f64,
    timeline: &WordTimeline,
    tuning: &SyncTuning,
) -> Option<usize> {
    let last = timeline.last_index()?;

    let offset = tuning.speech_start_offset_secs;
    let effective = total_duration_secs - offset;
    if !effective.is_finite() || effective <= 0.0 {
        return Some(last);
    }

    let current = if current_time_secs.is_nan() {
        0.0
    } else {
        current_time_secs
    };
    let adjusted = (current - offset).max(0.0);
    let progress = (adjusted / effective).min(1.0);
    let target = progress * timeline.total_weight();

    // first token not yet fully spoken
    let idx = timeline
        .tokens()
        .partition_point(|t| t.cumulative_weight <= target);
    Some(idx.min(last))
}
