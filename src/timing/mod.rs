use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::script::Segment;
use crate::VideoError;

/// One image and how long it stays on screen
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageSlot {
    pub path: PathBuf,
    pub duration: Duration,
}

/// How a segment's images line up with its narration
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimingPlan {
    /// Ordinal of the segment this plan belongs to
    pub ordinal: usize,

    /// Sum of all narration durations
    pub total_duration: Duration,

    /// Images in display order; their durations add up to `total_duration`
    pub slots: Vec<ImageSlot>,
}

impl TimingPlan {
    pub fn total_seconds(&self) -> f64 {
        self.total_duration.as_secs_f64()
    }

    /// `total_duration / image count`, `None` when there are no images
    pub fn per_image_duration(&self) -> Option<Duration> {
        let count = u32::try_from(self.slots.len()).ok().filter(|&n| n > 0)?;
        Some(self.total_duration / count)
    }

    pub fn image_count(&self) -> usize {
        self.slots.len()
    }

    /// No images: the segment is rendered over a blank background
    pub fn is_blank(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Compute the timing plan for one segment.
///
/// `audio_durations` holds the length in seconds of each voiceover unit, in
/// unit order. Up to `segment.image_count` images are drawn from `images`
/// without replacement. Display durations are split on whole nanoseconds and
/// the last image absorbs the remainder so that the slots end exactly where
/// the narration does.
pub fn synchronize<R: Rng + ?Sized>(
    segment: &Segment,
    audio_durations: &[f64],
    images: &[PathBuf],
    rng: &mut R,
) -> Result<TimingPlan, VideoError> {
    if audio_durations.len() != segment.voiceover_units.len() {
        return Err(VideoError::AudioCountMismatch {
            expected: segment.voiceover_units.len(),
            actual: audio_durations.len(),
        });
    }

    let total_duration = audio_durations
        .iter()
        .try_fold(Duration::ZERO, |total, &seconds| {
            Duration::try_from_secs_f64(seconds)
                .ok()
                .and_then(|duration| total.checked_add(duration))
                .ok_or(VideoError::InvalidDuration(seconds))
        })?;

    if !segment.wants_images() {
        return Ok(TimingPlan {
            ordinal: segment.ordinal,
            total_duration,
            slots: Vec::new(),
        });
    }

    let chosen_count = (segment.image_count as usize).min(images.len());
    if chosen_count == 0 {
        return Err(VideoError::NoImages {
            keyword: segment.image_keyword.clone(),
            requested: segment.image_count,
        });
    }

    let chosen: Vec<&PathBuf> = images.choose_multiple(rng, chosen_count).collect();
    let slots = split_evenly(total_duration, chosen.len())
        .into_iter()
        .zip(chosen)
        .map(|(duration, path)| ImageSlot {
            path: path.clone(),
            duration,
        })
        .collect();

    Ok(TimingPlan {
        ordinal: segment.ordinal,
        total_duration,
        slots,
    })
}

/// `parts` durations summing exactly to `total`
fn split_evenly(total: Duration, parts: usize) -> Vec<Duration> {
    let Ok(count) = u32::try_from(parts) else {
        return Vec::new();
    };
    if count == 0 {
        return Vec::new();
    }

    let share = total / count;
    let mut durations = vec![share; parts];
    if let Some(last) = durations.last_mut() {
        *last = total - share * (count - 1);
    }
    durations
}
