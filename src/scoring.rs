use crate::{
    error::{Error, Result},
    fingerprint::{Fingerprint, SubFingerprintHash},
    matching::MatchSource,
    profile::{Profile, StrategyKind},
    threshold::ThresholdCurve,
    track::TrackStore,
    utils::sorted_intersection_count,
};

/// Bit error rate reported for windows containing silence.
pub const MAX_BIT_ERROR_RATE: f32 = 1.0;

/// Outcome of comparing two tracks from a pair of colliding positions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Comparison {
    Match { similarity: f32, frames: usize },
    /// The evidence fell below the reject threshold or the frame cap was hit.
    Rejected { frames: usize },
    /// One of the tracks ran out of frames before a decision.
    Exhausted { frames: usize },
    /// Not enough data to compare at all.
    Skipped,
}

impl Comparison {
    pub fn similarity(&self) -> Option<f32> {
        match *self {
            Comparison::Match { similarity, .. } => Some(similarity),
            _ => None,
        }
    }
}

/// Compares windows of `window` consecutive hashes by their bit error rate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedWindowScorer {
    window: usize,
    threshold: f32,
}

impl FixedWindowScorer {
    pub fn new(window: usize, threshold: f32) -> Result<Self> {
        if window < 1 {
            return Err(Error::InvalidProfile(
                "the fingerprint size must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&threshold) {
            return Err(Error::InvalidProfile(format!(
                "the bit error threshold must be between 0 and 1, got {threshold}"
            )));
        }
        Ok(FixedWindowScorer { window, threshold })
    }

    pub fn from_profile(profile: &Profile) -> Result<Self> {
        Self::new(profile.fingerprint_size, profile.bit_error_threshold)
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Bit error rate of the windows starting at `pos1` and `pos2`, or `None`
    /// if either window runs past the end of its sequence.
    ///
    /// A silent hash anywhere in either window yields [`MAX_BIT_ERROR_RATE`],
    /// so two silent sections never line up as a match.
    pub fn bit_error_rate(
        &self,
        hashes1: &[SubFingerprintHash],
        pos1: usize,
        hashes2: &[SubFingerprintHash],
        pos2: usize,
    ) -> Option<f32> {
        let fp1 = Fingerprint::new(hashes1, pos1, self.window)?;
        let fp2 = Fingerprint::new(hashes2, pos2, self.window)?;

        if fp1.contains_silence() || fp2.contains_silence() {
            return Some(MAX_BIT_ERROR_RATE);
        }
        Some(fp1.bit_error_rate(&fp2))
    }

    pub fn judge(&self, bit_error_rate: f32) -> Comparison {
        if bit_error_rate < self.threshold {
            Comparison::Match {
                similarity: 1.0 - bit_error_rate,
                frames: self.window,
            }
        } else {
            Comparison::Rejected {
                frames: self.window,
            }
        }
    }

    pub fn compare(
        &self,
        store1: &TrackStore,
        frame1: u32,
        store2: &TrackStore,
        frame2: u32,
    ) -> Comparison {
        let (Some(pos1), Some(pos2)) = (store1.position(frame1), store2.position(frame2)) else {
            return Comparison::Skipped;
        };

        match self.bit_error_rate(store1.hashes(), pos1, store2.hashes(), pos2) {
            Some(bit_error_rate) => self.judge(bit_error_rate),
            None => Comparison::Skipped,
        }
    }
}

/// Walks two tracks frame by frame from a colliding position, trading the
/// required hash match rate against elapsed frames.
///
/// A high rate over a short stretch is as convincing as a lower rate over a
/// long one, so both thresholds decay exponentially with elapsed time.
#[derive(Debug, Clone)]
pub struct AdaptiveRateScorer {
    min_frames: usize,
    max_frames: usize,
    accept: ThresholdCurve,
    reject: ThresholdCurve,
}

impl AdaptiveRateScorer {
    pub fn from_profile(profile: &Profile) -> Self {
        let accept = ThresholdCurve::sample(
            &profile.threshold,
            profile.matching_max_frames,
            profile.frame_time_scale,
        );
        let reject = ThresholdCurve::sample(
            &profile.reject_threshold(),
            profile.matching_max_frames,
            profile.frame_time_scale,
        );

        AdaptiveRateScorer {
            min_frames: profile.matching_min_frames,
            max_frames: profile.matching_max_frames,
            accept,
            reject,
        }
    }

    pub fn accept_curve(&self) -> &ThresholdCurve {
        &self.accept
    }

    pub fn reject_curve(&self) -> &ThresholdCurve {
        &self.reject
    }

    pub fn max_frames(&self) -> usize {
        self.max_frames
    }

    pub fn compare(
        &self,
        store1: &TrackStore,
        frame1: u32,
        store2: &TrackStore,
        frame2: u32,
    ) -> Comparison {
        let (hashes1, hashes2) = (store1.hashes(), store2.hashes());
        let (mut index1, mut index2) = (frame1, frame2);
        let mut tried = 0usize;
        let mut matched = 0usize;
        let mut frames = 0usize;

        loop {
            let range1 = store1.range(index1).unwrap_or_default();
            let range2 = store2.range(index2).unwrap_or_default();

            let intersection =
                sorted_intersection_count(&hashes1[range1.range()], &hashes2[range2.range()]);
            matched += intersection;
            tried += range1.length + range2.length - intersection;

            // step to the nearest following frame of either track; zero once
            // one of them has no frames left
            let increment = match (store1.next_frame_after(index1), store2.next_frame_after(index2)) {
                (Some(next1), Some(next2)) => (next1 - index1).min(next2 - index2),
                _ => 0,
            };
            index1 += increment;
            index2 += increment;
            frames += increment as usize;

            let rate = if tried == 0 {
                0.0
            } else {
                matched as f64 / tried as f64
            };

            if frames >= self.max_frames || rate < self.reject.at(frames) {
                return Comparison::Rejected { frames };
            }
            if frames > self.min_frames && rate > self.accept.at(frames) {
                return Comparison::Match {
                    similarity: rate as f32,
                    frames,
                };
            }
            if increment == 0 {
                return Comparison::Exhausted { frames };
            }
        }
    }
}

/// The scoring procedure of a store, chosen by the profile.
#[derive(Debug, Clone)]
pub enum Scoring {
    FixedWindow(FixedWindowScorer),
    AdaptiveRate(AdaptiveRateScorer),
}

impl Scoring {
    pub fn from_profile(profile: &Profile) -> Result<Self> {
        Ok(match profile.strategy {
            StrategyKind::FixedWindow => Scoring::FixedWindow(FixedWindowScorer::from_profile(profile)?),
            StrategyKind::AdaptiveRate => Scoring::AdaptiveRate(AdaptiveRateScorer::from_profile(profile)),
        })
    }

    pub fn source(&self) -> MatchSource {
        match self {
            Scoring::FixedWindow(_) => MatchSource::FixedWindow,
            Scoring::AdaptiveRate(_) => MatchSource::AdaptiveRate,
        }
    }

    pub fn compare(
        &self,
        store1: &TrackStore,
        frame1: u32,
        store2: &TrackStore,
        frame2: u32,
    ) -> Comparison {
        match self {
            Scoring::FixedWindow(scorer) => scorer.compare(store1, frame1, store2, frame2),
            Scoring::AdaptiveRate(scorer) => scorer.compare(store1, frame1, store2, frame2),
        }
    }
}
