use std::{fmt, time::Duration};

use crate::track::TrackId;

/// The scoring procedure that produced a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchSource {
    FixedWindow,
    AdaptiveRate,
}

impl fmt::Display for MatchSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchSource::FixedWindow => write!(f, "fixed-window"),
            MatchSource::AdaptiveRate => write!(f, "adaptive-rate"),
        }
    }
}

/// Two positions in two different tracks that carry the same audio.
#[derive(Debug, Clone, PartialEq)]
pub struct Match {
    pub track1: TrackId,
    pub track2: TrackId,
    pub track1_time: Duration,
    pub track2_time: Duration,
    /// In `[0, 1]`, higher is more similar.
    pub similarity: f32,
    pub source: MatchSource,
}

impl Match {
    pub fn swap_tracks(&mut self) {
        std::mem::swap(&mut self.track1, &mut self.track2);
        std::mem::swap(&mut self.track1_time, &mut self.track2_time);
    }

    pub fn involves(&self, track: TrackId) -> bool {
        self.track1 == track || self.track2 == track
    }

    /// Whether the match connects exactly these two tracks, in either order.
    pub fn connects(&self, a: TrackId, b: TrackId) -> bool {
        (self.track1 == a && self.track2 == b) || (self.track1 == b && self.track2 == a)
    }
}

impl fmt::Display for Match {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{:.3}s <-> {}@{:.3}s: {:.3} ({})",
            self.track1,
            self.track1_time.as_secs_f64(),
            self.track2,
            self.track2_time.as_secs_f64(),
            self.similarity,
            self.source
        )
    }
}

/// All matches found between one pair of tracks.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchPair {
    pub track1: TrackId,
    pub track2: TrackId,
    pub matches: Vec<Match>,
}

impl MatchPair {
    pub fn new(track1: TrackId, track2: TrackId) -> Self {
        MatchPair {
            track1,
            track2,
            matches: Vec::new(),
        }
    }

    pub fn average_similarity(&self) -> f64 {
        if self.matches.is_empty() {
            return 0.0;
        }
        let total: f64 = self.matches.iter().map(|m| m.similarity as f64).sum();
        total / self.matches.len() as f64
    }

    pub fn swap_tracks(&mut self) {
        std::mem::swap(&mut self.track1, &mut self.track2);
    }
}
