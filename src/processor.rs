use std::{collections::HashMap, time::Duration};

use crate::{
    error::{Error, Result},
    matching::{Match, MatchPair},
    track::TrackId,
};

/// How a single match is picked from the matches of one track pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum MatchFilterMode {
    /// The most similar match.
    Best,
    /// The temporally first match.
    First,
    /// The temporally middle match.
    Mid,
    /// The temporally last match.
    Last,
}

/// Drops matches that repeat an earlier match: same tracks at the same
/// positions with the same similarity, in either track order.
pub fn filter_duplicate_matches(matches: Vec<Match>, mut progress: impl FnMut(f64)) -> Vec<Match> {
    let total = matches.len();
    let mut filtered: Vec<Match> = Vec::with_capacity(total);
    // only matches with the same time sum can be duplicates
    let mut by_time_sum: HashMap<Duration, Vec<usize>> = HashMap::new();

    for (i, m) in matches.into_iter().enumerate() {
        let candidates = by_time_sum.entry(m.track1_time + m.track2_time).or_default();
        let duplicate = candidates.iter().any(|&j| is_duplicate(&filtered[j], &m));
        if !duplicate {
            candidates.push(filtered.len());
            filtered.push(m);
        }

        if (i + 1) % 1000 == 0 || i + 1 == total {
            progress(100.0 * (i + 1) as f64 / total as f64);
        }
    }

    filtered
}

fn is_duplicate(a: &Match, b: &Match) -> bool {
    let same = a.track1 == b.track1 && a.track2 == b.track2 && a.track1_time == b.track1_time;
    let swapped = a.track1 == b.track2 && a.track2 == b.track1 && a.track1_time == b.track2_time;
    (same || swapped) && a.similarity == b.similarity
}

/// Every unordered pair of distinct tracks.
pub fn track_pairs(tracks: &[TrackId]) -> Vec<MatchPair> {
    let mut pairs = Vec::new();
    for (x, &track1) in tracks.iter().enumerate() {
        for &track2 in &tracks[x + 1..] {
            pairs.push(MatchPair::new(track1, track2));
        }
    }
    pairs
}

/// Hands each pair the matches connecting its two tracks, in either order.
pub fn assign_matches(pairs: &mut [MatchPair], matches: &[Match]) {
    for pair in pairs.iter_mut() {
        pair.matches = matches
            .iter()
            .filter(|m| m.connects(pair.track1, pair.track2))
            .cloned()
            .collect();
    }
}

fn validate_pair(matches: &[Match]) -> Result<()> {
    let Some(first) = matches.first() else {
        return Err(Error::InvalidMatchSet("no matches to filter"));
    };
    if first.track1 == first.track2
        || !matches.iter().all(|m| m.connects(first.track1, first.track2))
    {
        return Err(Error::InvalidMatchSet(
            "matches must belong to a single pair of tracks",
        ));
    }
    Ok(())
}

fn time_on(m: &Match, track: TrackId) -> Duration {
    if m.track1 == track {
        m.track1_time
    } else {
        m.track2_time
    }
}

/// Picks one match of a single track pair. Temporal modes order the matches
/// by their position on the first match's first track.
pub fn filter(matches: &[Match], mode: MatchFilterMode) -> Result<Match> {
    validate_pair(matches)?;
    let anchor = matches[0].track1;

    let picked = match mode {
        MatchFilterMode::Best => matches
            .iter()
            .max_by(|a, b| a.similarity.total_cmp(&b.similarity)),
        MatchFilterMode::First | MatchFilterMode::Mid | MatchFilterMode::Last => {
            let mut by_time: Vec<&Match> = matches.iter().collect();
            by_time.sort_by_key(|m| time_on(m, anchor));
            match mode {
                MatchFilterMode::First => by_time.first().copied(),
                MatchFilterMode::Mid => by_time.get(by_time.len() / 2).copied(),
                _ => by_time.last().copied(),
            }
        }
    };

    picked
        .cloned()
        .ok_or(Error::InvalidMatchSet("no matches to filter"))
}

/// Splits the matches of a single track pair into consecutive windows of
/// `window` by track-1 time and picks one match per non-empty window.
///
/// All matches are first oriented so that they share the same first track.
pub fn window_filter(matches: &[Match], mode: MatchFilterMode, window: Duration) -> Result<Vec<Match>> {
    validate_pair(matches)?;
    if window.is_zero() {
        return Err(Error::InvalidMatchSet("filter window must not be empty"));
    }

    let anchor = matches[0].track1;
    let mut oriented: Vec<Match> = matches.to_vec();
    for m in oriented.iter_mut().filter(|m| m.track1 != anchor) {
        m.swap_tracks();
    }
    oriented.sort_by_key(|m| m.track1_time);

    let mut filtered = Vec::new();
    for group in oriented.chunk_by(|a, b| window_index(a, window) == window_index(b, window)) {
        filtered.push(filter(group, mode)?);
    }
    Ok(filtered)
}

fn window_index(m: &Match, window: Duration) -> u128 {
    m.track1_time.as_nanos() / window.as_nanos()
}
