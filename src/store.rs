use std::{
    collections::HashMap,
    sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
    time::Duration,
};

use rayon::prelude::*;
use tracing::{Level, debug, trace};

use crate::{
    collision::{CollisionMap, DictionaryCollisionMap, LookupEntry},
    error::{Error, Result},
    fingerprint::{SubFingerprint, SubFingerprintHash},
    matching::{Match, MatchSource},
    profile::Profile,
    scoring::{Comparison, FixedWindowScorer, Scoring},
    track::{TrackId, TrackStore},
};

/// Colliding keys handled between two progress reports.
const PROGRESS_INTERVAL: usize = 1000;

/// Indexes the sub-fingerprints of many tracks and finds matches between them.
///
/// A session has two phases: tracks are ingested with [`FingerprintStore::add`],
/// then matches are searched. Ingestion takes the write lock and may run from
/// several producer threads; searching only reads and spreads colliding hashes
/// over the rayon pool.
pub struct FingerprintStore<M = DictionaryCollisionMap> {
    profile: Profile,
    scoring: Scoring,
    fixed_window: FixedWindowScorer,
    inner: RwLock<Inner<M>>,
}

struct Inner<M> {
    tracks: HashMap<TrackId, TrackStore>,
    collision_map: M,
}

impl FingerprintStore<DictionaryCollisionMap> {
    pub fn new(profile: Profile) -> Result<Self> {
        Self::with_collision_map(profile, DictionaryCollisionMap::new())
    }
}

impl<M: CollisionMap> FingerprintStore<M> {
    pub fn with_collision_map(profile: Profile, collision_map: M) -> Result<Self> {
        profile.validate()?;
        let scoring = Scoring::from_profile(&profile)?;
        let fixed_window = FixedWindowScorer::from_profile(&profile)?;

        Ok(FingerprintStore {
            profile,
            scoring,
            fixed_window,
            inner: RwLock::new(Inner {
                tracks: HashMap::new(),
                collision_map,
            }),
        })
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    pub fn scoring(&self) -> &Scoring {
        &self.scoring
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner<M>> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner<M>> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds a batch of sub-fingerprints of one track.
    ///
    /// Frames must not decrease, neither within the batch nor relative to the
    /// previous batch of the same track. A refused batch, or one the collision
    /// map fails to take, leaves the store unchanged. Every hash is indexed for
    /// lookup, variations included, but only original hashes are stored in the
    /// track's sequence. Silent hashes are not indexed when the profile
    /// suppresses silent collisions.
    pub fn add(&self, track: TrackId, sub_fingerprints: &[SubFingerprint]) -> Result<()> {
        if sub_fingerprints.is_empty() {
            return Ok(());
        }

        let mut inner = self.write();
        let Inner {
            tracks,
            collision_map,
        } = &mut *inner;

        let mut last = tracks.get(&track).and_then(TrackStore::last_frame);
        for sfp in sub_fingerprints {
            if let Some(last) = last.filter(|&last| sfp.index < last) {
                return Err(Error::FrameOrder {
                    track,
                    frame: sfp.index,
                    last,
                });
            }
            last = Some(sfp.index);
        }

        let suppress_silence = self.profile.suppress_silent_collisions;
        let entries: Vec<(SubFingerprintHash, LookupEntry)> = sub_fingerprints
            .iter()
            .filter(|sfp| !(suppress_silence && sfp.hash.is_silence()))
            .map(|sfp| (sfp.hash, LookupEntry::new(track, sfp.index)))
            .collect();
        collision_map.add_batch(&entries)?;

        let track_store = tracks.entry(track).or_default();
        for run in sub_fingerprints.chunk_by(|a, b| a.index == b.index) {
            track_store.append_frame(run[0].index, run);
        }

        trace!(
            "added {} sub-fingerprints to track {}",
            sub_fingerprints.len(),
            track
        );
        Ok(())
    }

    pub fn track_count(&self) -> usize {
        self.read().tracks.len()
    }

    pub fn track_ids(&self) -> Vec<TrackId> {
        let mut ids: Vec<TrackId> = self.read().tracks.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Number of stored hashes of a track, if the track is known.
    pub fn track_len(&self, track: TrackId) -> Option<usize> {
        self.read().tracks.get(&track).map(TrackStore::len)
    }

    pub fn track_frame_count(&self, track: TrackId) -> Option<usize> {
        self.read().tracks.get(&track).map(TrackStore::frame_count)
    }

    /// Runs `f` with shared access to the collision map.
    pub fn read_collision_map<R>(&self, f: impl FnOnce(&M) -> R) -> R {
        f(&self.read().collision_map)
    }

    /// Saturates at [`Duration::MAX`].
    pub fn frame_to_time(&self, frame: i64) -> Duration {
        Duration::try_from_secs_f64(frame.max(0) as f64 * self.profile.frame_time_scale)
            .unwrap_or(Duration::MAX)
    }

    /// Compares every pair of entries of `hash` that lie on different tracks.
    pub fn find_matches(&self, hash: SubFingerprintHash) -> Result<Vec<Match>> {
        let inner = self.read();
        self.matches_for_hash(&inner, hash)
    }

    fn matches_for_hash(&self, inner: &Inner<M>, hash: SubFingerprintHash) -> Result<Vec<Match>> {
        let entries = inner.collision_map.values(hash)?;
        let mut matches = Vec::new();

        for (x, entry1) in entries.iter().enumerate() {
            for entry2 in &entries[x + 1..] {
                if entry1.track == entry2.track {
                    continue;
                }
                let (Some(store1), Some(store2)) =
                    (inner.tracks.get(&entry1.track), inner.tracks.get(&entry2.track))
                else {
                    continue;
                };

                let outcome = self
                    .scoring
                    .compare(store1, entry1.index, store2, entry2.index);
                if let Comparison::Match { similarity, .. } = outcome {
                    matches.push(Match {
                        track1: entry1.track,
                        track2: entry2.track,
                        track1_time: self.frame_to_time(entry1.index as i64),
                        track2_time: self.frame_to_time(entry2.index as i64),
                        similarity,
                        source: self.scoring.source(),
                    });
                }
            }
        }

        Ok(matches)
    }

    /// Searches all colliding hashes for matches between tracks.
    ///
    /// The silent hash is skipped. `progress` receives non-decreasing
    /// percentages and finally 100. Matches are reported as found: the same
    /// alignment is usually found from several colliding hashes, see
    /// [`crate::processor::filter_duplicate_matches`].
    pub fn find_all_matches(&self, mut progress: impl FnMut(f64)) -> Result<Vec<Match>> {
        let guard = self.read();
        let inner: &Inner<M> = &guard;
        let colliding_keys = inner.collision_map.colliding_keys()?;

        if tracing::enabled!(Level::DEBUG) {
            let lookup_entries = colliding_keys
                .iter()
                .map(|&hash| inner.collision_map.values(hash).map(|entries| entries.len()))
                .sum::<Result<usize>>()?;
            debug!(
                "{} colliding keys, {} lookup entries",
                colliding_keys.len(),
                lookup_entries
            );
        }

        let total = colliding_keys.len();
        let mut matches = Vec::new();
        let mut processed = 0;

        for chunk in colliding_keys.chunks(PROGRESS_INTERVAL) {
            let chunk_matches = chunk
                .par_iter()
                .filter(|hash| !hash.is_silence())
                .map(|&hash| self.matches_for_hash(inner, hash))
                .collect::<Result<Vec<_>>>()?;
            matches.extend(chunk_matches.into_iter().flatten());

            processed += chunk.len();
            progress(100.0 * processed as f64 / total as f64);
        }
        if total == 0 {
            progress(100.0);
        }

        debug!("{} matches", matches.len());
        Ok(matches)
    }

    /// Compares an external hash sequence of `track` against the store with
    /// the fixed window scorer.
    ///
    /// Windows that would overrun the end of either sequence are shifted to
    /// the left; collisions too close to the start for that are skipped.
    pub fn find_matches_external(
        &self,
        track: TrackId,
        hashes: &[SubFingerprintHash],
    ) -> Result<Vec<Match>> {
        let window = self.fixed_window.window();
        if hashes.len() < window {
            return Err(Error::QueryTooShort {
                given: hashes.len(),
                required: window,
            });
        }

        let inner = self.read();
        let mut matches = Vec::new();
        let mut collisions = 0usize;

        for (i, &hash) in hashes.iter().enumerate() {
            let Some(entries) = inner.collision_map.get(hash)? else {
                continue;
            };

            for collision in entries.iter() {
                let Some(stored) = inner.tracks.get(&collision.track) else {
                    continue;
                };
                let Some(position) = stored.position(collision.index) else {
                    continue;
                };
                collisions += 1;

                let external_overflow = window as i64 - (hashes.len() - i) as i64;
                let internal_overflow = window as i64 - (stored.len() - position) as i64;
                let shift = external_overflow.max(internal_overflow).max(0);

                let external_index = i as i64 - shift;
                let internal_index = position as i64 - shift;
                if external_index < 0 || internal_index < 0 {
                    continue;
                }

                let Some(bit_error_rate) = self.fixed_window.bit_error_rate(
                    stored.hashes(),
                    internal_index as usize,
                    hashes,
                    external_index as usize,
                ) else {
                    continue;
                };

                if let Comparison::Match { similarity, .. } = self.fixed_window.judge(bit_error_rate) {
                    matches.push(Match {
                        track1: collision.track,
                        track2: track,
                        track1_time: self.frame_to_time(collision.index as i64 - shift),
                        track2_time: self.frame_to_time(external_index),
                        similarity,
                        source: MatchSource::FixedWindow,
                    });
                }
            }
        }

        debug!("{} collisions, {} matches", collisions, matches.len());
        Ok(matches)
    }

    /// The fixed-size window of stored hashes starting at `entry`, moved left
    /// to fit when the track ends early. `None` if the track is too short.
    pub fn fingerprint_at(&self, entry: LookupEntry) -> Option<Vec<SubFingerprintHash>> {
        let window = self.fixed_window.window();
        let inner = self.read();
        let stored = inner.tracks.get(&entry.track)?;
        let position = stored.position(entry.index)?;
        if stored.len() < window {
            return None;
        }

        let start = position.min(stored.len() - window);
        Some(stored.hashes()[start..start + window].to_vec())
    }
}
