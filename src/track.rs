use std::{collections::BTreeMap, fmt, ops::Range};

use crate::fingerprint::{SubFingerprint, SubFingerprintHash};

/// Identifies a track within a matching session. Two lookup entries belong to
/// the same track iff their ids are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TrackId(pub u32);

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Where the hashes of one frame live in a track's hash sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IndexEntry {
    pub start: usize,
    pub length: usize,
}

impl IndexEntry {
    pub fn range(&self) -> Range<usize> {
        self.start..self.start + self.length
    }
}

/// The ordered hashes of a single track plus a sparse frame index into them.
///
/// Only ever appended to. Frames without stored hashes have no index entry.
#[derive(Debug, Default)]
pub struct TrackStore {
    hashes: Vec<SubFingerprintHash>,
    index: BTreeMap<u32, IndexEntry>,
    last_frame: Option<u32>,
}

impl TrackStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hashes(&self) -> &[SubFingerprintHash] {
        &self.hashes
    }

    /// Number of stored (non-variation) hashes.
    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }

    /// Number of frames holding at least one stored hash.
    pub fn frame_count(&self) -> usize {
        self.index.len()
    }

    pub fn last_frame(&self) -> Option<u32> {
        self.last_frame
    }

    pub fn range(&self, frame: u32) -> Option<IndexEntry> {
        self.index.get(&frame).copied()
    }

    /// Position of a frame's first hash in the sequence.
    pub fn position(&self, frame: u32) -> Option<usize> {
        self.index.get(&frame).map(|entry| entry.start)
    }

    pub fn frame_hashes(&self, frame: u32) -> &[SubFingerprintHash] {
        match self.index.get(&frame) {
            Some(entry) => &self.hashes[entry.range()],
            None => &[],
        }
    }

    pub fn next_frame_after(&self, frame: u32) -> Option<u32> {
        let next = frame.checked_add(1)?;
        self.index.range(next..).next().map(|(&frame, _)| frame)
    }

    /// Appends the stored hashes of one frame run. Variations are skipped.
    ///
    /// The caller guarantees `frame >= last_frame`, so a repeated frame is
    /// always the most recently appended one and its range stays contiguous.
    pub(crate) fn append_frame(&mut self, frame: u32, run: &[SubFingerprint]) {
        debug_assert!(self.last_frame.is_none_or(|last| frame >= last));
        self.last_frame = Some(frame);

        let start = self.hashes.len();
        self.hashes
            .extend(run.iter().filter(|sfp| !sfp.is_variation).map(|sfp| sfp.hash));
        let count = self.hashes.len() - start;
        if count == 0 {
            return;
        }

        let entry = self
            .index
            .entry(frame)
            .and_modify(|entry| entry.length += count)
            .or_insert(IndexEntry {
                start,
                length: count,
            });

        // the zipper intersection relies on sorted frame ranges
        let range = entry.range();
        self.hashes[range].sort_unstable();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(frame: u32, values: &[u32]) -> Vec<SubFingerprint> {
        values
            .iter()
            .map(|&v| SubFingerprint::new(frame, SubFingerprintHash::new(v), false))
            .collect()
    }

    #[test]
    fn test_append_and_lookup() {
        let mut store = TrackStore::new();
        store.append_frame(0, &run(0, &[5, 1]));
        store.append_frame(3, &run(3, &[9]));

        assert_eq!(store.len(), 3);
        assert_eq!(store.frame_count(), 2);
        assert_eq!(store.range(0), Some(IndexEntry { start: 0, length: 2 }));
        assert_eq!(store.range(3), Some(IndexEntry { start: 2, length: 1 }));
        assert_eq!(store.range(1), None);
        assert!(store.frame_hashes(2).is_empty());
        assert_eq!(store.position(3), Some(2));
    }

    #[test]
    fn test_frame_range_is_sorted() {
        let mut store = TrackStore::new();
        store.append_frame(7, &run(7, &[30, 10, 20]));
        let values: Vec<u32> = store.frame_hashes(7).iter().map(|h| h.value()).collect();
        assert_eq!(values, vec![10, 20, 30]);
    }

    #[test]
    fn test_repeated_frame_extends_range() {
        let mut store = TrackStore::new();
        store.append_frame(2, &run(2, &[8, 4]));
        store.append_frame(2, &run(2, &[6]));

        assert_eq!(store.range(2), Some(IndexEntry { start: 0, length: 3 }));
        let values: Vec<u32> = store.frame_hashes(2).iter().map(|h| h.value()).collect();
        assert_eq!(values, vec![4, 6, 8]);
    }

    #[test]
    fn test_variations_are_not_stored() {
        let mut store = TrackStore::new();
        let mut frame = run(0, &[1]);
        frame.push(SubFingerprint::new(0, SubFingerprintHash::new(3), true));
        store.append_frame(0, &frame);
        store.append_frame(1, &[SubFingerprint::new(1, SubFingerprintHash::new(2), true)]);

        assert_eq!(store.len(), 1);
        assert_eq!(store.range(1), None);
        assert_eq!(store.last_frame(), Some(1));
    }

    #[test]
    fn test_next_frame_after() {
        let mut store = TrackStore::new();
        store.append_frame(0, &run(0, &[1]));
        store.append_frame(4, &run(4, &[1]));
        store.append_frame(u32::MAX, &run(u32::MAX, &[1]));

        assert_eq!(store.next_frame_after(0), Some(4));
        assert_eq!(store.next_frame_after(1), Some(4));
        assert_eq!(store.next_frame_after(4), Some(u32::MAX));
        assert_eq!(store.next_frame_after(u32::MAX), None);
    }
}
