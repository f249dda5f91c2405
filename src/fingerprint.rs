use std::fmt;

use serde::Deserialize;

pub const HASH_BITS: usize = 32;

const fn bit_mask(bit: usize) -> u32 {
    1 << bit
}

/// A 32-bit sub-fingerprint code. Ordering is numeric.
///
/// The value zero is reserved for frames without any signal (silence) and is
/// never used as evidence for a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Deserialize)]
#[serde(transparent)]
pub struct SubFingerprintHash(u32);

impl SubFingerprintHash {
    pub const SILENCE: SubFingerprintHash = SubFingerprintHash(0);

    pub const fn new(value: u32) -> Self {
        SubFingerprintHash(value)
    }

    pub const fn value(self) -> u32 {
        self.0
    }

    pub const fn is_silence(self) -> bool {
        self.0 == 0
    }

    /// Panics if `bit` is not in `0..32`.
    pub fn bit(self, bit: usize) -> bool {
        assert!(bit < HASH_BITS, "bit index {bit} out of range 0..{HASH_BITS}");
        self.0 & bit_mask(bit) != 0
    }

    /// Returns a copy with `bit` set to `value`. Panics if `bit` is not in `0..32`.
    pub fn with_bit(self, bit: usize, value: bool) -> Self {
        assert!(bit < HASH_BITS, "bit index {bit} out of range 0..{HASH_BITS}");
        if value {
            SubFingerprintHash(self.0 | bit_mask(bit))
        } else {
            SubFingerprintHash(self.0 & !bit_mask(bit))
        }
    }

    /// Builds a variation code by inverting a single bit.
    pub fn flip_bit(self, bit: usize) -> Self {
        self.with_bit(bit, !self.bit(bit))
    }

    pub fn difference(self, other: SubFingerprintHash) -> SubFingerprintHash {
        SubFingerprintHash(self.0 ^ other.0)
    }

    #[inline]
    pub fn hamming_distance(self, other: SubFingerprintHash) -> u32 {
        // count_ones lowers to popcnt, or to a parallel bit count without it
        (self.0 ^ other.0).count_ones()
    }
}

impl From<u32> for SubFingerprintHash {
    fn from(value: u32) -> Self {
        SubFingerprintHash(value)
    }
}

impl fmt::Display for SubFingerprintHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032b} ({})", self.0, self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct SubFingerprint {
    pub index: u32,
    pub hash: SubFingerprintHash,
    /// Set when the hash was derived from an original code by flipping weak bits.
    /// Variations are indexed for lookup but never stored in a track's sequence.
    #[serde(default, rename = "variation")]
    pub is_variation: bool,
}

impl SubFingerprint {
    pub fn new(index: u32, hash: SubFingerprintHash, is_variation: bool) -> Self {
        SubFingerprint {
            index,
            hash,
            is_variation,
        }
    }
}

/// A window of consecutive sub-fingerprint hashes borrowed from a track.
#[derive(Debug, Clone, Copy)]
pub struct Fingerprint<'a> {
    hashes: &'a [SubFingerprintHash],
}

impl<'a> Fingerprint<'a> {
    pub fn new(hashes: &'a [SubFingerprintHash], index: usize, length: usize) -> Option<Self> {
        let end = index.checked_add(length)?;
        hashes.get(index..end).map(|hashes| Fingerprint { hashes })
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = SubFingerprintHash> + 'a {
        self.hashes.iter().copied()
    }

    pub fn difference(&self, other: &Fingerprint<'_>) -> Vec<SubFingerprintHash> {
        assert_eq!(self.len(), other.len(), "cannot diff fingerprints of different lengths");
        self.iter()
            .zip(other.iter())
            .map(|(a, b)| a.difference(b))
            .collect()
    }

    pub fn contains_silence(&self) -> bool {
        self.iter().any(SubFingerprintHash::is_silence)
    }

    /// Fraction of differing bits over the whole window.
    pub fn bit_error_rate(&self, other: &Fingerprint<'_>) -> f32 {
        assert_eq!(self.len(), other.len(), "cannot compare fingerprints of different lengths");
        if self.is_empty() {
            return 0.0;
        }
        let bit_errors: u64 = self
            .iter()
            .zip(other.iter())
            .map(|(a, b)| u64::from(a.hamming_distance(b)))
            .sum();
        bit_errors as f32 / (self.len() * HASH_BITS) as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_bit_access() {
        let hash = SubFingerprintHash::new(0b1010);
        assert!(!hash.bit(0));
        assert!(hash.bit(1));
        assert!(hash.bit(3));
        assert!(!hash.bit(31));
    }

    #[test]
    fn test_with_bit_and_flip() {
        let hash = SubFingerprintHash::new(0);
        let set = hash.with_bit(31, true);
        assert_eq!(set.value(), 0x8000_0000);
        assert_eq!(set.with_bit(31, false), hash);
        assert_eq!(hash.flip_bit(4).value(), 16);
        assert_eq!(hash.flip_bit(4).flip_bit(4), hash);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_bit_out_of_range() {
        SubFingerprintHash::new(1).bit(32);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_with_bit_out_of_range() {
        SubFingerprintHash::new(1).with_bit(40, true);
    }

    #[test]
    fn test_ordering_is_numeric() {
        let mut hashes: Vec<SubFingerprintHash> =
            [7u32, u32::MAX, 0, 3].into_iter().map(Into::into).collect();
        hashes.sort();
        let values: Vec<u32> = hashes.iter().map(|h| h.value()).collect();
        assert_eq!(values, vec![0, 3, 7, u32::MAX]);
        assert!(SubFingerprintHash::new(2) < SubFingerprintHash::new(0x8000_0000));
    }

    #[test]
    fn test_silence() {
        assert!(SubFingerprintHash::SILENCE.is_silence());
        assert!(!SubFingerprintHash::new(1).is_silence());
    }

    #[test]
    fn test_display() {
        let hash = SubFingerprintHash::new(5);
        assert_eq!(
            hash.to_string(),
            "00000000000000000000000000000101 (5)"
        );
    }

    #[test]
    fn test_fingerprint_window_bounds() {
        let hashes: Vec<SubFingerprintHash> = (1..=10).map(SubFingerprintHash::new).collect();
        assert!(Fingerprint::new(&hashes, 0, 10).is_some());
        assert!(Fingerprint::new(&hashes, 5, 5).is_some());
        assert!(Fingerprint::new(&hashes, 6, 5).is_none());
        assert!(Fingerprint::new(&hashes, usize::MAX, 2).is_none());
    }

    #[test]
    fn test_bit_error_rate() {
        let a: Vec<SubFingerprintHash> = vec![0u32, 0, 0, 0].into_iter().map(Into::into).collect();
        let b: Vec<SubFingerprintHash> = vec![u32::MAX, 0, 0, 0xFFFF]
            .into_iter()
            .map(Into::into)
            .collect();
        let fa = Fingerprint::new(&a, 0, 4).unwrap();
        let fb = Fingerprint::new(&b, 0, 4).unwrap();
        assert_eq!(fa.bit_error_rate(&fb), 48.0 / 128.0);
        assert_eq!(fa.bit_error_rate(&fa), 0.0);
        assert!(!fa.contains_silence());
        assert_eq!(fa.difference(&fb)[3].value(), 0xFFFF);
    }

    #[test]
    fn test_deserialize_sub_fingerprint() {
        let sfp: SubFingerprint = serde_json::from_str(r#"{"index": 3, "hash": 42}"#).unwrap();
        assert_eq!(sfp, SubFingerprint::new(3, SubFingerprintHash::new(42), false));

        let sfp: SubFingerprint =
            serde_json::from_str(r#"{"index": 3, "hash": 42, "variation": true}"#).unwrap();
        assert!(sfp.is_variation);
    }

    proptest! {
        #[test]
        fn hamming_distance_to_self_is_zero(x in any::<u32>()) {
            let x = SubFingerprintHash::new(x);
            prop_assert_eq!(x.hamming_distance(x), 0);
        }

        #[test]
        fn hamming_distance_is_symmetric(x in any::<u32>(), y in any::<u32>()) {
            let (x, y) = (SubFingerprintHash::new(x), SubFingerprintHash::new(y));
            prop_assert_eq!(x.hamming_distance(y), y.hamming_distance(x));
        }

        #[test]
        fn hamming_distance_counts_flipped_bits(
            x in any::<u32>(),
            bits in proptest::collection::btree_set(0usize..HASH_BITS, 0..=HASH_BITS),
        ) {
            let original = SubFingerprintHash::new(x);
            let flipped = bits.iter().fold(original, |hash, &bit| hash.flip_bit(bit));
            prop_assert_eq!(original.hamming_distance(flipped), bits.len() as u32);
        }
    }
}
