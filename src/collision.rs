use std::{borrow::Cow, collections::HashMap};

use crate::{error::Result, fingerprint::SubFingerprintHash, track::TrackId};

/// One occurrence of a hash: the track and the frame it was generated at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LookupEntry {
    pub track: TrackId,
    pub index: u32,
}

impl LookupEntry {
    pub fn new(track: TrackId, index: u32) -> Self {
        LookupEntry { track, index }
    }
}

/// Indexes hash occurrences across tracks.
///
/// Entries are only ever appended. A hash collides once it holds two or more
/// entries, whichever tracks they belong to.
pub trait CollisionMap: Send + Sync {
    fn add(&mut self, hash: SubFingerprintHash, entry: LookupEntry) -> Result<()>;

    /// Adds all entries or, on error, none of them.
    ///
    /// The default adds one by one and suits maps whose `add` cannot fail.
    fn add_batch(&mut self, entries: &[(SubFingerprintHash, LookupEntry)]) -> Result<()> {
        for &(hash, entry) in entries {
            self.add(hash, entry)?;
        }
        Ok(())
    }

    /// All hashes with at least two entries, in no particular order.
    fn colliding_keys(&self) -> Result<Vec<SubFingerprintHash>>;

    /// The entries of a hash in insertion order, or `None` if it was never added.
    fn get(&self, hash: SubFingerprintHash) -> Result<Option<Cow<'_, [LookupEntry]>>>;

    /// The entries of a hash known to be in the map.
    ///
    /// Panics if the hash was never added: callers only ask for hashes they
    /// obtained from [`CollisionMap::colliding_keys`] or from ingestion.
    fn values(&self, hash: SubFingerprintHash) -> Result<Cow<'_, [LookupEntry]>> {
        match self.get(hash)? {
            Some(entries) => Ok(entries),
            None => panic!("hash {hash} is not in the collision map"),
        }
    }
}

#[derive(Debug, Default)]
pub struct DictionaryCollisionMap {
    lookup_table: HashMap<SubFingerprintHash, Vec<LookupEntry>>,
}

impl DictionaryCollisionMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct hashes.
    pub fn len(&self) -> usize {
        self.lookup_table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lookup_table.is_empty()
    }
}

impl CollisionMap for DictionaryCollisionMap {
    fn add(&mut self, hash: SubFingerprintHash, entry: LookupEntry) -> Result<()> {
        self.lookup_table.entry(hash).or_default().push(entry);
        Ok(())
    }

    fn colliding_keys(&self) -> Result<Vec<SubFingerprintHash>> {
        Ok(self
            .lookup_table
            .iter()
            .filter(|(_, entries)| entries.len() > 1)
            .map(|(&hash, _)| hash)
            .collect())
    }

    fn get(&self, hash: SubFingerprintHash) -> Result<Option<Cow<'_, [LookupEntry]>>> {
        Ok(self
            .lookup_table
            .get(&hash)
            .map(|entries| Cow::Borrowed(entries.as_slice())))
    }
}
