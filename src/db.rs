use std::{
    borrow::Cow,
    path::Path,
    sync::{Mutex, MutexGuard, PoisonError},
};

use rusqlite::{Connection, params};
use tracing::debug;

use crate::{
    collision::{CollisionMap, LookupEntry},
    error::Result,
    fingerprint::SubFingerprintHash,
    track::TrackId,
};

const INSERT_BUFFER_SIZE: usize = 1000;

/// A collision map that keeps its lookup entries in SQLite instead of memory.
///
/// Inserts are buffered and written in batches; the hash index is built on
/// the first lookup. The connection is guarded by its own mutex, so lookups
/// from parallel matching workers are serialized here.
pub struct SqliteCollisionMap {
    inner: Mutex<Inner>,
}

struct Inner {
    conn: Connection,
    buffer: Vec<(SubFingerprintHash, LookupEntry)>,
    indexed: bool,
}

impl SqliteCollisionMap {
    pub fn open(path: &Path) -> Result<Self> {
        Self::with_connection(Connection::open(path)?)
    }

    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        // scratch data for a single session, durability does not matter
        conn.pragma_update(None, "synchronous", "OFF")?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS lookup_entries (
                hash INTEGER NOT NULL,
                track INTEGER NOT NULL,
                frame INTEGER NOT NULL
            )",
            [],
        )?;
        // lookup entries never outlive a session
        let stale = conn.execute("DELETE FROM lookup_entries", [])?;
        if stale > 0 {
            debug!("discarded {} lookup entries of a previous session", stale);
        }

        Ok(SqliteCollisionMap {
            inner: Mutex::new(Inner {
                conn,
                buffer: Vec::with_capacity(INSERT_BUFFER_SIZE),
                indexed: false,
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Total number of stored lookup entries.
    pub fn entry_count(&self) -> Result<usize> {
        let mut inner = self.lock();
        inner.flush()?;
        let count: i64 = inner
            .conn
            .query_row("SELECT COUNT(*) FROM lookup_entries", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Deletes the entries of every hash that occurs only once. Returns the
    /// number of deleted rows.
    pub fn prune_singletons(&mut self) -> Result<usize> {
        let inner = self
            .inner
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        inner.flush()?;
        let deleted = inner.conn.execute(
            "DELETE FROM lookup_entries WHERE hash IN (
                SELECT hash FROM lookup_entries GROUP BY hash HAVING COUNT(*) = 1
            )",
            [],
        )?;
        debug!("pruned {} singleton lookup entries", deleted);
        Ok(deleted)
    }
}

impl Inner {
    fn flush(&mut self) -> rusqlite::Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO lookup_entries (hash, track, frame) VALUES (?, ?, ?)",
            )?;
            for (hash, entry) in &self.buffer {
                stmt.execute(params![hash.value(), entry.track.0, entry.index])?;
            }
        }
        tx.commit()?;
        self.buffer.clear();
        Ok(())
    }

    fn prepare_lookup(&mut self) -> rusqlite::Result<()> {
        self.flush()?;
        if !self.indexed {
            self.conn.execute(
                "CREATE INDEX IF NOT EXISTS lookup_entries_hash ON lookup_entries (hash)",
                [],
            )?;
            self.indexed = true;
        }
        Ok(())
    }
}

impl CollisionMap for SqliteCollisionMap {
    fn add(&mut self, hash: SubFingerprintHash, entry: LookupEntry) -> Result<()> {
        let inner = self
            .inner
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        inner.buffer.push((hash, entry));
        if inner.buffer.len() >= INSERT_BUFFER_SIZE {
            inner.flush()?;
        }
        Ok(())
    }

    fn add_batch(&mut self, entries: &[(SubFingerprintHash, LookupEntry)]) -> Result<()> {
        let inner = self
            .inner
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        let pending = inner.buffer.len();
        inner.buffer.extend_from_slice(entries);
        if inner.buffer.len() >= INSERT_BUFFER_SIZE {
            if let Err(err) = inner.flush() {
                inner.buffer.truncate(pending);
                return Err(err.into());
            }
        }
        Ok(())
    }

    fn colliding_keys(&self) -> Result<Vec<SubFingerprintHash>> {
        let mut inner = self.lock();
        inner.prepare_lookup()?;

        let mut stmt = inner
            .conn
            .prepare_cached("SELECT hash FROM lookup_entries GROUP BY hash HAVING COUNT(*) > 1")?;
        let hashes = stmt
            .query_map([], |row| Ok(SubFingerprintHash::new(row.get(0)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(hashes)
    }

    fn get(&self, hash: SubFingerprintHash) -> Result<Option<Cow<'_, [LookupEntry]>>> {
        let mut inner = self.lock();
        inner.prepare_lookup()?;

        let mut stmt = inner.conn.prepare_cached(
            "SELECT track, frame FROM lookup_entries WHERE hash = ? ORDER BY rowid",
        )?;
        let entries = stmt
            .query_map([hash.value()], |row| {
                Ok(LookupEntry::new(TrackId(row.get(0)?), row.get(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        if entries.is_empty() {
            Ok(None)
        } else {
            Ok(Some(Cow::Owned(entries)))
        }
    }
}
