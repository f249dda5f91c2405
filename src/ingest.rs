use async_channel::{Receiver, Sender};
use tracing::debug;

use crate::{
    collision::CollisionMap,
    error::{Error, Result},
    fingerprint::SubFingerprint,
    store::FingerprintStore,
    track::TrackId,
};

/// A batch of sub-fingerprints a generator produced for one track.
#[derive(Debug, Clone)]
pub struct SubFingerprintBatch {
    pub track: TrackId,
    pub sub_fingerprints: Vec<SubFingerprint>,
    /// The generator's current frame.
    pub frame: u32,
    pub total_frames: u32,
}

impl SubFingerprintBatch {
    pub fn progress(&self) -> f64 {
        if self.total_frames == 0 {
            return 100.0;
        }
        100.0 * self.frame as f64 / self.total_frames as f64
    }
}

/// The generator side of an ingestion channel. Clone it for each producer.
#[derive(Debug, Clone)]
pub struct BatchSender {
    inner: Sender<SubFingerprintBatch>,
}

#[derive(Debug)]
pub struct BatchReceiver {
    inner: Receiver<SubFingerprintBatch>,
}

/// Creates a bounded channel between generators and a store. Senders block
/// while `capacity` batches are waiting.
pub fn channel(capacity: usize) -> (BatchSender, BatchReceiver) {
    let (tx, rx) = async_channel::bounded(capacity);
    (BatchSender { inner: tx }, BatchReceiver { inner: rx })
}

impl BatchSender {
    pub fn send(&self, batch: SubFingerprintBatch) -> Result<()> {
        self.inner
            .send_blocking(batch)
            .map_err(|_| Error::ChannelClosed)
    }
}

impl<M: CollisionMap> FingerprintStore<M> {
    /// Adds every batch arriving on `receiver` until all senders are dropped.
    /// Returns the number of batches added.
    ///
    /// Batches of one track must arrive in frame order, like with
    /// [`FingerprintStore::add`]; the first violation aborts ingestion.
    pub fn ingest(&self, receiver: BatchReceiver) -> Result<usize> {
        let mut batches = 0;
        while let Ok(batch) = receiver.inner.recv_blocking() {
            self.add(batch.track, &batch.sub_fingerprints)?;
            batches += 1;
            debug!(
                "track {} at {:.1}%",
                batch.track,
                batch.progress()
            );
        }
        Ok(batches)
    }
}
