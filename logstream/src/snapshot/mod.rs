use super::*;

use crate::log_storage::LogStream;
use crate::process::ThreadHandle;
use std::sync::atomic::{AtomicI64, Ordering};

mod composed;
mod storage;
pub mod thread;

pub use composed::{ComposedSnapshot, SnapshotSupport};
pub use storage::SnapshotStorage;

/// Number of snapshot files kept on disk.
/// The log is kept from the oldest one so recovery can fall back to it.
const RETAINED_SNAPSHOTS: usize = 2;

/// Takes snapshots of the materialized state of a partition and recovers from them.
/// A snapshot at position `p` reflects every entry at or before `p`.
pub struct SnapshotController {
    log: LogStream,
    composed: Arc<ComposedSnapshot>,
    storage: SnapshotStorage,
    /// Position of the latest snapshot taken or recovered.
    latest: AtomicI64,
}

impl SnapshotController {
    pub fn new(log: LogStream, composed: ComposedSnapshot, storage: SnapshotStorage) -> Self {
        Self {
            log,
            composed: Arc::new(composed),
            storage,
            latest: AtomicI64::new(NULL_POSITION),
        }
    }

    pub fn latest_position(&self) -> Position {
        self.latest.load(Ordering::SeqCst)
    }

    pub fn log(&self) -> &LogStream {
        &self.log
    }

    /// Save the materialized state as of `position`, which must be committed.
    /// The caller ensures the state doesn't move while it is written.
    /// Returns false if a snapshot at or after `position` already exists.
    pub async fn take_snapshot(&self, position: Position) -> Result<bool> {
        ensure!(
            position >= 0 && position <= self.log.commit_position(),
            Error::InvalidArgument(format!(
                "snapshot position {position} is not committed (commit={})",
                self.log.commit_position()
            ))
        );
        if position <= self.latest_position() {
            return Ok(false);
        }

        let composed = self.composed.clone();
        let storage = self.storage.clone();
        tokio::task::spawn_blocking(move || storage.write(position, &composed)).await??;
        self.latest.fetch_max(position, Ordering::SeqCst);
        self.log.set_snapshot_position(position)?;
        info!(
            "took snapshot at {position} (partition_id={})",
            self.log.partition_id()
        );

        let positions = self.storage.list()?;
        if positions.len() > RETAINED_SNAPSHOTS {
            let oldest_kept = positions[positions.len() - RETAINED_SNAPSHOTS];
            self.storage.delete_before(oldest_kept)?;
        }
        let positions = self.storage.list()?;
        if positions.len() >= RETAINED_SNAPSHOTS {
            self.log.truncate_before(positions[0]).await?;
        }
        Ok(true)
    }

    /// Restore the state from the latest valid snapshot and return its position.
    /// Corrupt snapshots are skipped in favor of older ones. If none is valid,
    /// the state is reset and `None` is returned, meaning the whole log is replayed.
    /// That is only possible while the log still starts at 0. Otherwise recovery fails
    /// with `CorruptSnapshot` since the truncated entries can't be replayed.
    pub async fn recover(&self) -> Result<Option<Position>> {
        let composed = self.composed.clone();
        let storage = self.storage.clone();
        let recovered =
            tokio::task::spawn_blocking(move || recover_latest(&storage, &composed)).await??;
        match recovered {
            Some(position) => {
                self.latest.fetch_max(position, Ordering::SeqCst);
            }
            None => {
                let head = self.log.head_position();
                ensure!(
                    head == 0,
                    Error::CorruptSnapshot(format!(
                        "no valid snapshot while the log is truncated before {head} (partition_id={})",
                        self.log.partition_id()
                    ))
                );
            }
        }
        Ok(recovered)
    }
}

fn recover_latest(storage: &SnapshotStorage, composed: &ComposedSnapshot) -> Result<Option<Position>> {
    for position in storage.list()?.into_iter().rev() {
        let mut f = storage.open_snapshot(position)?;
        match composed.read_snapshot(&mut f) {
            Ok(()) => {
                info!("recovered from snapshot at {position}");
                return Ok(Some(position));
            }
            Err(e) if matches!(e.downcast_ref::<Error>(), Some(Error::CorruptSnapshot(_))) => {
                warn!("skipped corrupt snapshot at {position}: {e:#}");
            }
            Err(e) => return Err(e),
        }
    }
    composed.reset();
    Ok(None)
}
