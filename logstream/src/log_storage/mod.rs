use super::*;

use crossbeam::channel::TryRecvError;
use std::collections::HashMap;
use std::sync::Weak;

mod completion;
mod entry;
mod reaper;
mod stream;

pub use entry::{EntryKind, EventSource, LogEntry};
pub use stream::LogStream;

use completion::CommitCompletion;
use reaper::{LazyInsert, Reaper};

/// Holds the log streams of all partitions in one redb database.
/// Appends of all streams are written in batches by a dedicated thread.
/// A partition has at most one open stream at a time.
pub struct LogStorage {
    db: Arc<redb::Database>,
    tx: crossbeam::channel::Sender<LazyInsert>,
    kill_switch: Arc<crossbeam::channel::Sender<()>>,
    stream_capacity: Option<u64>,
    open_streams: spin::Mutex<HashMap<PartitionId, Weak<stream::Inner>>>,
}

impl LogStorage {
    pub fn new(db: Arc<redb::Database>) -> Self {
        let (reaper, tx) = Reaper::new(db.clone());
        let (kill_tx, kill_rx) = crossbeam::channel::bounded::<()>(0);
        std::thread::spawn(move || loop {
            if let Err(TryRecvError::Disconnected) = kill_rx.try_recv() {
                break;
            }
            reaper.reap().ok();
        });

        Self {
            db,
            tx,
            kill_switch: Arc::new(kill_tx),
            stream_capacity: None,
            open_streams: spin::Mutex::new(HashMap::new()),
        }
    }

    /// Database on memory. Nothing survives the process.
    pub fn in_memory() -> Result<Self> {
        let mem = redb::backends::InMemoryBackend::new();
        let db = redb::Database::builder().create_with_backend(mem)?;
        Ok(Self::new(Arc::new(db)))
    }

    /// Limit the number of bytes a stream can hold. Appends beyond it fail with `StorageFull`.
    pub fn with_stream_capacity(mut self, bytes: u64) -> Self {
        self.stream_capacity = Some(bytes);
        self
    }

    pub fn db(&self) -> Arc<redb::Database> {
        self.db.clone()
    }

    /// Open the stream of a partition. The tail is recovered from the stored entries.
    /// Fails while another `LogStream` of the partition is alive: its pending writes
    /// would move the tail behind the back of the new one.
    pub fn open_stream(&self, partition_id: PartitionId) -> Result<LogStream> {
        let mut open_streams = self.open_streams.lock();
        open_streams.retain(|_, s| s.strong_count() > 0);
        ensure!(
            !open_streams.contains_key(&partition_id),
            Error::Storage(format!(
                "log stream of partition {partition_id} is already open"
            ))
        );
        let log = LogStream::open(
            self.db.clone(),
            partition_id,
            self.tx.clone(),
            self.kill_switch.clone(),
            self.stream_capacity,
        )?;
        open_streams.insert(partition_id, Arc::downgrade(&log.0));
        Ok(log)
    }

    /// True while a `LogStream` of the partition is alive.
    pub fn is_open(&self, partition_id: PartitionId) -> bool {
        self.open_streams
            .lock()
            .get(&partition_id)
            .is_some_and(|s| s.strong_count() > 0)
    }
}

fn table_def(space: &str) -> redb::TableDefinition<'_, i64, Vec<u8>> {
    redb::TableDefinition::new(space)
}
