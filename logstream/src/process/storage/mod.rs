use super::*;

use crate::log_storage::LogStorage;
use redb::{Database, ReadableTable, TableDefinition};

mod ballot;
pub use ballot::BallotStore;

/// `RaftStorage` is a storage backend for `RaftProcess` based on redb.
/// The log streams and the election state of all partitions share one database.
pub struct RaftStorage {
    db: Arc<Database>,
    log_storage: LogStorage,
}

impl RaftStorage {
    pub fn new(redb: Database) -> Self {
        let db = Arc::new(redb);
        let log_storage = LogStorage::new(db.clone());
        Self { db, log_storage }
    }

    /// Database on memory. Nothing survives the process.
    pub fn in_memory() -> Result<Self> {
        let mem = redb::backends::InMemoryBackend::new();
        let db = Database::builder().create_with_backend(mem)?;
        Ok(Self::new(db))
    }

    /// Limit the number of bytes each log stream can hold.
    pub fn with_stream_capacity(mut self, bytes: u64) -> Self {
        self.log_storage = self.log_storage.with_stream_capacity(bytes);
        self
    }

    pub fn log_storage(&self) -> &LogStorage {
        &self.log_storage
    }

    pub(super) fn get(&self, partition_id: PartitionId) -> Result<(LogStream, BallotStore)> {
        let log = self.log_storage.open_stream(partition_id)?;
        let ballot = BallotStore::new(self.db.clone(), partition_id)?;
        Ok((log, ballot))
    }
}
