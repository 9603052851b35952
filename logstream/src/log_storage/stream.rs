use super::*;

use redb::ReadableTable;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

pub struct Inner {
    partition_id: PartitionId,
    db: Arc<redb::Database>,
    space: String,
    reaper_queue: crossbeam::channel::Sender<LazyInsert>,
    _kill_switch: Arc<crossbeam::channel::Sender<()>>,
    capacity: Option<u64>,

    /// Serializes the mutations of the tail.
    /// Holds the position where the next entry is appended.
    append_lock: tokio::sync::Mutex<Position>,
    append_position: AtomicI64,
    last_position: AtomicI64,
    head_position: AtomicI64,
    commit_position: AtomicI64,
    snapshot_position: AtomicI64,
    failed: AtomicBool,

    commit_completions: spin::Mutex<BTreeMap<Position, Vec<CommitCompletion>>>,
}

/// Append-only sequence of entries of a partition, addressed by byte position.
/// The first entry is at position 0 and every entry starts right after the previous one.
#[derive(shrinkwraprs::Shrinkwrap, Clone)]
pub struct LogStream(pub Arc<Inner>);

#[cfg(test)]
impl std::fmt::Debug for LogStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogStream").field("partition_id", &self.0.partition_id).finish_non_exhaustive()
    }
}

impl LogStream {
    pub(super) fn open(
        db: Arc<redb::Database>,
        partition_id: PartitionId,
        reaper_queue: crossbeam::channel::Sender<LazyInsert>,
        kill_switch: Arc<crossbeam::channel::Sender<()>>,
        capacity: Option<u64>,
    ) -> Result<Self> {
        let space = format!("log.{partition_id}");

        let tx = db.begin_write()?;
        {
            let _ = tx.open_table(table_def(&space))?;
        }
        tx.commit()?;

        let (head, last) = {
            let tx = db.begin_read()?;
            let tbl = tx.open_table(table_def(&space))?;
            let head = tbl.first()?.map(|(k, _)| k.value());
            let last = match tbl.last()? {
                Some((k, v)) => Some(LogEntry::from_bytes(k.value(), &v.value())?),
                None => None,
            };
            (head, last)
        };

        let append_position = last.as_ref().map(|e| e.next_position()).unwrap_or(0);
        let last_position = last.as_ref().map(|e| e.position).unwrap_or(NULL_POSITION);
        let head_position = head.unwrap_or(append_position);
        debug!(
            "opened log stream (partition_id={partition_id}, head={head_position}, last={last_position})"
        );

        let inner = Inner {
            partition_id,
            db,
            space,
            reaper_queue,
            _kill_switch: kill_switch,
            capacity,
            append_lock: tokio::sync::Mutex::new(append_position),
            append_position: AtomicI64::new(append_position),
            last_position: AtomicI64::new(last_position),
            head_position: AtomicI64::new(head_position),
            commit_position: AtomicI64::new(NULL_POSITION),
            snapshot_position: AtomicI64::new(NULL_POSITION),
            failed: AtomicBool::new(false),
            commit_completions: spin::Mutex::new(BTreeMap::new()),
        };
        Ok(Self(Arc::new(inner)))
    }
}

impl Inner {
    pub fn partition_id(&self) -> PartitionId {
        self.partition_id
    }

    /// Position where the next entry will be appended.
    pub fn current_append_position(&self) -> Position {
        self.append_position.load(Ordering::SeqCst)
    }

    /// Position of the last entry or -1 if the stream is empty.
    pub fn last_position(&self) -> Position {
        self.last_position.load(Ordering::SeqCst)
    }

    /// Position of the first retained entry.
    pub fn head_position(&self) -> Position {
        self.head_position.load(Ordering::SeqCst)
    }

    pub fn commit_position(&self) -> Position {
        self.commit_position.load(Ordering::SeqCst)
    }

    pub fn snapshot_position(&self) -> Position {
        self.snapshot_position.load(Ordering::SeqCst)
    }

    /// A failed stream refuses any further writes.
    pub fn is_failed(&self) -> bool {
        self.failed.load(Ordering::SeqCst)
    }

    fn mark_failed(&self, e: &Error) {
        if !self.failed.swap(true, Ordering::SeqCst) {
            error!(
                "log stream failed (partition_id={}): {e}",
                self.partition_id
            );
        }
    }

    fn ensure_writable(&self) -> Result<()> {
        ensure!(
            !self.is_failed(),
            Error::Storage(format!(
                "log stream has failed (partition_id={})",
                self.partition_id
            ))
        );
        Ok(())
    }

    /// Append an entry at the tail and return its position.
    /// The position of the given entry is ignored. The term is kept as is.
    pub async fn append(&self, entry: LogEntry) -> Result<Position> {
        self.ensure_writable()?;
        let mut tail = self.append_lock.lock().await;
        let term = entry.term;
        let entry = entry.at(*tail, term);
        self.check_capacity(&entry)?;
        self.write_entry(&entry).await?;
        *tail = entry.next_position();
        self.advance_tail(&entry);
        Ok(entry.position)
    }

    /// Append an entry whose position is already decided.
    /// The position must be the current append position.
    pub async fn append_at(&self, entry: LogEntry) -> Result<()> {
        self.ensure_writable()?;
        let mut tail = self.append_lock.lock().await;
        ensure!(
            entry.position == *tail,
            Error::InvalidArgument(format!(
                "entry at {} can't be appended at {}",
                entry.position, *tail
            ))
        );
        self.check_capacity(&entry)?;
        self.write_entry(&entry).await?;
        *tail = entry.next_position();
        self.advance_tail(&entry);
        Ok(())
    }

    fn check_capacity(&self, entry: &LogEntry) -> Result<()> {
        if let Some(capacity) = self.capacity {
            let used = (entry.position - self.head_position()) as u64;
            ensure!(
                used + entry.encoded_length() as u64 <= capacity,
                Error::StorageFull
            );
        }
        Ok(())
    }

    async fn write_entry(&self, entry: &LogEntry) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        let e = LazyInsert {
            space: self.space.clone(),
            position: entry.position,
            data: entry.to_bytes(),
            notifier: tx,
        };
        let res = match self.reaper_queue.send(e) {
            Ok(()) => rx.await.map_err(|_| {
                Error::Storage(format!("failed to write entry at {}", entry.position))
            }),
            Err(_) => Err(Error::Storage("log writer has stopped".to_owned())),
        };
        if let Err(e) = res {
            self.mark_failed(&e);
            bail!(e);
        }
        Ok(())
    }

    fn advance_tail(&self, entry: &LogEntry) {
        self.last_position.store(entry.position, Ordering::SeqCst);
        self.append_position
            .store(entry.next_position(), Ordering::SeqCst);
        if self.head_position() > entry.position {
            self.head_position.store(entry.position, Ordering::SeqCst);
        }
    }

    pub fn read(&self, position: Position) -> Result<LogEntry> {
        let tx = self.db.begin_read().map_err(storage_error)?;
        let tbl = tx
            .open_table(table_def(&self.space))
            .map_err(storage_error)?;
        match tbl.get(position).map_err(storage_error)? {
            Some(bin) => LogEntry::from_bytes(position, &bin.value()),
            None => bail!(Error::NotFound(position)),
        }
    }

    /// Read an entry only if it is committed.
    pub fn read_committed(&self, position: Position) -> Result<LogEntry> {
        ensure!(position <= self.commit_position(), Error::NotFound(position));
        self.read(position)
    }

    /// Read at most `max` entries starting at or after `position`.
    pub fn read_from(&self, position: Position, max: usize) -> Result<Vec<LogEntry>> {
        let tx = self.db.begin_read().map_err(storage_error)?;
        let tbl = tx
            .open_table(table_def(&self.space))
            .map_err(storage_error)?;
        let mut out = vec![];
        for kv in tbl.range(position..).map_err(storage_error)?.take(max) {
            let (k, v) = kv.map_err(storage_error)?;
            out.push(LogEntry::from_bytes(k.value(), &v.value())?);
        }
        Ok(out)
    }

    /// Read the entries starting at or after `position` while they total at most
    /// `max_bytes` in encoded length, up to `max` of them.
    /// The first entry is returned even if it alone is larger.
    pub fn read_batch(&self, position: Position, max: usize, max_bytes: usize) -> Result<Vec<LogEntry>> {
        let tx = self.db.begin_read().map_err(storage_error)?;
        let tbl = tx
            .open_table(table_def(&self.space))
            .map_err(storage_error)?;
        let mut out = vec![];
        let mut total = 0;
        for kv in tbl.range(position..).map_err(storage_error)?.take(max) {
            let (k, v) = kv.map_err(storage_error)?;
            let e = LogEntry::from_bytes(k.value(), &v.value())?;
            total += e.encoded_length();
            if total > max_bytes && !out.is_empty() {
                break;
            }
            out.push(e);
        }
        Ok(out)
    }

    /// Read at most `max` committed entries after `position`.
    pub fn read_committed_after(&self, position: Position, max: usize) -> Result<Vec<LogEntry>> {
        let commit = self.commit_position();
        let mut out = self.read_from(position + 1, max)?;
        out.retain(|e| e.position <= commit);
        Ok(out)
    }

    /// The last entry before `position`.
    pub fn previous_entry(&self, position: Position) -> Result<Option<LogEntry>> {
        let tx = self.db.begin_read().map_err(storage_error)?;
        let tbl = tx
            .open_table(table_def(&self.space))
            .map_err(storage_error)?;
        let mut range = tbl.range(..position).map_err(storage_error)?;
        match range.next_back() {
            Some(kv) => {
                let (k, v) = kv.map_err(storage_error)?;
                Ok(Some(LogEntry::from_bytes(k.value(), &v.value())?))
            }
            None => Ok(None),
        }
    }

    pub fn last_entry(&self) -> Result<Option<LogEntry>> {
        match self.last_position() {
            NULL_POSITION => Ok(None),
            p => Ok(Some(self.read(p)?)),
        }
    }

    /// Move the commit position forward. It never moves back nor beyond the last entry.
    pub fn set_commit_position(&self, position: Position) -> Result<()> {
        let last = self.last_position();
        ensure!(
            position <= last,
            Error::InvalidArgument(format!(
                "commit position {position} is beyond the last entry at {last}"
            ))
        );
        let cur = self.commit_position();
        ensure!(
            position >= cur,
            Error::InvalidArgument(format!(
                "commit position can't go back from {cur} to {position}"
            ))
        );
        if self
            .commit_position
            .compare_exchange(cur, position, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            bail!(Error::InvalidArgument(format!(
                "commit position is concurrently moved from {cur}"
            )));
        }
        self.complete_commit_waiters(position);
        Ok(())
    }

    fn complete_commit_waiters(&self, commit_position: Position) {
        let completed = {
            let mut completions = self.commit_completions.lock();
            let rest = completions.split_off(&(commit_position + 1));
            std::mem::replace(&mut *completions, rest)
        };
        for (_, cs) in completed {
            for c in cs {
                c.complete_with(commit_position);
            }
        }
    }

    /// Resolves with the commit position once `position` is committed.
    /// Fails if the entry is discarded by truncation before it is committed.
    pub fn wait_for_commit(
        &self,
        position: Position,
    ) -> impl Future<Output = Result<Position>> + Send + 'static {
        let (ready, rx) = {
            let mut completions = self.commit_completions.lock();
            let commit = self.commit_position();
            if commit >= position {
                (Some(commit), None)
            } else {
                let (c, rx) = completion::prepare_commit_completion();
                completions.entry(position).or_default().push(c);
                (None, Some(rx))
            }
        };
        async move {
            if let Some(commit) = ready {
                return Ok(commit);
            }
            match rx {
                Some(rx) => rx
                    .await
                    .map_err(|_| anyhow::Error::new(Error::NotFound(position)))
                    .context("entry was discarded before commit"),
                None => Ok(position),
            }
        }
    }

    /// Record that the materialized state up to `position` is saved in a snapshot.
    pub fn set_snapshot_position(&self, position: Position) -> Result<()> {
        ensure!(
            position <= self.commit_position(),
            Error::InvalidArgument(format!(
                "snapshot position {position} is beyond the commit position {}",
                self.commit_position()
            ))
        );
        self.snapshot_position.fetch_max(position, Ordering::SeqCst);
        Ok(())
    }

    /// Delete the entries before `position`. Only entries covered by a snapshot can be deleted.
    pub async fn truncate_before(&self, position: Position) -> Result<()> {
        ensure!(
            position <= self.snapshot_position(),
            Error::InvalidArgument(format!(
                "can't truncate before {position} which is beyond the snapshot position {}",
                self.snapshot_position()
            ))
        );
        let tail = self.append_lock.lock().await;

        let tx = self.db.begin_write().map_err(storage_error)?;
        {
            let mut tbl = tx
                .open_table(table_def(&self.space))
                .map_err(storage_error)?;
            tbl.retain_in(..position, |_, _| false)
                .map_err(storage_error)?;
        }
        tx.commit().map_err(storage_error)?;

        let head = match self.read_from(position, 1)?.first() {
            Some(e) => e.position,
            None => *tail,
        };
        self.head_position.store(head, Ordering::SeqCst);
        debug!(
            "truncated log before {position} (partition_id={})",
            self.partition_id
        );
        Ok(())
    }

    /// Delete the entry at `position` and everything after. Committed entries can't be deleted.
    pub async fn truncate_from(&self, position: Position) -> Result<()> {
        self.ensure_writable()?;
        let mut tail = self.append_lock.lock().await;
        ensure!(
            position > self.commit_position(),
            Error::InvalidArgument(format!(
                "can't truncate from {position} which is committed (commit={})",
                self.commit_position()
            ))
        );
        if position == *tail {
            return Ok(());
        }
        ensure!(
            position < *tail && self.read(position).is_ok(),
            Error::InvalidArgument(format!("no entry starts at {position}"))
        );

        let tx = self.db.begin_write().map_err(storage_error)?;
        {
            let mut tbl = tx
                .open_table(table_def(&self.space))
                .map_err(storage_error)?;
            tbl.retain_in(position.., |_, _| false)
                .map_err(storage_error)?;
        }
        tx.commit().map_err(storage_error)?;

        let prev = self.previous_entry(position)?;
        *tail = position;
        self.append_position.store(position, Ordering::SeqCst);
        self.last_position.store(
            prev.map(|e| e.position).unwrap_or(NULL_POSITION),
            Ordering::SeqCst,
        );
        if self.head_position() > position {
            self.head_position.store(position, Ordering::SeqCst);
        }

        // The waiters of the discarded entries are notified by dropping their completions.
        let discarded = self.commit_completions.lock().split_off(&position);
        drop(discarded);

        warn!(
            "truncated log from {position} (partition_id={})",
            self.partition_id
        );
        Ok(())
    }
}
