use anyhow::{ensure, Result};
use bytes::Bytes;
use logstream::log_storage::{EntryKind, LogStream};
use logstream::snapshot::SnapshotSupport;
use logstream::Position;
use std::collections::BTreeMap;

pub fn payload(i: u64) -> Bytes {
    Bytes::from(format!("event-{i}"))
}

/// Materialized state for the tests: the number of events per key.
pub struct Counter {
    inner: spin::Mutex<CounterInner>,
}

struct CounterInner {
    counts: BTreeMap<u64, u64>,
    processed: Position,
}

impl Default for Counter {
    fn default() -> Self {
        Self::new()
    }
}

impl Counter {
    pub fn new() -> Self {
        Self {
            inner: spin::Mutex::new(CounterInner {
                counts: BTreeMap::new(),
                processed: -1,
            }),
        }
    }

    /// Apply the committed events after the last processed position.
    pub fn catch_up(&self, log: &LogStream) -> Result<()> {
        loop {
            let from = self.processed();
            let entries = log.read_committed_after(from, 100)?;
            if entries.is_empty() {
                return Ok(());
            }
            let mut inner = self.inner.lock();
            for e in entries {
                if e.kind == EntryKind::Event {
                    *inner.counts.entry(e.key).or_default() += 1;
                }
                inner.processed = e.position;
            }
        }
    }

    pub fn processed(&self) -> Position {
        self.inner.lock().processed
    }

    pub fn count(&self, key: u64) -> u64 {
        self.inner.lock().counts.get(&key).copied().unwrap_or(0)
    }

    pub fn counts(&self) -> BTreeMap<u64, u64> {
        self.inner.lock().counts.clone()
    }
}

impl SnapshotSupport for Counter {
    fn name(&self) -> &str {
        "counter"
    }

    fn write_snapshot(&self, out: &mut Vec<u8>) -> Result<()> {
        let inner = self.inner.lock();
        out.extend_from_slice(&inner.processed.to_le_bytes());
        for (k, v) in &inner.counts {
            out.extend_from_slice(&k.to_le_bytes());
            out.extend_from_slice(&v.to_le_bytes());
        }
        Ok(())
    }

    fn recover_from_snapshot(&self, data: &[u8]) -> Result<()> {
        ensure!(data.len() >= 8 && (data.len() - 8) % 16 == 0);
        let word = |i: usize| {
            let mut b = [0; 8];
            b.copy_from_slice(&data[i..i + 8]);
            b
        };
        let mut inner = self.inner.lock();
        inner.processed = i64::from_le_bytes(word(0));
        inner.counts.clear();
        for i in (8..data.len()).step_by(16) {
            inner
                .counts
                .insert(u64::from_le_bytes(word(i)), u64::from_le_bytes(word(i + 8)));
        }
        Ok(())
    }

    fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.counts.clear();
        inner.processed = -1;
    }
}
