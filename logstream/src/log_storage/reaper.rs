use super::*;

use std::collections::BTreeMap;

pub struct LazyInsert {
    pub space: String,
    pub position: Position,
    pub data: Vec<u8>,
    pub notifier: oneshot::Sender<()>,
}

/// Batches the pending inserts of all streams into a single write transaction.
pub struct Reaper {
    db: Arc<redb::Database>,
    rx: crossbeam::channel::Receiver<LazyInsert>,
}

impl Reaper {
    pub fn new(db: Arc<redb::Database>) -> (Self, crossbeam::channel::Sender<LazyInsert>) {
        let (tx, rx) = crossbeam::channel::unbounded();
        let this = Self { db, rx };
        (this, tx)
    }

    pub fn reap(&self) -> Result<()> {
        let mut elems = vec![];

        // Blocked until the first element is received.
        let head = self.rx.recv_timeout(Duration::from_millis(100))?;
        elems.push(head);

        let n = self.rx.len();
        for _ in 0..n {
            match self.rx.try_recv() {
                Ok(e) => elems.push(e),
                Err(_) => break,
            }
        }

        let mut spaces: BTreeMap<String, Vec<LazyInsert>> = BTreeMap::new();
        for e in elems {
            spaces.entry(e.space.clone()).or_default().push(e);
        }

        let mut notifiers = vec![];

        let tx = self.db.begin_write()?;
        for (space, mut elems_in_space) in spaces {
            elems_in_space.sort_unstable_by_key(|e| e.position);
            let mut tbl = tx.open_table(table_def(&space))?;
            for e in elems_in_space {
                tbl.insert(e.position, e.data)?;
                notifiers.push(e.notifier);
            }
        }
        if let Err(e) = tx.commit() {
            // Dropping the notifiers tells the appenders that the write failed.
            error!("failed to commit a batch of {} entries: {e}", notifiers.len());
            return Err(e.into());
        }

        for notifier in notifiers {
            notifier.send(()).ok();
        }
        Ok(())
    }
}
