use super::*;

use crate::log_storage::LogStream;
use crate::process::ThreadHandle;
use crate::snapshot::SnapshotController;
use std::sync::atomic::{AtomicBool, Ordering};

type ProcessedPosition = Arc<dyn Fn() -> Position + Send + Sync>;

struct Snapshots {
    controller: Arc<SnapshotController>,
    interval: Duration,
    processed_position: ProcessedPosition,
}

/// Exposes the log stream of a partition to upstream consumers.
/// While running, the materialized state is snapshotted periodically if snapshots are set up.
pub struct LogStreamService {
    log_stream: LogStream,
    snapshots: Option<Snapshots>,
    running: AtomicBool,
    snapshot_handle: spin::Mutex<Option<ThreadHandle>>,
}

impl LogStreamService {
    pub fn new(log_stream: LogStream) -> Self {
        Self {
            log_stream,
            snapshots: None,
            running: AtomicBool::new(false),
            snapshot_handle: spin::Mutex::new(None),
        }
    }

    /// Snapshot the state up to `processed_position()` every `interval` while running.
    pub fn with_snapshots(
        mut self,
        controller: Arc<SnapshotController>,
        interval: Duration,
        processed_position: impl Fn() -> Position + Send + Sync + 'static,
    ) -> Self {
        self.snapshots = Some(Snapshots {
            controller,
            interval,
            processed_position: Arc::new(processed_position),
        });
        self
    }

    /// Starting a running service does nothing.
    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(s) = &self.snapshots {
            let f = s.processed_position.clone();
            let hdl = snapshot::thread::run(s.controller.clone(), s.interval, move || f());
            *self.snapshot_handle.lock() = Some(hdl);
        }
        info!(
            "log stream service started (partition_id={})",
            self.log_stream.partition_id()
        );
    }

    pub fn stop(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            self.snapshot_handle.lock().take();
            info!(
                "log stream service stopped (partition_id={})",
                self.log_stream.partition_id()
            );
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn get(&self) -> &LogStream {
        &self.log_stream
    }
}
