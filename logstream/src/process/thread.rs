use super::*;

use std::marker::PhantomData;
use tokio::sync::Notify;
use tokio::task::AbortHandle;

/// Wrapper around a `AbortHandle` that aborts it is dropped.
pub struct ThreadHandle(pub AbortHandle);

impl Drop for ThreadHandle {
    fn drop(&mut self) {
        self.0.abort();
    }
}

#[derive(Clone)]
pub struct EventProducer<T> {
    inner: Arc<Notify>,
    phantom: PhantomData<T>,
}

impl<T> EventProducer<T> {
    pub fn push_event(&self, _: T) {
        // Wake every waiter and leave a permit for the one arriving late.
        self.inner.notify_waiters();
        self.inner.notify_one();
    }
}

#[derive(Clone)]
pub struct EventConsumer<T> {
    inner: Arc<Notify>,
    phantom: PhantomData<T>,
}

impl<T> EventConsumer<T> {
    /// Return if events are produced or timeout.
    pub async fn consume_events(&self, timeout: Duration) {
        tokio::time::timeout(timeout, self.inner.notified())
            .await
            .ok();
    }
}

pub fn notify<T>() -> (EventProducer<T>, EventConsumer<T>) {
    let inner = Arc::new(Notify::new());
    (
        EventProducer {
            inner: inner.clone(),
            phantom: PhantomData,
        },
        EventConsumer {
            inner,
            phantom: PhantomData,
        },
    )
}

/// New entries are appended to the leader's log.
#[derive(Clone)]
pub struct QueueEvent;

/// Some follower made progress in replication.
#[derive(Clone)]
pub struct ReplicationEvent;
