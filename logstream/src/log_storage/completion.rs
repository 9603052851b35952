use super::*;

use tokio::sync::oneshot;

/// Completed when the awaited position is committed. Dropping it tells the waiter
/// that the entry was discarded.
pub struct CommitCompletion(oneshot::Sender<Position>);

impl CommitCompletion {
    pub fn complete_with(self, commit_position: Position) {
        self.0.send(commit_position).ok();
    }
}

pub fn prepare_commit_completion() -> (CommitCompletion, oneshot::Receiver<Position>) {
    let (tx, rx) = oneshot::channel::<Position>();
    (CommitCompletion(tx), rx)
}
