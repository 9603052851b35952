use super::*;

#[derive(Clone, Copy, Debug)]
pub struct ReplicationProgress {
    /// Entries up to `match_position` are known to be stored on the follower.
    pub match_position: Position,
    /// The next append request starts from this position.
    pub next_position: Position,
}

impl ReplicationProgress {
    pub fn new(init_next_position: Position) -> Self {
        Self {
            match_position: NULL_POSITION,
            next_position: init_next_position,
        }
    }
}
