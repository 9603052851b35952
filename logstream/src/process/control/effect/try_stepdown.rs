use super::*;

pub struct Effect<'a> {
    pub ctrl: &'a mut Control,
}

impl Effect<'_> {
    /// If the committed membership doesn't contain itself, the leader steps down.
    /// The remaining members elect a new leader once they time out.
    pub fn exec(self) -> Result<()> {
        ensure!(self.ctrl.is_leader());
        ensure!(!self.ctrl.membership.contains(self.ctrl.io.self_endpoint()));

        info!("removed from the membership. step down");
        self.ctrl.leader = None;
        self.ctrl.write_election_state(ElectionState::Follower);
        self.ctrl.sync_peers();
        Ok(())
    }
}
