use super::*;

pub struct Effect<'a> {
    pub ctrl: &'a mut Control,
}

impl Effect<'_> {
    /// Move the commit position to the highest position stored on a quorum.
    pub async fn exec(self) -> Result<()> {
        ensure!(self.ctrl.is_leader());

        let Some(new_commit) = self.ctrl.find_new_commit_position() else {
            return Ok(());
        };
        if new_commit <= self.ctrl.log.commit_position() {
            return Ok(());
        }

        // $5.4.2
        // Only entries of the current term are committed by counting replicas.
        let e = self.ctrl.log.read(new_commit)?;
        if e.term != self.ctrl.read_ballot().cur_term {
            return Ok(());
        }

        self.ctrl.log.set_commit_position(new_commit)?;
        debug!("commit position -> {new_commit}");
        self.ctrl.on_commit_advanced(new_commit).await?;
        Ok(())
    }
}
