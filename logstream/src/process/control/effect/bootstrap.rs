use super::*;

pub struct Effect<'a> {
    pub ctrl: &'a mut Control,
}

impl Effect<'_> {
    /// Commit the single-member configuration of this process at the head of the empty log.
    pub async fn exec(self) -> Result<()> {
        ensure!(
            self.ctrl.membership.is_empty()
                && self.ctrl.pending_configurations.is_empty()
                && self.ctrl.log.last_position() == NULL_POSITION,
            Error::InvalidArgument(format!(
                "partition {} is already initialized",
                self.ctrl.io.partition_id()
            ))
        );

        let members = vec![Member::new(self.ctrl.self_endpoint())];
        let term = self.ctrl.read_ballot().cur_term;
        let position = self
            .ctrl
            .log
            .append(LogEntry::configuration(&members)?.at(NULL_POSITION, term))
            .await?;
        // Nobody else has to agree on the first configuration.
        self.ctrl.log.set_commit_position(position)?;

        set_membership::Effect { ctrl: &mut *self.ctrl }
            .exec(Configuration { position, members })
            .await?;
        info!("bootstrapped partition {}", self.ctrl.io.partition_id());
        Ok(())
    }
}
