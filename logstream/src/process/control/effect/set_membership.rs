use super::*;

pub struct Effect<'a> {
    pub ctrl: &'a mut Control,
}

impl Effect<'_> {
    /// Persist and publish a committed configuration.
    pub async fn exec(self, config: Configuration) -> Result<()> {
        if config.position < self.ctrl.membership.current().position {
            return Ok(());
        }
        self.ctrl.ballot_store.save_configuration(&config).await?;

        info!(
            "membership changed at {} -> {:?}",
            config.position,
            config
                .members
                .iter()
                .map(|m| m.endpoint.to_string())
                .collect::<Vec<_>>()
        );
        self.ctrl.membership.publish(config);

        if self.ctrl.is_leader() {
            if self.ctrl.membership.contains(self.ctrl.io.self_endpoint()) {
                self.ctrl.sync_peers();
            } else {
                try_stepdown::Effect { ctrl: self.ctrl }.exec()?;
            }
        }
        Ok(())
    }
}
