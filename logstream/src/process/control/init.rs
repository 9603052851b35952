use super::*;

impl Control {
    /// Restore the ballot and the membership from the storage.
    pub async fn init(&mut self, actor: Weak<RwLock<Control>>) -> Result<()> {
        self.actor = actor;
        self.ballot = self.ballot_store.load_ballot().await?;

        let committed = self.ballot_store.load_configuration().await?;
        let from = match &committed {
            Some(c) => c.position + 1,
            None => 0,
        };
        if let Some(c) = committed {
            info!(
                "restored membership at {} -> {:?}",
                c.position,
                c.members.iter().map(|m| m.endpoint.to_string()).collect::<Vec<_>>()
            );
            self.membership.publish(c);
        }

        // Configuration entries after the committed one are not known to be committed.
        let mut cur = Position::max(from, self.log.head_position());
        loop {
            let entries = self.log.read_from(cur, self.config.max_entries_per_append)?;
            let Some(last) = entries.last() else {
                break;
            };
            cur = last.next_position();
            for e in &entries {
                if e.kind == EntryKind::Configuration {
                    self.pending_configurations
                        .insert(e.position, Arc::new(e.members()?));
                }
            }
        }

        info!(
            "restored control (term={}, head={}, last={})",
            self.ballot.cur_term,
            self.log.head_position(),
            self.log.last_position(),
        );
        Ok(())
    }
}
