use super::*;

pub struct Outcome {
    pub term: Term,
    pub succeeded: bool,
    pub position: Position,
    pub entry_term: Term,
    pub members: Vec<Member>,
}

pub struct Effect<'a> {
    pub ctrl: &'a mut Control,
}

impl Effect<'_> {
    fn rejected(&self, reason: Error) -> Outcome {
        info!("membership change is rejected: {reason}");
        Outcome {
            term: self.ctrl.read_ballot().cur_term,
            succeeded: false,
            position: NULL_POSITION,
            entry_term: NULL_TERM,
            members: self.ctrl.membership.members(),
        }
    }

    /// Append a configuration entry adding or removing one member.
    /// Only one change can be in flight: it is rejected until the previous one is committed.
    pub async fn exec(self, sender_term: Term, change: MembershipChange) -> Result<Outcome> {
        let cur_term = self.ctrl.read_ballot().cur_term;
        if sender_term < cur_term {
            return Ok(self.rejected(Error::ConsensusRejection { term: cur_term }));
        }
        self.ctrl.observe_term(sender_term).await?;

        if !self.ctrl.is_leader() {
            return Ok(self.rejected(Error::NotLeader {
                leader: self.ctrl.leader(),
            }));
        }
        if !self.ctrl.allow_configuration_change() {
            return Ok(self.rejected(Error::ConfigurationChangeInProgress));
        }

        let committed = self.ctrl.membership.current();
        let mut members = committed.members.clone();
        let changed = match &change {
            MembershipChange::Add(m) => {
                if members.contains(m) {
                    false
                } else {
                    members.push(m.clone());
                    true
                }
            }
            MembershipChange::Remove(m) => {
                let n = members.len();
                members.retain(|x| x != m);
                members.len() != n
            }
        };

        if !changed {
            // Already in effect. Answer as if it was accepted for retries.
            let entry_term = self
                .ctrl
                .log
                .read(committed.position)
                .map(|e| e.term)
                .unwrap_or(NULL_TERM);
            return Ok(Outcome {
                term: cur_term,
                succeeded: true,
                position: committed.position,
                entry_term,
                members,
            });
        }
        if members.is_empty() {
            return Ok(self.rejected(Error::Validation(
                "the last member can't leave".to_owned(),
            )));
        }

        let entry = LogEntry::configuration(&members)?.at(NULL_POSITION, cur_term);
        let position = match self.ctrl.log.append(entry).await {
            Ok(position) => position,
            Err(e) => {
                self.ctrl.on_storage_failure();
                return Err(e);
            }
        };
        info!(
            "configuration entry is queued at {position} -> {:?}",
            members
                .iter()
                .map(|m| m.endpoint.to_string())
                .collect::<Vec<_>>()
        );

        self.ctrl
            .pending_configurations
            .insert(position, Arc::new(members.clone()));
        // $4.1
        // The new configuration takes effect on the replication as soon as it is appended.
        self.ctrl.sync_peers();
        self.ctrl.replication_evt_tx.push_event(ReplicationEvent);

        Ok(Outcome {
            term: cur_term,
            succeeded: true,
            position,
            entry_term: cur_term,
            members,
        })
    }
}
