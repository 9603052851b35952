use super::*;

pub struct Effect<'a> {
    pub ctrl: &'a mut Control,
}

impl Effect<'_> {
    fn response(&self, id: PartitionId, succeeded: bool, entry_position: Position) -> AppendResponse {
        AppendResponse {
            id,
            term: self.ctrl.read_ballot().cur_term,
            succeeded,
            entry_position,
            append_position: self.ctrl.log.current_append_position(),
        }
    }

    pub async fn exec(self, req: AppendRequest) -> Result<AppendResponse> {
        let cur_term = self.ctrl.read_ballot().cur_term;
        if req.term < cur_term {
            debug!("append request from {} has older term {}", req.leader, req.term);
            return Ok(self.response(req.id, false, NULL_POSITION));
        }

        self.ctrl.observe_term(req.term).await?;
        if self.ctrl.state != ElectionState::Follower {
            // Another candidate won the election at this term.
            self.ctrl.write_election_state(ElectionState::Follower);
            self.ctrl.sync_peers();
        }
        if self.ctrl.leader.as_ref() != Some(&req.leader) {
            info!("learn {} as the leader at term {}", req.leader, req.term);
            self.ctrl.leader = Some(req.leader.clone());
        }
        self.ctrl.reset_election_timer();

        let log = self.ctrl.log.clone();
        let head = log.head_position();

        // Entries before the head are compacted, which means they are committed
        // and identical to the leader's.
        let prev_position = req.previous_entry_position;
        if prev_position != NULL_POSITION && prev_position >= head {
            let matched = match log.read(prev_position) {
                Ok(e) => e.term == req.previous_entry_term,
                Err(_) => false,
            };
            if !matched {
                debug!("previous entry at {prev_position} doesn't match");
                return Ok(self.response(req.id, false, NULL_POSITION));
            }
        }

        let mut last_matched = prev_position;
        for e in req.entries {
            let position = e.position;
            if position < head || position <= log.commit_position() {
                last_matched = position;
                continue;
            }
            if position < log.current_append_position() {
                let same = match log.read(position) {
                    Ok(mine) => mine.term == e.term,
                    Err(_) => false,
                };
                if same {
                    last_matched = position;
                    continue;
                }
                // $5.3
                // If an existing entry conflicts with a new one (same position but different terms),
                // delete the existing entry and all that follow it.
                warn!("log conflicts at {position}. truncate the following entries");
                log.truncate_from(position).await?;
                self.ctrl.forget_configurations_from(position);
            }
            if e.kind == EntryKind::Configuration {
                let members = e.members()?;
                self.ctrl
                    .pending_configurations
                    .insert(position, Arc::new(members));
            }
            if let Err(err) = log.append_at(e).await {
                self.ctrl.on_storage_failure();
                return Err(err);
            }
            last_matched = position;
        }

        let new_commit = Position::min(req.commit_position, last_matched);
        if new_commit > log.commit_position() {
            log.set_commit_position(new_commit)?;
            self.ctrl.on_commit_advanced(new_commit).await?;
        }

        Ok(self.response(req.id, true, last_matched))
    }
}
