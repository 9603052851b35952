use super::*;

pub struct Effect<'a> {
    pub ctrl: &'a mut Control,
}

impl Effect<'_> {
    /// Update the replication progress of `follower` by the response to `req`.
    /// Returns true if more entries should be sent right away.
    pub async fn exec(
        self,
        follower: &Endpoint,
        req: &AppendRequest,
        resp: Result<AppendResponse>,
    ) -> Result<bool> {
        let resp = match resp {
            Ok(resp) => resp,
            Err(e) => {
                debug!("append request to {follower} failed: {e:#}");
                return Ok(false);
            }
        };

        if resp.term > self.ctrl.read_ballot().cur_term {
            self.ctrl.observe_term(resp.term).await?;
            return Ok(false);
        }
        // The response to the request of an old leadership.
        if !self.ctrl.is_leader() || self.ctrl.read_ballot().cur_term != req.term {
            return Ok(false);
        }

        let last_position = self.ctrl.log.last_position();
        let Some(progress) = self.ctrl.replication_progresses.get_mut(follower) else {
            return Ok(false);
        };

        if resp.succeeded {
            match req.entries.last() {
                Some(last) => {
                    progress.match_position = Position::max(progress.match_position, last.position);
                    progress.next_position = last.next_position();
                }
                None => {
                    progress.match_position =
                        Position::max(progress.match_position, req.previous_entry_position);
                }
            }
            self.ctrl.replication_evt_tx.push_event(ReplicationEvent);
        } else {
            // Go back to the previous entry, or directly to the end of the follower's log
            // if it is shorter.
            let prev = Position::max(req.previous_entry_position, 0);
            let new_next = Position::min(resp.append_position, prev);
            if new_next == progress.next_position {
                // No way to go further back.
                return Ok(false);
            }
            debug!("rewind replication to {follower} to {new_next}");
            progress.next_position = new_next;
        }

        Ok(progress.next_position <= last_position)
    }
}
