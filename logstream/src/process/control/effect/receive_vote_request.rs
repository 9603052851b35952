use super::*;

pub struct Effect<'a> {
    pub ctrl: &'a mut Control,
}

impl Effect<'_> {
    pub async fn exec(self, req: VoteRequest) -> Result<VoteResponse> {
        let cur_term = self.ctrl.read_ballot().cur_term;
        let reject = |term| VoteResponse {
            id: req.id,
            term,
            granted: false,
        };

        if req.term < cur_term {
            warn!("candidate term is older. reject vote");
            return Ok(reject(cur_term));
        }

        // A leader learns a newer term from a member's vote request as from any other message.
        if req.term > cur_term
            && self.ctrl.is_leader()
            && self.ctrl.membership.contains(&req.candidate)
        {
            self.ctrl.observe_term(req.term).await?;
        }

        // $4.2.3
        // A server removed from the membership keeps timing out and asking for votes.
        // The request is ignored while the current leader is alive.
        if self.ctrl.leader_is_alive(&req.candidate) {
            debug!(
                "ignore vote request from {} since the leader is alive",
                req.candidate
            );
            return Ok(reject(cur_term));
        }

        if req.term > cur_term {
            warn!("received newer term. reset vote");
            self.ctrl.observe_term(req.term).await?;
        }
        let mut ballot = self.ctrl.read_ballot();

        // $5.4.1 Election restriction
        let (last_position, last_term) = self.ctrl.last_entry_clock()?;
        let candidate_win = (req.last_entry_term, req.last_entry_position) >= (last_term, last_position);
        if !candidate_win {
            warn!("candidate log is older. reject vote");
            return Ok(reject(ballot.cur_term));
        }

        let grant = match &ballot.voted_for {
            None => {
                info!("learn {} as the new leader", req.candidate);
                ballot.voted_for = Some(req.candidate.clone());
                self.ctrl.write_ballot(ballot.clone()).await?;
                // Give the candidate time to win.
                self.ctrl.reset_election_timer();
                true
            }
            // Only one grant vote is allowed for a term.
            // This is why ballot needs to be persistent.
            Some(id) => *id == req.candidate,
        };

        info!(
            "voted response grant({grant}) to {} at term {}",
            req.candidate, ballot.cur_term
        );
        Ok(VoteResponse {
            id: req.id,
            term: ballot.cur_term,
            granted: grant,
        })
    }
}
