use super::*;

use futures::stream::{FuturesUnordered, StreamExt};

pub struct Effect<'a> {
    pub ctrl_actor: &'a Actor<Control>,
}

impl Effect<'_> {
    /// Try to become a leader.
    /// The lock is not held while the votes are requested so the process keeps serving requests.
    pub async fn exec(self) -> Result<()> {
        let (req, others, remaining) = {
            let mut ctrl = self.ctrl_actor.write().await;
            ensure!(ctrl.state == ElectionState::Follower);
            ensure!(!ctrl.log.is_failed());

            let membership = ctrl.membership.current();
            let self_id = ctrl.self_endpoint();
            ensure!(membership.contains(&self_id));

            let mut new_ballot = ctrl.read_ballot();
            let vote_term = new_ballot.cur_term + 1;

            // Vote to itself
            new_ballot.cur_term = vote_term;
            new_ballot.voted_for = Some(self_id.clone());
            ctrl.write_ballot(new_ballot).await?;

            // Becoming Candidate avoids this node starts another election during this election.
            ctrl.write_election_state(ElectionState::Candidate);
            ctrl.leader = None;
            ctrl.reset_election_timer();

            let (last_position, last_term) = ctrl.last_entry_clock()?;
            let req = VoteRequest {
                id: ctrl.io.partition_id(),
                term: vote_term,
                last_entry_position: last_position,
                last_entry_term: last_term,
                candidate: self_id.clone(),
            };
            let others: Vec<Endpoint> = membership
                .endpoints()
                .filter(|id| **id != self_id)
                .cloned()
                .collect();
            (req, others, membership.quorum() - 1)
        };

        info!("start election. try promote at term {}", req.term);

        // Failing some I/O operations during election will be considered as election failure.
        let io = self.ctrl_actor.read().await.io.clone();
        let (ok, max_term) = request_votes(&io, &req, others, remaining).await;

        let mut ctrl = self.ctrl_actor.write().await;
        if max_term > ctrl.read_ballot().cur_term {
            ctrl.observe_term(max_term).await?;
            return Ok(());
        }
        // Something else happened during the election.
        if ctrl.state != ElectionState::Candidate || ctrl.read_ballot().cur_term != req.term {
            return Ok(());
        }
        post_election(&mut ctrl, req.term, ok).await
    }
}

/// Request votes to the peers and returns whether it got enough votes
/// with the highest term seen in the responses.
async fn request_votes(
    io: &RaftHandle,
    req: &VoteRequest,
    others: Vec<Endpoint>,
    remaining: usize,
) -> (bool, Term) {
    if remaining == 0 {
        return (true, req.term);
    }

    let mut vote_requests = FuturesUnordered::new();
    for endpoint in others {
        let conn = io.connect(&endpoint);
        let req = req.clone();
        vote_requests.push(async move { (endpoint, conn.request_vote(req).await) });
    }

    let mut granted = 0;
    let mut max_term = req.term;
    while let Some((endpoint, resp)) = vote_requests.next().await {
        match resp {
            Ok(resp) => {
                max_term = Term::max(max_term, resp.term);
                if resp.granted {
                    granted += 1;
                    if granted >= remaining {
                        return (true, max_term);
                    }
                }
            }
            Err(e) => debug!("vote request to {endpoint} failed: {e:#}"),
        }
    }
    (false, max_term)
}

async fn post_election(ctrl: &mut Control, vote_term: Term, ok: bool) -> Result<()> {
    if !ok {
        info!("failed to become leader. now back to follower");
        ctrl.write_election_state(ElectionState::Follower);
        return Ok(());
    }

    info!("got enough votes from the cluster. promoted to leader");
    ctrl.write_election_state(ElectionState::Leader);
    ctrl.leader = Some(ctrl.self_endpoint());

    // As soon as the node becomes the leader, replicate noop entries with term.
    // Entries of the older terms are committed along with it.
    match ctrl
        .log
        .append(LogEntry::noop().at(NULL_POSITION, vote_term))
        .await
    {
        Ok(position) => info!("noop barrier is queued at {position} (term={vote_term})"),
        Err(e) => {
            ctrl.on_storage_failure();
            return Err(e);
        }
    }

    // Initialize replication progress
    ctrl.replication_progresses.clear();
    ctrl.peer_threads.clear();
    ctrl.sync_peers();
    ctrl.replication_evt_tx.push_event(ReplicationEvent);
    Ok(())
}
