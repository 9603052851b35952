use super::*;

use std::sync::Weak;

pub mod effect;
mod failure_detector;
mod init;
mod replication;
pub mod thread;
use replication::ReplicationProgress;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ElectionState {
    Leader,
    Candidate,
    Follower,
}

pub enum MembershipChange {
    Add(Member),
    Remove(Member),
}

pub struct Control {
    // voter
    state: ElectionState,
    ballot: Ballot,
    ballot_store: storage::BallotStore,
    leader: Option<Endpoint>,
    leader_failure_detector: failure_detector::FailureDetector,

    // peers
    /// Configuration entries appended but not committed yet.
    /// Replication already counts them but the quorum is computed on the committed one.
    pending_configurations: BTreeMap<Position, Arc<Vec<Member>>>,
    replication_progresses: HashMap<Endpoint, ReplicationProgress>,
    peer_threads: HashMap<Endpoint, ThreadHandle>,
    queue_evt_rx: EventConsumer<QueueEvent>,
    replication_evt_tx: EventProducer<ReplicationEvent>,

    log: LogStream,
    membership: MembershipDirectory,
    io: RaftHandle,
    config: RaftConfig,
    actor: Weak<RwLock<Control>>,
}

impl Control {
    pub fn new(
        ballot_store: storage::BallotStore,
        log: LogStream,
        membership: MembershipDirectory,
        queue_evt_rx: EventConsumer<QueueEvent>,
        replication_evt_tx: EventProducer<ReplicationEvent>,
        io: RaftHandle,
        config: RaftConfig,
    ) -> Self {
        Self {
            state: ElectionState::Follower,
            ballot: Ballot::new(),
            ballot_store,
            leader: None,
            leader_failure_detector: failure_detector::FailureDetector::new(
                config.random_election_timeout(),
            ),

            pending_configurations: BTreeMap::new(),
            replication_progresses: HashMap::new(),
            peer_threads: HashMap::new(),
            queue_evt_rx,
            replication_evt_tx,

            log,
            membership,
            io,
            config,
            actor: Weak::new(),
        }
    }

    fn self_endpoint(&self) -> Endpoint {
        self.io.self_endpoint().clone()
    }

    pub fn read_election_state(&self) -> ElectionState {
        self.state
    }

    fn write_election_state(&mut self, e: ElectionState) {
        info!("election state -> {e:?}");
        self.state = e;
    }

    pub fn is_leader(&self) -> bool {
        self.state == ElectionState::Leader
    }

    pub fn leader(&self) -> Option<Endpoint> {
        self.leader.clone()
    }

    pub fn read_ballot(&self) -> Ballot {
        self.ballot.clone()
    }

    async fn write_ballot(&mut self, b: Ballot) -> Result<()> {
        self.ballot_store.save_ballot(b.clone()).await?;
        self.ballot = b;
        Ok(())
    }

    /// Adopt a newer term. A leader or candidate steps down to follower.
    pub async fn observe_term(&mut self, term: Term) -> Result<()> {
        let cur_term = self.ballot.cur_term;
        if term <= cur_term {
            return Ok(());
        }
        info!("observed newer term {term} (cur_term={cur_term})");
        self.write_ballot(Ballot {
            cur_term: term,
            voted_for: None,
        })
        .await?;
        self.leader = None;
        if self.state != ElectionState::Follower {
            self.write_election_state(ElectionState::Follower);
            self.sync_peers();
        }
        self.reset_election_timer();
        Ok(())
    }

    fn reset_election_timer(&mut self) {
        let timeout = self.config.random_election_timeout();
        self.leader_failure_detector.receive_heartbeat(timeout);
    }

    /// Whether this process should start an election now.
    pub fn election_timeout_expired(&self) -> bool {
        // A process not in the membership can't become a leader anyway.
        if !self.membership.contains(self.io.self_endpoint()) {
            return false;
        }
        if self.log.is_failed() {
            return false;
        }
        self.state == ElectionState::Follower && self.leader_failure_detector.is_expired()
    }

    /// True if a live leader other than `candidate` is known.
    /// A leader counts itself as alive.
    fn leader_is_alive(&self, candidate: &Endpoint) -> bool {
        match self.state {
            ElectionState::Leader => true,
            ElectionState::Candidate => false,
            ElectionState::Follower => match &self.leader {
                Some(leader) if leader != candidate => {
                    self.leader_failure_detector.elapsed() < self.config.election_timeout_min
                }
                _ => false,
            },
        }
    }

    fn last_entry_clock(&self) -> Result<(Position, Term)> {
        match self.log.last_entry()? {
            Some(e) => Ok((e.position, e.term)),
            None => Ok((NULL_POSITION, NULL_TERM)),
        }
    }

    /// Membership changes are serialized: no new one until the previous one is committed.
    pub fn allow_configuration_change(&self) -> bool {
        self.pending_configurations.is_empty()
    }

    /// Start or stop the replication threads to match the members.
    pub fn sync_peers(&mut self) {
        if !self.is_leader() {
            self.peer_threads.clear();
            self.replication_progresses.clear();
            return;
        }

        let self_id = self.self_endpoint();
        let mut targets: BTreeSet<Endpoint> = self.membership.current().endpoints().cloned().collect();
        for members in self.pending_configurations.values() {
            targets.extend(members.iter().map(|m| m.endpoint.clone()));
        }
        targets.remove(&self_id);

        self.peer_threads.retain(|id, _| targets.contains(id));
        self.replication_progresses
            .retain(|id, _| targets.contains(id));

        for id in targets {
            if self.peer_threads.contains_key(&id) {
                continue;
            }
            info!("start replication to {id}");
            let init_next_position = self.log.last_position().max(0);
            self.replication_progresses
                .insert(id.clone(), ReplicationProgress::new(init_next_position));
            let hdl = thread::replication::run(
                self.actor.clone(),
                id.clone(),
                self.queue_evt_rx.clone(),
                self.config.heartbeat_interval,
            );
            self.peer_threads.insert(id, hdl);
        }
    }

    /// Build the next append request to `follower` from its replication progress.
    fn prepare_append_request(&self, follower: &Endpoint) -> Result<Option<AppendRequest>> {
        let Some(progress) = self.replication_progresses.get(follower) else {
            return Ok(None);
        };
        let next_position = progress.next_position;

        // The entries to be sent may be deleted due to a previous compaction.
        let head = self.log.head_position();
        if head > 0 && next_position <= head {
            warn!(
                "entries from {next_position} for {follower} are already compacted (head={head})"
            );
            return Ok(None);
        }

        let prev = self.log.previous_entry(next_position)?;
        let entries = self.log.read_batch(
            next_position,
            self.config.max_entries_per_append,
            self.config.max_bytes_per_append,
        )?;
        Ok(Some(AppendRequest {
            id: self.io.partition_id(),
            term: self.ballot.cur_term,
            previous_entry_position: prev.as_ref().map(|e| e.position).unwrap_or(NULL_POSITION),
            previous_entry_term: prev.as_ref().map(|e| e.term).unwrap_or(NULL_TERM),
            commit_position: self.log.commit_position(),
            leader: self.self_endpoint(),
            entries,
        }))
    }

    /// The highest position stored on a quorum of the committed members.
    fn find_new_commit_position(&self) -> Option<Position> {
        let membership = self.membership.current();
        if membership.members.is_empty() {
            return None;
        }
        let self_id = self.io.self_endpoint();
        let mut match_positions = vec![];
        for id in membership.endpoints() {
            let p = if id == self_id {
                self.log.last_position()
            } else {
                self.replication_progresses
                    .get(id)
                    .map(|p| p.match_position)
                    .unwrap_or(NULL_POSITION)
            };
            match_positions.push(p);
        }
        match_positions.sort_unstable();
        match_positions.reverse();
        Some(match_positions[membership.quorum() - 1])
    }

    /// Publish the latest configuration that became committed.
    async fn on_commit_advanced(&mut self, commit_position: Position) -> Result<()> {
        let mut committed = None;
        while let Some(e) = self.pending_configurations.first_entry() {
            if *e.key() > commit_position {
                break;
            }
            committed = Some(e.remove_entry());
        }
        if let Some((position, members)) = committed {
            effect::set_membership::Effect { ctrl: self }
                .exec(Configuration {
                    position,
                    members: members.as_ref().clone(),
                })
                .await?;
        }
        Ok(())
    }

    /// Drop the pending configurations discarded by truncation.
    fn forget_configurations_from(&mut self, position: Position) {
        let _ = self.pending_configurations.split_off(&position);
    }

    /// Leadership is given up once the local log can't be written.
    pub fn on_storage_failure(&mut self) {
        if !self.log.is_failed() {
            return;
        }
        if self.is_leader() {
            warn!("log stream has failed. step down");
            self.leader = None;
            self.write_election_state(ElectionState::Follower);
            self.sync_peers();
        }
    }
}
