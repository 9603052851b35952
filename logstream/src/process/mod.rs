use super::*;

use crate::codec::{
    AppendRequest, AppendResponse, JoinRequest, JoinResponse, LeaveRequest, LeaveResponse,
    VoteRequest, VoteResponse,
};
use crate::log_storage::{EntryKind, LogEntry, LogStream};
use crate::node::RaftHandle;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tokio::sync::RwLock;

mod control;
pub use control::ElectionState;
use control::Control;
pub mod membership;
pub use membership::{Configuration, MembershipDirectory};
mod storage;
pub use storage::RaftStorage;
mod thread;
pub use thread::ThreadHandle;
use thread::*;

pub type Actor<T> = Arc<RwLock<T>>;

/// Ballot in election.
#[derive(Clone, Debug, PartialEq)]
struct Ballot {
    cur_term: Term,
    voted_for: Option<Endpoint>,
}

impl Ballot {
    pub fn new() -> Self {
        Self {
            cur_term: 0,
            voted_for: None,
        }
    }
}

#[allow(dead_code)]
struct ThreadHandles {
    election_handle: ThreadHandle,
    advance_commit_handle: ThreadHandle,
}

/// `RaftProcess` is the member of a Raft group replicating the log stream of one partition.
pub struct RaftProcess {
    ctrl_actor: Actor<Control>,
    log: LogStream,
    membership: MembershipDirectory,
    io: RaftHandle,
    config: RaftConfig,

    queue_evt_tx: EventProducer<QueueEvent>,
    replication_evt_tx: EventProducer<ReplicationEvent>,

    _thread_handles: ThreadHandles,
}

impl RaftProcess {
    pub async fn new(storage: &RaftStorage, io: RaftHandle, config: RaftConfig) -> Result<Self> {
        config.validate()?;
        let io = io.with_request_timeout(config.request_timeout);
        let (log, ballot_store) = storage.get(io.partition_id())?;
        let membership = MembershipDirectory::new();

        let (queue_evt_tx, queue_evt_rx) = thread::notify();
        let (replication_evt_tx, replication_evt_rx) = thread::notify();

        let ctrl = Control::new(
            ballot_store,
            log.clone(),
            membership.clone(),
            queue_evt_rx,
            replication_evt_tx.clone(),
            io.clone(),
            config.clone(),
        );
        let ctrl_actor = Arc::new(RwLock::new(ctrl));
        ctrl_actor
            .write()
            .await
            .init(Arc::downgrade(&ctrl_actor))
            .await?;

        let _thread_handles = ThreadHandles {
            election_handle: control::thread::election::run(ctrl_actor.clone(), &config),
            advance_commit_handle: control::thread::advance_commit::run(
                ctrl_actor.clone(),
                replication_evt_rx,
                &config,
            ),
        };

        Ok(Self {
            ctrl_actor,
            log,
            membership,
            io,
            config,
            queue_evt_tx,
            replication_evt_tx,
            _thread_handles,
        })
    }

    pub fn partition_id(&self) -> PartitionId {
        self.io.partition_id()
    }

    pub fn self_endpoint(&self) -> &Endpoint {
        self.io.self_endpoint()
    }

    pub fn log(&self) -> &LogStream {
        &self.log
    }

    pub fn membership(&self) -> &MembershipDirectory {
        &self.membership
    }

    pub async fn election_state(&self) -> ElectionState {
        self.ctrl_actor.read().await.read_election_state()
    }

    pub async fn is_leader(&self) -> bool {
        self.ctrl_actor.read().await.is_leader()
    }

    pub async fn term(&self) -> Term {
        self.ctrl_actor.read().await.read_ballot().cur_term
    }

    /// The leader this process currently knows of.
    pub async fn leader(&self) -> Option<Endpoint> {
        self.ctrl_actor.read().await.leader()
    }

    /// Make this process the only member of a new group and the leader of it.
    /// Fails unless the process has neither a membership nor any entry.
    pub async fn bootstrap(&self) -> Result<()> {
        {
            let mut ctrl = self.ctrl_actor.write().await;
            control::effect::bootstrap::Effect { ctrl: &mut *ctrl }
                .exec()
                .await?;
        }
        // Take the leadership right away instead of waiting for the election timeout.
        control::effect::try_promote::Effect {
            ctrl_actor: &self.ctrl_actor,
        }
        .exec()
        .await
    }

    /// Ask the group through `contact` to add this process as a member.
    /// If the contact reports a newer term, the term is adopted and the request is retried once.
    pub async fn join(&self, contact: &Endpoint) -> Result<JoinResponse> {
        let member = Member::new(self.self_endpoint().clone());
        let conn = self.io.connect(contact);
        let req = JoinRequest {
            id: self.partition_id(),
            term: self.term().await,
            member: member.clone(),
        };
        let mut resp = conn.join(req).await?;
        if !resp.succeeded && resp.term > self.term().await {
            self.observe_term(resp.term).await?;
            let req = JoinRequest {
                id: self.partition_id(),
                term: resp.term,
                member,
            };
            resp = conn.join(req).await?;
        }
        if resp.succeeded {
            info!(
                "join request is accepted by {contact} (configuration at {})",
                resp.configuration_entry_position
            );
        }
        Ok(resp)
    }

    /// Ask the group through `contact` to remove this process from the members.
    pub async fn leave(&self, contact: &Endpoint) -> Result<LeaveResponse> {
        let member = Member::new(self.self_endpoint().clone());
        let conn = self.io.connect(contact);
        let req = LeaveRequest {
            id: self.partition_id(),
            term: self.term().await,
            member: member.clone(),
        };
        let mut resp = conn.leave(req).await?;
        if !resp.succeeded && resp.term > self.term().await {
            self.observe_term(resp.term).await?;
            let req = LeaveRequest {
                id: self.partition_id(),
                term: resp.term,
                member,
            };
            resp = conn.leave(req).await?;
        }
        if resp.succeeded {
            info!(
                "leave request is accepted by {contact} (configuration at {})",
                resp.configuration_entry_position
            );
        }
        Ok(resp)
    }

    async fn observe_term(&self, term: Term) -> Result<()> {
        self.ctrl_actor.write().await.observe_term(term).await
    }

    /// Append an event to the log. Only the leader accepts new events.
    /// Returns the position of the entry, which is not committed yet.
    pub async fn append(&self, key: u64, payload: Bytes) -> Result<Position> {
        self.append_entry(LogEntry::event(key, payload)).await
    }

    /// Append a prepared event entry. Its position and term are assigned here.
    pub async fn append_entry(&self, entry: LogEntry) -> Result<Position> {
        ensure!(
            entry.kind == EntryKind::Event,
            Error::Validation(format!("{:?} entry can't be appended directly", entry.kind))
        );
        // Every entry must fit in one append request or it could never be replicated.
        ensure!(
            entry.encoded_length() <= self.config.max_bytes_per_append,
            Error::InvalidArgument(format!(
                "entry of {} bytes is larger than max_bytes_per_append ({})",
                entry.encoded_length(),
                self.config.max_bytes_per_append
            ))
        );
        let r = {
            let ctrl = self.ctrl_actor.read().await;
            ensure!(
                ctrl.is_leader(),
                Error::NotLeader {
                    leader: ctrl.leader()
                }
            );
            let term = ctrl.read_ballot().cur_term;
            self.log.append(entry.at(NULL_POSITION, term)).await
        };
        let position = match r {
            Ok(position) => position,
            Err(e) => {
                if self.log.is_failed() {
                    self.ctrl_actor.write().await.on_storage_failure();
                }
                return Err(e);
            }
        };
        self.queue_evt_tx.push_event(QueueEvent);
        self.replication_evt_tx.push_event(ReplicationEvent);
        Ok(position)
    }

    /// Append an event and wait until it is committed.
    pub async fn append_and_wait(&self, key: u64, payload: Bytes) -> Result<Position> {
        let position = self.append(key, payload).await?;
        tokio::time::timeout(self.config.commit_timeout, self.log.wait_for_commit(position))
            .await
            .map_err(|_| {
                Error::Timeout(format!(
                    "entry at {position} is not committed in {:?}",
                    self.config.commit_timeout
                ))
            })??;
        Ok(position)
    }

    fn validate_partition(&self, id: PartitionId) -> Result<()> {
        ensure!(
            id == self.partition_id(),
            Error::Validation(format!(
                "request for partition {id} is sent to partition {}",
                self.partition_id()
            ))
        );
        Ok(())
    }

    fn validate_member(member: &Member) -> Result<()> {
        ensure!(
            !member.endpoint.host.is_empty() && member.endpoint.port != 0,
            Error::Validation(format!("invalid member endpoint {}", member.endpoint))
        );
        // The host goes on the wire behind a u16 length.
        ensure!(
            u16::try_from(member.endpoint.host.len()).is_ok(),
            Error::Validation(format!(
                "host of {} bytes is too long",
                member.endpoint.host.len()
            ))
        );
        Ok(())
    }

    pub async fn handle_join_request(&self, req: JoinRequest) -> Result<JoinResponse> {
        self.validate_partition(req.id)?;
        Self::validate_member(&req.member)?;

        let outcome = {
            let mut ctrl = self.ctrl_actor.write().await;
            control::effect::change_membership::Effect { ctrl: &mut *ctrl }
                .exec(req.term, control::MembershipChange::Add(req.member))
                .await?
        };
        self.queue_evt_tx.push_event(QueueEvent);
        Ok(JoinResponse {
            id: req.id,
            term: outcome.term,
            succeeded: outcome.succeeded,
            configuration_entry_position: outcome.position,
            configuration_entry_term: outcome.entry_term,
            members: outcome.members,
        })
    }

    pub async fn handle_leave_request(&self, req: LeaveRequest) -> Result<LeaveResponse> {
        self.validate_partition(req.id)?;
        Self::validate_member(&req.member)?;

        let outcome = {
            let mut ctrl = self.ctrl_actor.write().await;
            control::effect::change_membership::Effect { ctrl: &mut *ctrl }
                .exec(req.term, control::MembershipChange::Remove(req.member))
                .await?
        };
        self.queue_evt_tx.push_event(QueueEvent);
        Ok(LeaveResponse {
            id: req.id,
            term: outcome.term,
            succeeded: outcome.succeeded,
            configuration_entry_position: outcome.position,
            configuration_entry_term: outcome.entry_term,
            members: outcome.members,
        })
    }

    pub async fn handle_vote_request(&self, req: VoteRequest) -> Result<VoteResponse> {
        self.validate_partition(req.id)?;
        let mut ctrl = self.ctrl_actor.write().await;
        control::effect::receive_vote_request::Effect { ctrl: &mut *ctrl }
            .exec(req)
            .await
    }

    pub async fn handle_append_request(&self, req: AppendRequest) -> Result<AppendResponse> {
        self.validate_partition(req.id)?;
        let mut ctrl = self.ctrl_actor.write().await;
        control::effect::receive_append_request::Effect { ctrl: &mut *ctrl }
            .exec(req)
            .await
    }
}
