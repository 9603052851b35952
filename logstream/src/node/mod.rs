use super::*;

use crate::codec::{ErrorResponse, Message, WireMessage};
use crate::process::RaftProcess;
use std::collections::HashMap;

mod communicator;
pub mod transport;

pub use communicator::Communicator;
pub use transport::{LocalNetwork, TcpTransport, Transport};

/// `RaftNode` hosts the `RaftProcess`es of many partitions behind one endpoint.
pub struct RaftNode {
    self_endpoint: Endpoint,
    transport: Arc<dyn Transport>,
    process_map: spin::RwLock<HashMap<PartitionId, Arc<RaftProcess>>>,
}

impl RaftNode {
    pub fn new(self_endpoint: Endpoint, transport: Arc<dyn Transport>) -> Self {
        Self {
            self_endpoint,
            transport,
            process_map: HashMap::new().into(),
        }
    }

    pub fn self_endpoint(&self) -> &Endpoint {
        &self.self_endpoint
    }

    /// Get a Raft handle to give I/O capability to a Raft process on a partition.
    pub fn get_handle(&self, partition_id: PartitionId) -> RaftHandle {
        RaftHandle {
            self_endpoint: self.self_endpoint.clone(),
            partition_id,
            transport: self.transport.clone(),
            request_timeout: RaftConfig::default().request_timeout,
        }
    }

    /// Attach a Raft process to its partition. A process already attached is replaced.
    pub fn attach_process(&self, p: RaftProcess) -> Arc<RaftProcess> {
        let p = Arc::new(p);
        self.process_map.write().insert(p.partition_id(), p.clone());
        p
    }

    /// Detach a Raft process from a partition.
    pub fn detach_process(&self, partition_id: PartitionId) -> Option<Arc<RaftProcess>> {
        self.process_map.write().remove(&partition_id)
    }

    pub fn get_process(&self, partition_id: PartitionId) -> Option<Arc<RaftProcess>> {
        self.process_map.read().get(&partition_id).cloned()
    }

    pub fn list_processes(&self) -> Vec<PartitionId> {
        let mut out: Vec<PartitionId> = self.process_map.read().keys().cloned().collect();
        out.sort_unstable();
        out
    }

    /// Serve one encoded request and return the encoded response.
    /// Failures are answered with an `ErrorResponse`.
    /// Nothing is returned for a message that can't be answered,
    /// which the transport treats by closing the connection.
    pub async fn handle(&self, bytes: Bytes) -> Option<Bytes> {
        let msg = match Message::decode(&bytes) {
            Ok(msg) => msg,
            Err(e) => {
                warn!("dropped a malformed message: {e:#}");
                return None;
            }
        };
        let message_type = msg.message_type();
        // Responses arriving here are never answered, whatever partition they name.
        if !msg.is_request() {
            warn!("dropped {message_type:?} which is not a request");
            return None;
        }
        let Some(partition_id) = msg.partition_id() else {
            return None;
        };
        let Some(process) = self.get_process(partition_id) else {
            let e = anyhow::Error::new(Error::PartitionNotFound(partition_id));
            return ErrorResponse::from_error(&e).encode().ok();
        };

        let resp: Result<Message> = match msg {
            Message::JoinRequest(req) => process.handle_join_request(req).await.map(Into::into),
            Message::LeaveRequest(req) => process.handle_leave_request(req).await.map(Into::into),
            Message::VoteRequest(req) => process.handle_vote_request(req).await.map(Into::into),
            Message::AppendRequest(req) => process.handle_append_request(req).await.map(Into::into),
            _ => return None,
        };
        match resp.and_then(|m| m.encode()) {
            Ok(bin) => Some(bin),
            Err(e) => {
                debug!("{message_type:?} to partition {partition_id} failed: {e:#}");
                ErrorResponse::from_error(&e).encode().ok()
            }
        }
    }
}

/// `RaftHandle` gives I/O capability to a Raft process on a partition.
#[derive(Clone)]
pub struct RaftHandle {
    self_endpoint: Endpoint,
    partition_id: PartitionId,
    transport: Arc<dyn Transport>,
    request_timeout: Duration,
}

impl RaftHandle {
    pub fn self_endpoint(&self) -> &Endpoint {
        &self.self_endpoint
    }

    pub fn partition_id(&self) -> PartitionId {
        self.partition_id
    }

    pub(crate) fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    pub fn connect(&self, dest: &Endpoint) -> Communicator {
        Communicator::new(self.transport.clone(), dest.clone(), self.request_timeout)
    }
}
