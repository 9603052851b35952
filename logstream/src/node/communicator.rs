use super::*;

use crate::codec::{
    AppendRequest, AppendResponse, JoinRequest, JoinResponse, LeaveRequest, LeaveResponse,
    MessageHeader, MessageType, VoteRequest, VoteResponse,
};

/// Sends the requests of a partition to one destination.
pub struct Communicator {
    transport: Arc<dyn Transport>,
    dest: Endpoint,
    timeout: Duration,
}

impl Communicator {
    pub fn new(transport: Arc<dyn Transport>, dest: Endpoint, timeout: Duration) -> Self {
        Self {
            transport,
            dest,
            timeout,
        }
    }

    /// An `ErrorResponse` from the destination fails the call with `Error::Remote`.
    async fn call<Req: WireMessage, Resp: WireMessage>(&self, req: &Req) -> Result<Resp> {
        let bytes = self
            .transport
            .request(&self.dest, req.encode()?, self.timeout)
            .await?;
        let header = MessageHeader::read(&mut &bytes[..])?;
        if header.template_id == MessageType::ErrorResponse.template_id() {
            let e = ErrorResponse::decode(&bytes)?;
            bail!(e.into_error());
        }
        Resp::decode(&bytes)
    }

    pub async fn join(&self, req: JoinRequest) -> Result<JoinResponse> {
        self.call(&req).await
    }

    pub async fn leave(&self, req: LeaveRequest) -> Result<LeaveResponse> {
        self.call(&req).await
    }

    pub async fn request_vote(&self, req: VoteRequest) -> Result<VoteResponse> {
        self.call(&req).await
    }

    pub async fn send_append(&self, req: AppendRequest) -> Result<AppendResponse> {
        self.call(&req).await
    }
}
