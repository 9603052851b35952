use super::*;

/// Request to grant a vote to `candidate` for `term`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VoteRequest {
    pub id: PartitionId,
    pub term: Term,
    pub last_entry_position: Position,
    pub last_entry_term: Term,
    pub candidate: Endpoint,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VoteResponse {
    pub id: PartitionId,
    pub term: Term,
    pub granted: bool,
}

impl WireMessage for VoteRequest {
    const MESSAGE_TYPE: MessageType = MessageType::VoteRequest;
    // id, term, last entry position, last entry term, port
    const BLOCK_LENGTH: u16 = 4 + 4 + 8 + 4 + 2;

    fn trailing_length(&self) -> usize {
        string_length(&self.candidate.host)
    }

    fn write_body(&self, buf: &mut BytesMut) -> Result<()> {
        buf.put_i32_le(self.id);
        buf.put_i32_le(self.term);
        buf.put_i64_le(self.last_entry_position);
        buf.put_i32_le(self.last_entry_term);
        buf.put_u16_le(self.candidate.port);
        put_string(buf, &self.candidate.host)
    }

    fn read_body(block: &mut &[u8], rest: &mut &[u8]) -> Result<Self> {
        let id = get_i32(block)?;
        let term = get_i32(block)?;
        let last_entry_position = get_i64(block)?;
        let last_entry_term = get_i32(block)?;
        let port = get_u16(block)?;
        let host = get_string(rest)?;
        Ok(Self {
            id,
            term,
            last_entry_position,
            last_entry_term,
            candidate: Endpoint::new(host, port),
        })
    }
}

impl WireMessage for VoteResponse {
    const MESSAGE_TYPE: MessageType = MessageType::VoteResponse;
    // id, term, granted
    const BLOCK_LENGTH: u16 = 4 + 4 + 1;

    fn trailing_length(&self) -> usize {
        0
    }

    fn write_body(&self, buf: &mut BytesMut) -> Result<()> {
        buf.put_i32_le(self.id);
        buf.put_i32_le(self.term);
        put_bool(buf, self.granted);
        Ok(())
    }

    fn read_body(block: &mut &[u8], _: &mut &[u8]) -> Result<Self> {
        Ok(Self {
            id: get_i32(block)?,
            term: get_i32(block)?,
            granted: get_bool(block)?,
        })
    }
}
