use super::*;

use crate::log_storage::{EntryKind, EventSource, LogEntry};

/// Entries sent from the leader. An empty request is a heartbeat.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppendRequest {
    pub id: PartitionId,
    pub term: Term,
    /// Position and term of the entry just before the first entry in `entries`.
    pub previous_entry_position: Position,
    pub previous_entry_term: Term,
    pub commit_position: Position,
    pub leader: Endpoint,
    pub entries: Vec<LogEntry>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppendResponse {
    pub id: PartitionId,
    pub term: Term,
    pub succeeded: bool,
    /// Position of the last entry known to match the leader's log.
    pub entry_position: Position,
    /// Position where the follower appends next.
    pub append_position: Position,
}

// position, term, kind, source, key
const ENTRY_BLOCK_LENGTH: u16 = 8 + 4 + 1 + 1 + 8;

impl WireMessage for AppendRequest {
    const MESSAGE_TYPE: MessageType = MessageType::AppendRequest;
    // id, term, previous entry position, previous entry term, commit position, port
    const BLOCK_LENGTH: u16 = 4 + 4 + 8 + 4 + 8 + 2;

    fn trailing_length(&self) -> usize {
        let entries: usize = self
            .entries
            .iter()
            .map(|e| ENTRY_BLOCK_LENGTH as usize + data_length(&e.payload))
            .sum();
        GROUP_HEADER_LENGTH + entries + string_length(&self.leader.host)
    }

    fn write_body(&self, buf: &mut BytesMut) -> Result<()> {
        buf.put_i32_le(self.id);
        buf.put_i32_le(self.term);
        buf.put_i64_le(self.previous_entry_position);
        buf.put_i32_le(self.previous_entry_term);
        buf.put_i64_le(self.commit_position);
        buf.put_u16_le(self.leader.port);

        put_group_header(buf, ENTRY_BLOCK_LENGTH, self.entries.len())?;
        for e in &self.entries {
            buf.put_i64_le(e.position);
            buf.put_i32_le(e.term);
            buf.put_u8(e.kind as u8);
            buf.put_u8(e.source as u8);
            buf.put_u64_le(e.key);
            put_data(buf, &e.payload)?;
        }

        put_string(buf, &self.leader.host)
    }

    fn read_body(block: &mut &[u8], rest: &mut &[u8]) -> Result<Self> {
        let id = get_i32(block)?;
        let term = get_i32(block)?;
        let previous_entry_position = get_i64(block)?;
        let previous_entry_term = get_i32(block)?;
        let commit_position = get_i64(block)?;
        let port = get_u16(block)?;

        let (count, block_length) = get_group_header(rest, ENTRY_BLOCK_LENGTH)?;
        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            let mut elem = take_element(rest, block_length, ENTRY_BLOCK_LENGTH)?;
            let position = get_i64(&mut elem)?;
            let term = get_i32(&mut elem)?;
            let kind = get_u8(&mut elem)?;
            let kind = EntryKind::from_u8(kind)
                .ok_or_else(|| mismatch(format!("unknown entry kind {kind}")))?;
            let source = get_u8(&mut elem)?;
            let source = EventSource::from_u8(source)
                .ok_or_else(|| mismatch(format!("unknown event source {source}")))?;
            let key = get_u64(&mut elem)?;
            let payload = get_data(rest)?;
            entries.push(LogEntry {
                position,
                term,
                kind,
                source,
                key,
                payload,
            });
        }

        let host = get_string(rest)?;
        Ok(Self {
            id,
            term,
            previous_entry_position,
            previous_entry_term,
            commit_position,
            leader: Endpoint::new(host, port),
            entries,
        })
    }
}

impl WireMessage for AppendResponse {
    const MESSAGE_TYPE: MessageType = MessageType::AppendResponse;
    // id, term, succeeded, entry position, append position
    const BLOCK_LENGTH: u16 = 4 + 4 + 1 + 8 + 8;

    fn trailing_length(&self) -> usize {
        0
    }

    fn write_body(&self, buf: &mut BytesMut) -> Result<()> {
        buf.put_i32_le(self.id);
        buf.put_i32_le(self.term);
        put_bool(buf, self.succeeded);
        buf.put_i64_le(self.entry_position);
        buf.put_i64_le(self.append_position);
        Ok(())
    }

    fn read_body(block: &mut &[u8], _: &mut &[u8]) -> Result<Self> {
        Ok(Self {
            id: get_i32(block)?,
            term: get_i32(block)?,
            succeeded: get_bool(block)?,
            entry_position: get_i64(block)?,
            append_position: get_i64(block)?,
        })
    }
}
