use super::*;

use bytes::{Buf, BufMut};

/// What the entry carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EntryKind {
    /// User event.
    Event = 0,
    /// Member list of the group.
    Configuration = 1,
    /// Appended by a new leader to commit entries of its term.
    Noop = 2,
}

impl EntryKind {
    pub fn from_u8(x: u8) -> Option<Self> {
        match x {
            0 => Some(Self::Event),
            1 => Some(Self::Configuration),
            2 => Some(Self::Noop),
            _ => None,
        }
    }
}

/// Who produced the entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EventSource {
    Api = 0,
    Log = 1,
    Raft = 2,
}

impl EventSource {
    pub fn from_u8(x: u8) -> Option<Self> {
        match x {
            0 => Some(Self::Api),
            1 => Some(Self::Log),
            2 => Some(Self::Raft),
            _ => None,
        }
    }
}

/// Log entry.
/// If two entries have the same position and term, they should be the same entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogEntry {
    pub position: Position,
    pub term: Term,
    pub kind: EntryKind,
    pub source: EventSource,
    pub key: u64,
    pub payload: Bytes,
}

// length, checksum, term, kind, source, key
pub(crate) const ENTRY_HEADER_LENGTH: usize = 4 + 4 + 4 + 1 + 1 + 8;

impl LogEntry {
    /// A user event. Position and term are assigned when it is appended.
    pub fn event(key: u64, payload: Bytes) -> Self {
        Self {
            position: NULL_POSITION,
            term: NULL_TERM,
            kind: EntryKind::Event,
            source: EventSource::Api,
            key,
            payload,
        }
    }

    pub fn configuration(members: &[Member]) -> Result<Self> {
        Ok(Self {
            position: NULL_POSITION,
            term: NULL_TERM,
            kind: EntryKind::Configuration,
            source: EventSource::Raft,
            key: 0,
            payload: codec::encode_members(members)?,
        })
    }

    pub fn noop() -> Self {
        Self {
            position: NULL_POSITION,
            term: NULL_TERM,
            kind: EntryKind::Noop,
            source: EventSource::Raft,
            key: 0,
            payload: Bytes::new(),
        }
    }

    pub fn with_source(mut self, source: EventSource) -> Self {
        self.source = source;
        self
    }

    pub fn at(mut self, position: Position, term: Term) -> Self {
        self.position = position;
        self.term = term;
        self
    }

    /// Number of bytes the entry occupies in the stream.
    /// The next entry starts at `position + encoded_length()`.
    pub fn encoded_length(&self) -> usize {
        ENTRY_HEADER_LENGTH + self.payload.len()
    }

    pub fn next_position(&self) -> Position {
        self.position + self.encoded_length() as Position
    }

    /// Member list of a configuration entry.
    pub fn members(&self) -> Result<Vec<Member>> {
        ensure!(
            self.kind == EntryKind::Configuration,
            Error::InvalidArgument(format!(
                "entry at {} is not a configuration",
                self.position
            ))
        );
        codec::decode_members(&self.payload)
    }

    pub(crate) fn to_bytes(&self) -> Vec<u8> {
        let len = self.encoded_length();
        let mut bin = Vec::with_capacity(len);
        bin.put_u32_le(len as u32);
        bin.put_u32_le(0);
        bin.put_i32_le(self.term);
        bin.put_u8(self.kind as u8);
        bin.put_u8(self.source as u8);
        bin.put_u64_le(self.key);
        bin.put_slice(&self.payload);
        let checksum = crc32c::crc32c(&bin[8..]);
        bin[4..8].copy_from_slice(&checksum.to_le_bytes());
        bin
    }

    pub(crate) fn from_bytes(position: Position, bin: &[u8]) -> Result<Self> {
        ensure!(
            bin.len() >= ENTRY_HEADER_LENGTH,
            Error::Storage(format!("entry at {position} is truncated"))
        );
        let mut cur = bin;
        let len = cur.get_u32_le() as usize;
        let checksum = cur.get_u32_le();
        ensure!(
            len == bin.len(),
            Error::Storage(format!(
                "entry at {position} should be {len} bytes but is {}",
                bin.len()
            ))
        );
        ensure!(
            crc32c::crc32c(&bin[8..]) == checksum,
            Error::Storage(format!("checksum mismatch at {position}"))
        );
        let term = cur.get_i32_le();
        let kind = cur.get_u8();
        let source = cur.get_u8();
        let key = cur.get_u64_le();
        let kind = EntryKind::from_u8(kind)
            .ok_or_else(|| Error::Storage(format!("unknown entry kind {kind} at {position}")))?;
        let source = EventSource::from_u8(source).ok_or_else(|| {
            Error::Storage(format!("unknown event source {source} at {position}"))
        })?;
        Ok(Self {
            position,
            term,
            kind,
            source,
            key,
            payload: Bytes::copy_from_slice(cur),
        })
    }
}
