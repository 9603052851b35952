//! Every message starts with a fixed header
//! `{block_length, template_id, schema_id, version}` (u16 each, little-endian)
//! followed by a fixed-size body block, then repeating groups and variable-length data.
//!
//! A decoder accepts a body block longer than it knows (the extra bytes are skipped)
//! but rejects a shorter one. Repeating groups carry their own
//! `{count, block_length}` header and follow the same rule per element.

use super::*;

use bytes::{Buf, BufMut, BytesMut};

mod append;
mod configuration;
mod error_response;
mod vote;

pub use append::{AppendRequest, AppendResponse};
pub use configuration::{JoinRequest, JoinResponse, LeaveRequest, LeaveResponse};
pub use error_response::ErrorResponse;
pub use vote::{VoteRequest, VoteResponse};

pub const SCHEMA_ID: u16 = 4;
pub const SCHEMA_VERSION: u16 = 1;

pub const HEADER_LENGTH: usize = 8;
pub const GROUP_HEADER_LENGTH: usize = 4;
const STRING_HEADER_LENGTH: usize = 2;
const DATA_HEADER_LENGTH: usize = 4;
const MEMBER_BLOCK_LENGTH: u16 = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageType {
    JoinRequest = 1,
    JoinResponse = 2,
    LeaveRequest = 3,
    LeaveResponse = 4,
    VoteRequest = 5,
    VoteResponse = 6,
    AppendRequest = 7,
    AppendResponse = 8,
    ErrorResponse = 9,
}

impl MessageType {
    pub fn template_id(self) -> u16 {
        self as u16
    }

    pub fn from_template_id(id: u16) -> Option<Self> {
        let t = match id {
            1 => Self::JoinRequest,
            2 => Self::JoinResponse,
            3 => Self::LeaveRequest,
            4 => Self::LeaveResponse,
            5 => Self::VoteRequest,
            6 => Self::VoteResponse,
            7 => Self::AppendRequest,
            8 => Self::AppendResponse,
            9 => Self::ErrorResponse,
            _ => return None,
        };
        Some(t)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MessageHeader {
    pub block_length: u16,
    pub template_id: u16,
    pub schema_id: u16,
    pub version: u16,
}

impl MessageHeader {
    fn of<M: WireMessage>() -> Self {
        Self {
            block_length: M::BLOCK_LENGTH,
            template_id: M::MESSAGE_TYPE.template_id(),
            schema_id: SCHEMA_ID,
            version: SCHEMA_VERSION,
        }
    }

    fn write(&self, buf: &mut BytesMut) {
        buf.put_u16_le(self.block_length);
        buf.put_u16_le(self.template_id);
        buf.put_u16_le(self.schema_id);
        buf.put_u16_le(self.version);
    }

    pub fn read(buf: &mut &[u8]) -> Result<Self> {
        let header = Self {
            block_length: get_u16(buf)?,
            template_id: get_u16(buf)?,
            schema_id: get_u16(buf)?,
            version: get_u16(buf)?,
        };
        ensure!(
            header.schema_id == SCHEMA_ID,
            mismatch(format!("unknown schema id {}", header.schema_id))
        );
        Ok(header)
    }
}

/// A message with a fixed wire layout.
pub trait WireMessage: Sized {
    const MESSAGE_TYPE: MessageType;
    /// Length of the fixed-size body block.
    const BLOCK_LENGTH: u16;

    /// Length of the repeating groups and variable-length data after the body block.
    fn trailing_length(&self) -> usize;

    /// Write the body block followed by the trailing part.
    /// Fails with `InvalidArgument` if a length doesn't fit in its prefix.
    fn write_body(&self, buf: &mut BytesMut) -> Result<()>;

    /// `block` holds exactly `BLOCK_LENGTH` bytes and `rest` everything after the body block.
    fn read_body(block: &mut &[u8], rest: &mut &[u8]) -> Result<Self>;

    /// Exact number of bytes `encode` produces. Computed from the value alone.
    fn encoded_length(&self) -> usize {
        HEADER_LENGTH + Self::BLOCK_LENGTH as usize + self.trailing_length()
    }

    fn write(&self, buf: &mut BytesMut) -> Result<()> {
        MessageHeader::of::<Self>().write(buf);
        self.write_body(buf)
    }

    fn encode(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(self.encoded_length());
        self.write(&mut buf)?;
        debug_assert_eq!(buf.len(), self.encoded_length());
        Ok(buf.freeze())
    }

    /// Write the message into `buf` at `offset` and return the number of bytes written.
    fn write_at(&self, buf: &mut [u8], offset: usize) -> Result<usize> {
        let len = self.encoded_length();
        ensure!(
            offset.checked_add(len).is_some_and(|end| end <= buf.len()),
            Error::InvalidArgument(format!(
                "buffer of {} bytes can't hold {len} bytes at offset {offset}",
                buf.len()
            ))
        );
        buf[offset..offset + len].copy_from_slice(&self.encode()?);
        Ok(len)
    }

    /// Decode a fresh value from `bytes`.
    fn decode(bytes: &[u8]) -> Result<Self> {
        let mut cur = bytes;
        let header = MessageHeader::read(&mut cur)?;
        ensure!(
            header.template_id == Self::MESSAGE_TYPE.template_id(),
            mismatch(format!(
                "expected {:?} but got template id {}",
                Self::MESSAGE_TYPE,
                header.template_id
            ))
        );
        decode_body(&header, cur)
    }
}

fn decode_body<M: WireMessage>(header: &MessageHeader, mut cur: &[u8]) -> Result<M> {
    let block_length = header.block_length as usize;
    ensure!(
        block_length >= M::BLOCK_LENGTH as usize,
        mismatch(format!(
            "{:?} needs a body block of {} bytes but it is {block_length}",
            M::MESSAGE_TYPE,
            M::BLOCK_LENGTH
        ))
    );
    let block = take(&mut cur, block_length)?;
    let mut known = &block[..M::BLOCK_LENGTH as usize];
    let m = M::read_body(&mut known, &mut cur)?;
    ensure!(
        cur.is_empty(),
        mismatch(format!("{} bytes left after {:?}", cur.len(), M::MESSAGE_TYPE))
    );
    Ok(m)
}

/// Any message of the protocol.
#[derive(Clone, Debug, PartialEq, derive_more::From)]
pub enum Message {
    JoinRequest(JoinRequest),
    JoinResponse(JoinResponse),
    LeaveRequest(LeaveRequest),
    LeaveResponse(LeaveResponse),
    VoteRequest(VoteRequest),
    VoteResponse(VoteResponse),
    AppendRequest(AppendRequest),
    AppendResponse(AppendResponse),
    ErrorResponse(ErrorResponse),
}

impl Message {
    /// Decode any message, dispatching on the template id of the header.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut cur = bytes;
        let header = MessageHeader::read(&mut cur)?;
        let Some(message_type) = MessageType::from_template_id(header.template_id) else {
            bail!(mismatch(format!(
                "unknown template id {}",
                header.template_id
            )));
        };
        let m = match message_type {
            MessageType::JoinRequest => Self::JoinRequest(decode_body(&header, cur)?),
            MessageType::JoinResponse => Self::JoinResponse(decode_body(&header, cur)?),
            MessageType::LeaveRequest => Self::LeaveRequest(decode_body(&header, cur)?),
            MessageType::LeaveResponse => Self::LeaveResponse(decode_body(&header, cur)?),
            MessageType::VoteRequest => Self::VoteRequest(decode_body(&header, cur)?),
            MessageType::VoteResponse => Self::VoteResponse(decode_body(&header, cur)?),
            MessageType::AppendRequest => Self::AppendRequest(decode_body(&header, cur)?),
            MessageType::AppendResponse => Self::AppendResponse(decode_body(&header, cur)?),
            MessageType::ErrorResponse => Self::ErrorResponse(decode_body(&header, cur)?),
        };
        Ok(m)
    }

    pub fn encode(&self) -> Result<Bytes> {
        match self {
            Self::JoinRequest(m) => m.encode(),
            Self::JoinResponse(m) => m.encode(),
            Self::LeaveRequest(m) => m.encode(),
            Self::LeaveResponse(m) => m.encode(),
            Self::VoteRequest(m) => m.encode(),
            Self::VoteResponse(m) => m.encode(),
            Self::AppendRequest(m) => m.encode(),
            Self::AppendResponse(m) => m.encode(),
            Self::ErrorResponse(m) => m.encode(),
        }
    }

    pub fn message_type(&self) -> MessageType {
        match self {
            Self::JoinRequest(_) => MessageType::JoinRequest,
            Self::JoinResponse(_) => MessageType::JoinResponse,
            Self::LeaveRequest(_) => MessageType::LeaveRequest,
            Self::LeaveResponse(_) => MessageType::LeaveResponse,
            Self::VoteRequest(_) => MessageType::VoteRequest,
            Self::VoteResponse(_) => MessageType::VoteResponse,
            Self::AppendRequest(_) => MessageType::AppendRequest,
            Self::AppendResponse(_) => MessageType::AppendResponse,
            Self::ErrorResponse(_) => MessageType::ErrorResponse,
        }
    }

    /// Whether a node answers this message. Responses and errors are only read by requesters.
    pub fn is_request(&self) -> bool {
        matches!(
            self,
            Self::JoinRequest(_) | Self::LeaveRequest(_) | Self::VoteRequest(_) | Self::AppendRequest(_)
        )
    }

    /// Partition the message is addressed to. Error responses carry none.
    pub fn partition_id(&self) -> Option<PartitionId> {
        let id = match self {
            Self::JoinRequest(m) => m.id,
            Self::JoinResponse(m) => m.id,
            Self::LeaveRequest(m) => m.id,
            Self::LeaveResponse(m) => m.id,
            Self::VoteRequest(m) => m.id,
            Self::VoteResponse(m) => m.id,
            Self::AppendRequest(m) => m.id,
            Self::AppendResponse(m) => m.id,
            Self::ErrorResponse(_) => return None,
        };
        Some(id)
    }
}

/// Encode a member list on its own. Configuration entries carry this as their payload.
pub fn encode_members(members: &[Member]) -> Result<Bytes> {
    let mut buf = BytesMut::with_capacity(members_length(members));
    put_members(&mut buf, members)?;
    Ok(buf.freeze())
}

pub fn decode_members(bytes: &[u8]) -> Result<Vec<Member>> {
    let mut cur = bytes;
    let members = get_members(&mut cur)?;
    ensure!(
        cur.is_empty(),
        mismatch(format!("{} bytes left after member list", cur.len()))
    );
    Ok(members)
}

pub(crate) fn mismatch(msg: impl Into<String>) -> Error {
    Error::SchemaMismatch(msg.into())
}

pub(crate) fn take<'a>(buf: &mut &'a [u8], n: usize) -> Result<&'a [u8]> {
    let s: &'a [u8] = *buf;
    ensure!(
        s.len() >= n,
        mismatch(format!("need {n} bytes but {} remain", s.len()))
    );
    let (head, tail) = s.split_at(n);
    *buf = tail;
    Ok(head)
}

pub(crate) fn get_u8(buf: &mut &[u8]) -> Result<u8> {
    Ok(take(buf, 1)?[0])
}

pub(crate) fn get_u16(buf: &mut &[u8]) -> Result<u16> {
    Ok(take(buf, 2)?.get_u16_le())
}

pub(crate) fn get_u32(buf: &mut &[u8]) -> Result<u32> {
    Ok(take(buf, 4)?.get_u32_le())
}

pub(crate) fn get_i32(buf: &mut &[u8]) -> Result<i32> {
    Ok(take(buf, 4)?.get_i32_le())
}

pub(crate) fn get_i64(buf: &mut &[u8]) -> Result<i64> {
    Ok(take(buf, 8)?.get_i64_le())
}

pub(crate) fn get_u64(buf: &mut &[u8]) -> Result<u64> {
    Ok(take(buf, 8)?.get_u64_le())
}

pub(crate) fn put_bool(buf: &mut BytesMut, b: bool) {
    buf.put_u8(b as u8);
}

pub(crate) fn get_bool(buf: &mut &[u8]) -> Result<bool> {
    match get_u8(buf)? {
        0 => Ok(false),
        1 => Ok(true),
        x => bail!(mismatch(format!("{x} is not a boolean"))),
    }
}

pub(crate) fn string_length(s: &str) -> usize {
    STRING_HEADER_LENGTH + s.len()
}

fn too_long(what: &str, len: usize, max: usize) -> Error {
    Error::InvalidArgument(format!("{what} of {len} doesn't fit in the limit of {max}"))
}

pub(crate) fn put_string(buf: &mut BytesMut, s: &str) -> Result<()> {
    let n = u16::try_from(s.len()).map_err(|_| too_long("string", s.len(), u16::MAX as usize))?;
    buf.put_u16_le(n);
    buf.put_slice(s.as_bytes());
    Ok(())
}

pub(crate) fn get_string(buf: &mut &[u8]) -> Result<String> {
    let n = get_u16(buf)? as usize;
    let bin = take(buf, n)?;
    let s = std::str::from_utf8(bin).map_err(|e| mismatch(format!("bad utf-8 string: {e}")))?;
    Ok(s.to_owned())
}

pub(crate) fn data_length(data: &[u8]) -> usize {
    DATA_HEADER_LENGTH + data.len()
}

pub(crate) fn put_data(buf: &mut BytesMut, data: &[u8]) -> Result<()> {
    let n = u32::try_from(data.len())
        .map_err(|_| too_long("data", data.len(), u32::MAX as usize))?;
    buf.put_u32_le(n);
    buf.put_slice(data);
    Ok(())
}

pub(crate) fn get_data(buf: &mut &[u8]) -> Result<Bytes> {
    let n = get_u32(buf)? as usize;
    Ok(Bytes::copy_from_slice(take(buf, n)?))
}

pub(crate) fn put_group_header(buf: &mut BytesMut, block_length: u16, count: usize) -> Result<()> {
    let n = u16::try_from(count).map_err(|_| too_long("group", count, u16::MAX as usize))?;
    buf.put_u16_le(n);
    buf.put_u16_le(block_length);
    Ok(())
}

/// Read a group header and return `(count, element block length)`.
pub(crate) fn get_group_header(buf: &mut &[u8], known_block_length: u16) -> Result<(usize, usize)> {
    let count = get_u16(buf)? as usize;
    let block_length = get_u16(buf)?;
    ensure!(
        block_length >= known_block_length,
        mismatch(format!(
            "group element needs {known_block_length} bytes but it is {block_length}"
        ))
    );
    Ok((count, block_length as usize))
}

/// Split the next group element's block off `buf`, keeping only the known prefix.
pub(crate) fn take_element<'a>(
    buf: &mut &'a [u8],
    block_length: usize,
    known_block_length: u16,
) -> Result<&'a [u8]> {
    let block = take(buf, block_length)?;
    Ok(&block[..known_block_length as usize])
}

pub(crate) fn members_length(members: &[Member]) -> usize {
    GROUP_HEADER_LENGTH
        + members
            .iter()
            .map(|m| MEMBER_BLOCK_LENGTH as usize + string_length(&m.endpoint.host))
            .sum::<usize>()
}

pub(crate) fn put_members(buf: &mut BytesMut, members: &[Member]) -> Result<()> {
    put_group_header(buf, MEMBER_BLOCK_LENGTH, members.len())?;
    for m in members {
        buf.put_u16_le(m.endpoint.port);
        put_string(buf, &m.endpoint.host)?;
    }
    Ok(())
}

pub(crate) fn get_members(buf: &mut &[u8]) -> Result<Vec<Member>> {
    let (count, block_length) = get_group_header(buf, MEMBER_BLOCK_LENGTH)?;
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        let mut block = take_element(buf, block_length, MEMBER_BLOCK_LENGTH)?;
        let port = get_u16(&mut block)?;
        let host = get_string(buf)?;
        out.push(Member::new(Endpoint::new(host, port)));
    }
    Ok(out)
}
