use super::*;

/// Request to add `member` to the group of partition `id`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JoinRequest {
    pub id: PartitionId,
    pub term: Term,
    pub member: Member,
}

/// Request to remove `member` from the group of partition `id`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LeaveRequest {
    pub id: PartitionId,
    pub term: Term,
    pub member: Member,
}

/// Answer to a join request.
/// On success, the position and term of the configuration entry are set
/// and `members` is the new member list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JoinResponse {
    pub id: PartitionId,
    pub term: Term,
    pub succeeded: bool,
    pub configuration_entry_position: Position,
    pub configuration_entry_term: Term,
    pub members: Vec<Member>,
}

/// Answer to a leave request. Same shape as `JoinResponse`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LeaveResponse {
    pub id: PartitionId,
    pub term: Term,
    pub succeeded: bool,
    pub configuration_entry_position: Position,
    pub configuration_entry_term: Term,
    pub members: Vec<Member>,
}

// id, term, port
const MEMBER_REQUEST_BLOCK_LENGTH: u16 = 4 + 4 + 2;
// id, term, succeeded, configuration entry position, configuration entry term
const CONFIGURATION_RESPONSE_BLOCK_LENGTH: u16 = 4 + 4 + 1 + 8 + 4;

fn write_member_request(
    buf: &mut BytesMut,
    id: PartitionId,
    term: Term,
    member: &Member,
) -> Result<()> {
    buf.put_i32_le(id);
    buf.put_i32_le(term);
    buf.put_u16_le(member.endpoint.port);
    put_string(buf, &member.endpoint.host)
}

fn read_member_request(
    block: &mut &[u8],
    rest: &mut &[u8],
) -> Result<(PartitionId, Term, Member)> {
    let id = get_i32(block)?;
    let term = get_i32(block)?;
    let port = get_u16(block)?;
    let host = get_string(rest)?;
    Ok((id, term, Member::new(Endpoint::new(host, port))))
}

impl WireMessage for JoinRequest {
    const MESSAGE_TYPE: MessageType = MessageType::JoinRequest;
    const BLOCK_LENGTH: u16 = MEMBER_REQUEST_BLOCK_LENGTH;

    fn trailing_length(&self) -> usize {
        string_length(&self.member.endpoint.host)
    }

    fn write_body(&self, buf: &mut BytesMut) -> Result<()> {
        write_member_request(buf, self.id, self.term, &self.member)
    }

    fn read_body(block: &mut &[u8], rest: &mut &[u8]) -> Result<Self> {
        let (id, term, member) = read_member_request(block, rest)?;
        Ok(Self { id, term, member })
    }
}

impl WireMessage for LeaveRequest {
    const MESSAGE_TYPE: MessageType = MessageType::LeaveRequest;
    const BLOCK_LENGTH: u16 = MEMBER_REQUEST_BLOCK_LENGTH;

    fn trailing_length(&self) -> usize {
        string_length(&self.member.endpoint.host)
    }

    fn write_body(&self, buf: &mut BytesMut) -> Result<()> {
        write_member_request(buf, self.id, self.term, &self.member)
    }

    fn read_body(block: &mut &[u8], rest: &mut &[u8]) -> Result<Self> {
        let (id, term, member) = read_member_request(block, rest)?;
        Ok(Self { id, term, member })
    }
}

/// Fields shared by the join and leave responses.
struct ConfigurationResponse {
    id: PartitionId,
    term: Term,
    succeeded: bool,
    configuration_entry_position: Position,
    configuration_entry_term: Term,
    members: Vec<Member>,
}

impl ConfigurationResponse {
    fn read(block: &mut &[u8], rest: &mut &[u8]) -> Result<Self> {
        Ok(Self {
            id: get_i32(block)?,
            term: get_i32(block)?,
            succeeded: get_bool(block)?,
            configuration_entry_position: get_i64(block)?,
            configuration_entry_term: get_i32(block)?,
            members: get_members(rest)?,
        })
    }
}

macro_rules! configuration_response {
    ($name:ident, $message_type:expr) => {
        impl Default for $name {
            fn default() -> Self {
                Self {
                    id: NULL_PARTITION_ID,
                    term: NULL_TERM,
                    succeeded: false,
                    configuration_entry_position: NULL_POSITION,
                    configuration_entry_term: NULL_TERM,
                    members: vec![],
                }
            }
        }

        impl $name {
            /// Back to the null values.
            pub fn reset(&mut self) {
                *self = Self::default();
            }

            /// Position and term of the configuration entry if one was appended.
            pub fn configuration_entry(&self) -> Option<(Position, Term)> {
                if self.configuration_entry_position == NULL_POSITION {
                    None
                } else {
                    Some((
                        self.configuration_entry_position,
                        self.configuration_entry_term,
                    ))
                }
            }
        }

        impl WireMessage for $name {
            const MESSAGE_TYPE: MessageType = $message_type;
            const BLOCK_LENGTH: u16 = CONFIGURATION_RESPONSE_BLOCK_LENGTH;

            fn trailing_length(&self) -> usize {
                members_length(&self.members)
            }

            fn write_body(&self, buf: &mut BytesMut) -> Result<()> {
                buf.put_i32_le(self.id);
                buf.put_i32_le(self.term);
                put_bool(buf, self.succeeded);
                buf.put_i64_le(self.configuration_entry_position);
                buf.put_i32_le(self.configuration_entry_term);
                put_members(buf, &self.members)
            }

            fn read_body(block: &mut &[u8], rest: &mut &[u8]) -> Result<Self> {
                let x = ConfigurationResponse::read(block, rest)?;
                Ok(Self {
                    id: x.id,
                    term: x.term,
                    succeeded: x.succeeded,
                    configuration_entry_position: x.configuration_entry_position,
                    configuration_entry_term: x.configuration_entry_term,
                    members: x.members,
                })
            }
        }
    };
}

configuration_response!(JoinResponse, MessageType::JoinResponse);
configuration_response!(LeaveResponse, MessageType::LeaveResponse);
