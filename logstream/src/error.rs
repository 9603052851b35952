use super::*;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("request is invalid: {0}")]
    Validation(String),
    #[error("message does not match the schema: {0}")]
    SchemaMismatch(String),
    #[error("entry not found at position {0}")]
    NotFound(Position),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("log stream is full")]
    StorageFull,
    #[error("storage failure: {0}")]
    Storage(String),
    #[error("snapshot is corrupt: {0}")]
    CorruptSnapshot(String),
    #[error("rejected by a member at term {term}")]
    ConsensusRejection { term: Term },
    #[error("not the leader (leader={leader:?})")]
    NotLeader { leader: Option<Endpoint> },
    #[error("another configuration change is in progress")]
    ConfigurationChangeInProgress,
    #[error("partition not found (partition_id={0})")]
    PartitionNotFound(PartitionId),
    #[error("timed out: {0}")]
    Timeout(String),
    #[error("endpoint not reachable ({0})")]
    Unreachable(Endpoint),
    #[error("remote failure (component={component_code}, detail={detail_code}): {message}")]
    Remote {
        component_code: u16,
        detail_code: u16,
        message: String,
    },
}

/// Component and detail codes carried by an error response.
pub mod codes {
    pub const COMPONENT_LOG: u16 = 1;
    pub const COMPONENT_SNAPSHOT: u16 = 2;
    pub const COMPONENT_RAFT: u16 = 3;
    pub const COMPONENT_TRANSPORT: u16 = 4;

    pub const VALIDATION: u16 = 1;
    pub const SCHEMA_MISMATCH: u16 = 2;
    pub const NOT_FOUND: u16 = 3;
    pub const INVALID_ARGUMENT: u16 = 4;
    pub const STORAGE_FULL: u16 = 5;
    pub const STORAGE: u16 = 6;
    pub const CORRUPT_SNAPSHOT: u16 = 7;
    pub const CONSENSUS_REJECTION: u16 = 8;
    pub const NOT_LEADER: u16 = 9;
    pub const CONFIGURATION_CHANGE_IN_PROGRESS: u16 = 10;
    pub const PARTITION_NOT_FOUND: u16 = 11;
    pub const TIMEOUT: u16 = 12;
    pub const UNREACHABLE: u16 = 13;
    pub const INTERNAL: u16 = 14;
}

impl Error {
    /// (component code, detail code) of this error.
    pub fn codes(&self) -> (u16, u16) {
        use codes::*;
        match self {
            Error::Validation(_) => (COMPONENT_RAFT, VALIDATION),
            Error::SchemaMismatch(_) => (COMPONENT_TRANSPORT, SCHEMA_MISMATCH),
            Error::NotFound(_) => (COMPONENT_LOG, NOT_FOUND),
            Error::InvalidArgument(_) => (COMPONENT_LOG, INVALID_ARGUMENT),
            Error::StorageFull => (COMPONENT_LOG, STORAGE_FULL),
            Error::Storage(_) => (COMPONENT_LOG, STORAGE),
            Error::CorruptSnapshot(_) => (COMPONENT_SNAPSHOT, CORRUPT_SNAPSHOT),
            Error::ConsensusRejection { .. } => (COMPONENT_RAFT, CONSENSUS_REJECTION),
            Error::NotLeader { .. } => (COMPONENT_RAFT, NOT_LEADER),
            Error::ConfigurationChangeInProgress => {
                (COMPONENT_RAFT, CONFIGURATION_CHANGE_IN_PROGRESS)
            }
            Error::PartitionNotFound(_) => (COMPONENT_RAFT, PARTITION_NOT_FOUND),
            Error::Timeout(_) => (COMPONENT_TRANSPORT, TIMEOUT),
            Error::Unreachable(_) => (COMPONENT_TRANSPORT, UNREACHABLE),
            Error::Remote {
                component_code,
                detail_code,
                ..
            } => (*component_code, *detail_code),
        }
    }

    /// Codes of any error. Errors outside of this taxonomy are internal failures of Raft.
    pub fn codes_of(e: &anyhow::Error) -> (u16, u16) {
        match e.downcast_ref::<Error>() {
            Some(e) => e.codes(),
            None => (codes::COMPONENT_RAFT, codes::INTERNAL),
        }
    }
}

/// Map a failure of redb into the storage error.
pub(crate) fn storage_error(e: impl std::fmt::Display) -> anyhow::Error {
    anyhow::Error::new(Error::Storage(e.to_string()))
}
