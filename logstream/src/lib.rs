#![deny(unused_must_use)]

mod error;
pub use error::{codes, Error};
use error::storage_error;

/// Binary codec of the messages exchanged between members.
pub mod codec;

/// Configuration of `RaftProcess`.
pub mod config;
pub use config::RaftConfig;

/// Append-only, position-addressed event log on redb.
pub mod log_storage;

/// Periodic snapshots of materialized state and recovery from them.
pub mod snapshot;

/// Implementation of `RaftProcess`.
pub mod process;

/// Raft node hosting the processes of many partitions, and the transports between nodes.
pub mod node;

/// Handle to the log stream of a partition.
pub mod service;

use anyhow::{bail, ensure, Context, Result};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Byte offset of an entry within its log stream.
pub type Position = i64;

/// Election term.
/// In Raft, only one leader can be elected per a term.
pub type Term = i32;

/// Identifier of a partition. Every partition is an independent Raft group.
pub type PartitionId = i32;

/// Position of nothing. An empty log reports this as its last position.
pub const NULL_POSITION: Position = -1;

/// Term of nothing.
pub const NULL_TERM: Term = -1;

/// Partition id left unset.
pub const NULL_PARTITION_ID: PartitionId = -1;

/// Network address of a member.
#[derive(
    Serialize, Deserialize, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, derive_more::Display,
)]
#[display("{host}:{port}")]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

/// A participant of a Raft group. Members are identified by their endpoint.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Member {
    pub endpoint: Endpoint,
}

impl Member {
    pub fn new(endpoint: Endpoint) -> Self {
        Self { endpoint }
    }
}

impl From<Endpoint> for Member {
    fn from(endpoint: Endpoint) -> Self {
        Self::new(endpoint)
    }
}
