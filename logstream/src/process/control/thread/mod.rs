use super::*;

pub mod advance_commit;
pub mod election;
pub mod replication;
