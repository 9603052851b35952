use super::*;

pub mod bootstrap;
pub mod receive_append_request;
pub mod receive_vote_request;
pub mod try_promote;
pub mod try_stepdown;

pub mod advance_commit;
pub mod advance_replication;
pub mod change_membership;
pub mod set_membership;
