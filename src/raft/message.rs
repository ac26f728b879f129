use serde::{Deserialize, Serialize};

use super::NodeId;

/// Messages exchanged between nodes, one per datagram.
///
/// The serialized form is a JSON object tagged by `"type"` with camelCase
/// field names, e.g. `{"type":"RequestVote","term":1,"candidateId":0}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RaftMessage {
    // Leader election messages
    #[serde(rename_all = "camelCase")]
    RequestVote { term: u64, candidate_id: NodeId },
    #[serde(rename_all = "camelCase")]
    RequestVoteResponse { term: u64, vote_granted: bool },

    // Heartbeats carry no entries
    #[serde(rename_all = "camelCase")]
    AppendEntries { term: u64, leader_id: NodeId },
    #[serde(rename_all = "camelCase")]
    AppendEntriesResponse { term: u64, success: bool },
}

impl RaftMessage {
    pub const KINDS: [&'static str; 4] = [
        "RequestVote",
        "RequestVoteResponse",
        "AppendEntries",
        "AppendEntriesResponse",
    ];

    pub fn term(&self) -> u64 {
        match *self {
            RaftMessage::RequestVote { term, .. }
            | RaftMessage::RequestVoteResponse { term, .. }
            | RaftMessage::AppendEntries { term, .. }
            | RaftMessage::AppendEntriesResponse { term, .. } => term,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            RaftMessage::RequestVote { .. } => Self::KINDS[0],
            RaftMessage::RequestVoteResponse { .. } => Self::KINDS[1],
            RaftMessage::AppendEntries { .. } => Self::KINDS[2],
            RaftMessage::AppendEntriesResponse { .. } => Self::KINDS[3],
        }
    }
}

/// An outbound message addressed to a cluster member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Envelope {
    pub to: NodeId,
    pub message: RaftMessage,
}
