use std::collections::BTreeSet;
use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use super::NodeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeRole {
    Follower,
    Candidate,
    Leader,
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeRole::Follower => "follower",
            NodeRole::Candidate => "candidate",
            NodeRole::Leader => "leader",
        };
        f.write_str(name)
    }
}

/// Election state of a single node. Owned and mutated only by that node's
/// driver loop.
#[derive(Debug, Clone)]
pub struct NodeState {
    pub node_id: NodeId,
    pub role: NodeRole,
    pub current_term: u64,
    pub voted_for: Option<NodeId>,
    /// Distinct voters that granted this node a vote in `current_term`.
    pub votes: BTreeSet<NodeId>,
    pub leader_id: Option<NodeId>,
    pub election_deadline: Instant,
    pub last_heartbeat_sent: Option<Instant>,
}

impl NodeState {
    pub fn new(node_id: NodeId, election_deadline: Instant) -> Self {
        Self {
            node_id,
            role: NodeRole::Follower,
            current_term: 0,
            voted_for: None,
            votes: BTreeSet::new(),
            leader_id: None,
            election_deadline,
            last_heartbeat_sent: None,
        }
    }

    pub fn votes_received(&self) -> usize {
        self.votes.len()
    }
}

/// Point-in-time view of a node, published by the driver loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStatus {
    pub node_id: NodeId,
    pub role: NodeRole,
    pub term: u64,
    pub voted_for: Option<NodeId>,
    pub leader_id: Option<NodeId>,
}

impl From<&NodeState> for NodeStatus {
    fn from(state: &NodeState) -> Self {
        Self {
            node_id: state.node_id,
            role: state.role,
            term: state.current_term,
            voted_for: state.voted_for,
            leader_id: state.leader_id,
        }
    }
}

/// Log prefix identifying a node, its term and its role.
pub(crate) struct Tag<'a>(pub &'a NodeState);

impl fmt::Display for Tag<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[node {} | term {} | {}]",
            self.0.node_id, self.0.current_term, self.0.role
        )
    }
}
