use std::time::Duration;

use super::{NodeId, RaftError};

/// Per-node view of the cluster configuration. Timings are in milliseconds.
#[derive(Debug, Clone)]
pub struct RaftConfig {
    pub node_id: NodeId,
    pub peers: Vec<NodeId>,
    pub election_timeout_min: u64,
    pub election_timeout_max: u64,
    pub heartbeat_interval: u64,
    pub poll_interval: u64,
}

impl RaftConfig {
    pub fn new(node_id: NodeId) -> Self {
        Self {
            node_id,
            peers: Vec::new(),
            election_timeout_min: 1500,
            election_timeout_max: 3000,
            heartbeat_interval: 500,
            poll_interval: 100,
        }
    }

    pub fn add_peer(&mut self, peer_id: NodeId) {
        if peer_id != self.node_id && !self.peers.contains(&peer_id) {
            self.peers.push(peer_id);
        }
    }

    pub fn with_timeouts(mut self, min_ms: u64, max_ms: u64, heartbeat_ms: u64) -> Self {
        self.election_timeout_min = min_ms;
        self.election_timeout_max = max_ms;
        self.heartbeat_interval = heartbeat_ms;
        self
    }

    pub fn with_poll_interval(mut self, poll_ms: u64) -> Self {
        self.poll_interval = poll_ms;
        self
    }

    /// Number of voting members, this node included.
    pub fn cluster_size(&self) -> usize {
        self.peers.len() + 1
    }

    /// Votes needed to win an election: `⌈(N+1)/2⌉`.
    pub fn quorum(&self) -> usize {
        self.cluster_size() / 2 + 1
    }

    pub fn heartbeat(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval)
    }

    pub fn poll(&self) -> Duration {
        Duration::from_millis(self.poll_interval)
    }

    pub fn validate(&self) -> Result<(), RaftError> {
        if self.election_timeout_min == 0 {
            return Err(RaftError::InvalidConfig(
                "election timeout minimum must be positive".to_string(),
            ));
        }
        if self.election_timeout_min >= self.election_timeout_max {
            return Err(RaftError::InvalidConfig(format!(
                "election timeout range [{}, {}] ms must not be empty or a single value",
                self.election_timeout_min, self.election_timeout_max
            )));
        }
        if self.heartbeat_interval == 0 || self.heartbeat_interval >= self.election_timeout_min {
            return Err(RaftError::InvalidConfig(format!(
                "heartbeat interval {} ms must be positive and below the election timeout minimum {} ms",
                self.heartbeat_interval, self.election_timeout_min
            )));
        }
        if self.poll_interval == 0 {
            return Err(RaftError::InvalidConfig(
                "poll interval must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
