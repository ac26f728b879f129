use std::fs;
use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::network::ClusterRegistry;
use crate::raft::{NodeId, RaftConfig, RaftError};

/// Cluster-wide startup configuration. Missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub cluster_size: u64,
    pub host: IpAddr,
    pub base_port: u16,
    pub election_timeout_min_ms: u64,
    pub election_timeout_max_ms: u64,
    pub heartbeat_interval_ms: u64,
    pub poll_interval_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cluster_size: 3,
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            base_port: 5000,
            election_timeout_min_ms: 1500,
            election_timeout_max_ms: 3000,
            heartbeat_interval_ms: 500,
            poll_interval_ms: 100,
        }
    }
}

impl Config {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, RaftError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|e| {
            RaftError::InvalidConfig(format!("cannot read {}: {e}", path.display()))
        })?;
        serde_json::from_str(&raw)
            .map_err(|e| RaftError::InvalidConfig(format!("cannot parse {}: {e}", path.display())))
    }

    pub fn validate(&self) -> Result<(), RaftError> {
        self.registry()?;
        self.raft_config(0).validate()
    }

    pub fn registry(&self) -> Result<ClusterRegistry, RaftError> {
        ClusterRegistry::from_base_port(self.host, self.base_port, self.cluster_size)
    }

    /// Per-node view with every other cluster member as a peer.
    pub fn raft_config(&self, node_id: NodeId) -> RaftConfig {
        let mut config = RaftConfig::new(node_id)
            .with_timeouts(
                self.election_timeout_min_ms,
                self.election_timeout_max_ms,
                self.heartbeat_interval_ms,
            )
            .with_poll_interval(self.poll_interval_ms);
        for peer_id in 0..self.cluster_size {
            config.add_peer(peer_id);
        }
        config
    }
}
