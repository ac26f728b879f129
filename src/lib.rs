// Election core
pub mod raft;

// Datagram transport, codec and static membership
pub mod network;

// Bootstrap
pub mod cluster;
pub mod config;

// Public exports
pub use cluster::LocalCluster;
pub use config::Config;
pub use raft::{NodeId, NodeRole, NodeStatus, Raft, RaftConfig, RaftError, RaftMessage, RaftNode};
