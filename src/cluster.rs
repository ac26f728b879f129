//! In-process cluster bootstrap: one tokio task per node, sharing nothing
//! but the loopback network.

use std::collections::BTreeMap;
use std::net::SocketAddr;

use log::{info, warn};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::network::{ClusterRegistry, Transport, TransportStats};
use crate::raft::{NodeId, NodeRole, NodeStatus, Raft, RaftConfig, RaftError};

struct NodeHandle {
    addr: SocketAddr,
    status: watch::Receiver<NodeStatus>,
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<TransportStats>>,
}

pub struct LocalCluster {
    nodes: BTreeMap<NodeId, NodeHandle>,
}

impl LocalCluster {
    /// Binds every node at its configured address. Any bind failure aborts
    /// the whole startup.
    pub async fn start(config: &Config) -> Result<Self, RaftError> {
        config.validate()?;
        let registry = config.registry()?;

        let mut nodes = Vec::with_capacity(registry.len());
        for node_id in registry.ids() {
            let raft = Raft::bind(config.raft_config(node_id), registry.clone()).await?;
            nodes.push(raft);
        }
        Ok(Self::spawn(nodes))
    }

    /// Starts `size` nodes on OS-assigned loopback ports. `timing` supplies the
    /// timeouts; its id and peers are replaced per node.
    pub async fn start_ephemeral(size: u64, timing: &RaftConfig) -> Result<Self, RaftError> {
        let mut transports = Vec::with_capacity(size as usize);
        for node_id in 0..size {
            let transport = Transport::bind(SocketAddr::from(([127, 0, 0, 1], 0))).await?;
            transports.push((node_id, transport));
        }

        let registry = ClusterRegistry::from_addresses(
            transports.iter().map(|(id, t)| (*id, t.local_addr())),
        )?;

        let mut nodes = Vec::with_capacity(transports.len());
        for (node_id, transport) in transports {
            let mut config = timing.clone();
            config.node_id = node_id;
            config.peers.clear();
            for peer_id in registry.ids() {
                config.add_peer(peer_id);
            }
            nodes.push(Raft::with_transport(config, registry.clone(), transport)?);
        }
        Ok(Self::spawn(nodes))
    }

    fn spawn(nodes: Vec<Raft>) -> Self {
        let nodes = nodes
            .into_iter()
            .map(|raft| {
                let (shutdown, shutdown_rx) = watch::channel(false);
                let id = raft.id();
                let addr = raft.local_addr();
                let status = raft.subscribe();
                let task = tokio::spawn(raft.run(shutdown_rx));
                let handle = NodeHandle {
                    addr,
                    status,
                    shutdown,
                    task: Some(task),
                };
                (id, handle)
            })
            .collect::<BTreeMap<_, _>>();

        info!("Started cluster of {} nodes", nodes.len());
        Self { nodes }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn address_of(&self, node_id: NodeId) -> Option<SocketAddr> {
        self.nodes.get(&node_id).map(|node| node.addr)
    }

    pub fn status(&self, node_id: NodeId) -> Option<NodeStatus> {
        self.nodes.get(&node_id).map(|node| *node.status.borrow())
    }

    /// Status channel of one node, for callers that want to await changes.
    pub fn watch(&self, node_id: NodeId) -> Option<watch::Receiver<NodeStatus>> {
        self.nodes.get(&node_id).map(|node| node.status.clone())
    }

    /// Latest status of every node that is still running.
    pub fn statuses(&self) -> Vec<NodeStatus> {
        self.nodes
            .values()
            .filter(|node| node.task.is_some())
            .map(|node| *node.status.borrow())
            .collect()
    }

    /// The running leader with the highest term, if any.
    pub fn leader(&self) -> Option<NodeStatus> {
        self.statuses()
            .into_iter()
            .filter(|status| status.role == NodeRole::Leader)
            .max_by_key(|status| status.term)
    }

    /// Stops one node as if it had crashed. Returns its transport counters.
    pub async fn stop_node(&mut self, node_id: NodeId) -> Option<TransportStats> {
        let node = self.nodes.get_mut(&node_id)?;
        let task = node.task.take()?;
        let _ = node.shutdown.send(true);
        match task.await {
            Ok(stats) => {
                info!("Node {node_id} stopped");
                Some(stats)
            }
            Err(e) => {
                warn!("Node {node_id} task failed: {e}");
                None
            }
        }
    }

    pub async fn shutdown(mut self) {
        let ids: Vec<NodeId> = self.nodes.keys().copied().collect();
        for node in self.nodes.values() {
            let _ = node.shutdown.send(true);
        }
        for node_id in ids {
            self.stop_node(node_id).await;
        }
        info!("Cluster stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn fast_timing() -> RaftConfig {
        RaftConfig::new(0)
            .with_timeouts(100, 200, 30)
            .with_poll_interval(10)
    }

    #[tokio::test]
    async fn ephemeral_cluster_registers_every_node() {
        let cluster = LocalCluster::start_ephemeral(3, &fast_timing()).await.unwrap();
        assert_eq!(cluster.len(), 3);
        for id in 0..3 {
            let addr = cluster.address_of(id).expect("address");
            assert!(addr.ip().is_loopback());
            assert_ne!(addr.port(), 0);
            assert_eq!(cluster.status(id).unwrap().node_id, id);
        }
        cluster.shutdown().await;
    }

    #[tokio::test]
    async fn start_fails_when_a_port_is_taken() {
        let blocker = Transport::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
            .await
            .unwrap();
        let config = Config {
            cluster_size: 2,
            base_port: blocker.local_addr().port(),
            election_timeout_min_ms: 100,
            election_timeout_max_ms: 200,
            heartbeat_interval_ms: 30,
            poll_interval_ms: 10,
            ..Config::default()
        };

        let err = LocalCluster::start(&config).await.err().expect("bind conflict");
        assert!(matches!(err, RaftError::Network(_)));
    }

    #[tokio::test]
    async fn start_refuses_a_wildcard_host() {
        let config = Config {
            host: "0.0.0.0".parse().unwrap(),
            ..Config::default()
        };
        let err = LocalCluster::start(&config).await.err().expect("wildcard host");
        assert!(matches!(err, RaftError::InvalidConfig(_)));
    }

    #[tokio::test]
    async fn stopped_nodes_leave_the_status_list() {
        let mut cluster = LocalCluster::start_ephemeral(3, &fast_timing()).await.unwrap();
        assert!(cluster.stop_node(1).await.is_some());
        assert!(cluster.stop_node(1).await.is_none());

        let ids: Vec<NodeId> = cluster.statuses().iter().map(|s| s.node_id).collect();
        assert_eq!(ids, vec![0, 2]);

        tokio::time::sleep(Duration::from_millis(10)).await;
        cluster.shutdown().await;
    }
}
