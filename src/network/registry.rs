use std::collections::BTreeMap;
use std::net::{IpAddr, SocketAddr};

use crate::raft::{NodeId, RaftError};

/// A cluster member and the address it listens on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerAddress {
    pub node_id: NodeId,
    pub address: SocketAddr,
}

/// Static membership: node id to listening address, fixed at startup.
#[derive(Debug, Clone)]
pub struct ClusterRegistry {
    nodes: BTreeMap<NodeId, SocketAddr>,
}

impl ClusterRegistry {
    /// Node `i` of `cluster_size` listens on `host:(base_port + i)`.
    pub fn from_base_port(
        host: IpAddr,
        base_port: u16,
        cluster_size: u64,
    ) -> Result<Self, RaftError> {
        if cluster_size == 0 {
            return Err(RaftError::InvalidConfig(
                "cluster must have at least one node".to_string(),
            ));
        }
        check_routable(host)?;

        let mut nodes = BTreeMap::new();
        for node_id in 0..cluster_size {
            let port = u16::try_from(u64::from(base_port) + node_id).map_err(|_| {
                RaftError::InvalidConfig(format!(
                    "port for node {node_id} overflows (base port {base_port}, {cluster_size} nodes)"
                ))
            })?;
            nodes.insert(node_id, SocketAddr::new(host, port));
        }
        Ok(Self { nodes })
    }

    pub fn from_addresses<I>(addresses: I) -> Result<Self, RaftError>
    where
        I: IntoIterator<Item = (NodeId, SocketAddr)>,
    {
        let mut nodes = BTreeMap::new();
        for (node_id, address) in addresses {
            check_routable(address.ip())?;
            if nodes.insert(node_id, address).is_some() {
                return Err(RaftError::InvalidConfig(format!(
                    "node {node_id} registered twice"
                )));
            }
        }
        if nodes.is_empty() {
            return Err(RaftError::InvalidConfig(
                "cluster must have at least one node".to_string(),
            ));
        }
        Ok(Self { nodes })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.keys().copied()
    }

    pub fn contains(&self, node_id: NodeId) -> bool {
        self.nodes.contains_key(&node_id)
    }

    pub fn address_of(&self, node_id: NodeId) -> Option<SocketAddr> {
        self.nodes.get(&node_id).copied()
    }

    /// Reverse lookup of a datagram's source address.
    pub fn node_at(&self, address: SocketAddr) -> Option<NodeId> {
        self.nodes
            .iter()
            .find(|(_, addr)| **addr == address)
            .map(|(id, _)| *id)
    }

    pub fn peers_of(&self, node_id: NodeId) -> Vec<PeerAddress> {
        self.nodes
            .iter()
            .filter(|(id, _)| **id != node_id)
            .map(|(id, addr)| PeerAddress {
                node_id: *id,
                address: *addr,
            })
            .collect()
    }
}

/// Senders are identified by their source address, so every registered
/// address must be one a peer can actually send from.
fn check_routable(host: IpAddr) -> Result<(), RaftError> {
    if host.is_unspecified() {
        return Err(RaftError::InvalidConfig(format!(
            "host {host} is a wildcard address; use the address peers send from"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

    #[test]
    fn addresses_derive_from_base_port() {
        let registry = ClusterRegistry::from_base_port(LOCALHOST, 5000, 3).unwrap();
        assert_eq!(registry.len(), 3);
        assert_eq!(
            registry.address_of(2),
            Some("127.0.0.1:5002".parse().unwrap())
        );
        assert_eq!(registry.address_of(3), None);
        assert_eq!(registry.node_at("127.0.0.1:5001".parse().unwrap()), Some(1));
        assert_eq!(registry.node_at("127.0.0.1:6001".parse().unwrap()), None);
    }

    #[test]
    fn peers_exclude_self() {
        let registry = ClusterRegistry::from_base_port(LOCALHOST, 5000, 3).unwrap();
        let peers: Vec<NodeId> = registry.peers_of(1).iter().map(|p| p.node_id).collect();
        assert_eq!(peers, vec![0, 2]);
        assert_eq!(registry.ids().collect::<Vec<_>>(), vec![0, 1, 2]);
    }

    #[test]
    fn port_overflow_is_rejected() {
        let result = ClusterRegistry::from_base_port(LOCALHOST, 65534, 3);
        assert!(matches!(result, Err(RaftError::InvalidConfig(_))));
    }

    #[test]
    fn empty_or_duplicate_membership_is_rejected() {
        assert!(ClusterRegistry::from_base_port(LOCALHOST, 5000, 0).is_err());
        assert!(ClusterRegistry::from_addresses(Vec::new()).is_err());

        let addr: SocketAddr = "127.0.0.1:7000".parse().unwrap();
        assert!(ClusterRegistry::from_addresses(vec![(1, addr), (1, addr)]).is_err());
    }

    #[test]
    fn wildcard_hosts_are_rejected() {
        let v4 = ClusterRegistry::from_base_port(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 5000, 3);
        assert!(matches!(v4, Err(RaftError::InvalidConfig(_))));

        let v6: SocketAddr = "[::]:7000".parse().unwrap();
        assert!(ClusterRegistry::from_addresses(vec![(0, v6)]).is_err());
    }
}
