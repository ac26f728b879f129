mod config;
mod error;
mod message;
mod node;
mod state;
mod timer;

pub use self::config::RaftConfig;
pub use self::error::RaftError;
pub use self::message::{Envelope, RaftMessage};
pub use self::node::RaftNode;
pub use self::state::{NodeRole, NodeState, NodeStatus};
pub use self::timer::ElectionTimer;

use std::net::SocketAddr;
use std::time::Instant;

// Use external log crate
use ::log::{debug, info, warn};
use tokio::sync::watch;
use tokio::time::sleep_until;

use self::state::Tag;
use crate::network::{ClusterRegistry, Transport, TransportStats};

/// Cluster-unique node identifier.
pub type NodeId = u64;

/// Driver loop for one node: owns the state machine and its endpoint.
///
/// Each pass evaluates timers, flushes queued messages, then waits for
/// whichever comes first: shutdown, an inbound datagram, or the next
/// deadline (capped by the poll interval).
pub struct Raft {
    node: RaftNode,
    transport: Transport,
    registry: ClusterRegistry,
    status: watch::Sender<NodeStatus>,
}

impl Raft {
    /// Binds the node's registry address. Failing to bind is fatal.
    pub async fn bind(config: RaftConfig, registry: ClusterRegistry) -> Result<Self, RaftError> {
        let addr = registry
            .address_of(config.node_id)
            .ok_or(RaftError::UnknownNode(config.node_id))?;
        let transport = Transport::bind(addr).await?;
        Self::with_transport(config, registry, transport)
    }

    pub fn with_transport(
        config: RaftConfig,
        registry: ClusterRegistry,
        transport: Transport,
    ) -> Result<Self, RaftError> {
        config.validate()?;
        if !registry.contains(config.node_id) {
            return Err(RaftError::UnknownNode(config.node_id));
        }
        if let Some(&unknown) = config.peers.iter().find(|id| !registry.contains(**id)) {
            return Err(RaftError::UnknownNode(unknown));
        }

        let node = RaftNode::new(config, Instant::now());
        let (status, _) = watch::channel(node.status());
        Ok(Self {
            node,
            transport,
            registry,
            status,
        })
    }

    pub fn id(&self) -> NodeId {
        self.node.id()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.transport.local_addr()
    }

    /// Status snapshots, updated whenever role, term, vote or leader change.
    pub fn subscribe(&self) -> watch::Receiver<NodeStatus> {
        self.status.subscribe()
    }

    /// Runs until `shutdown` turns true or its sender is dropped.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> TransportStats {
        info!(
            "{} Listening on {}",
            Tag(self.node.state()),
            self.transport.local_addr()
        );
        let poll = self.node.config().poll();

        while !*shutdown.borrow() {
            let now = Instant::now();
            self.node.tick(now);
            self.flush();

            let wake = self.node.next_wakeup().min(now + poll);
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                received = self.transport.recv() => match received {
                    Ok((from, message)) => {
                        self.dispatch(from, message);
                        while let Some((from, message)) = self.transport.try_recv() {
                            self.dispatch(from, message);
                        }
                    }
                    Err(e) => {
                        warn!("{} Receive failed: {e}", Tag(self.node.state()));
                        // A failing socket resolves recv at once; wait out the deadline
                        if pause_until(wake, &mut shutdown).await {
                            break;
                        }
                    }
                },
                _ = sleep_until(wake.into()) => {}
            }
        }

        let stats = self.transport.stats();
        info!("{} Stopped, {stats:?}", Tag(self.node.state()));
        stats
    }

    fn dispatch(&mut self, from: SocketAddr, message: RaftMessage) {
        match self.registry.node_at(from) {
            Some(peer_id) => {
                self.node.handle_message(peer_id, message, Instant::now());
                self.flush();
            }
            None => debug!(
                "{} Dropping {} from unregistered address {from}",
                Tag(self.node.state()),
                message.kind()
            ),
        }
    }

    fn flush(&mut self) {
        for envelope in self.node.take_outbox() {
            match self.registry.address_of(envelope.to) {
                Some(addr) => {
                    if self.transport.send(addr, &envelope.message) {
                        debug!(
                            "{} Sent {} to node {}",
                            Tag(self.node.state()),
                            envelope.message.kind(),
                            envelope.to
                        );
                    }
                }
                None => warn!(
                    "{} No address for node {}, dropping {}",
                    Tag(self.node.state()),
                    envelope.to,
                    envelope.message.kind()
                ),
            }
        }

        let current = self.node.status();
        self.status.send_if_modified(|published| {
            if *published == current {
                false
            } else {
                *published = current;
                true
            }
        });
    }
}

/// Sleeps until `wake` unless shutdown is signalled first. Returns whether
/// the driver should stop.
async fn pause_until(wake: Instant, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        changed = shutdown.changed() => changed.is_err() || *shutdown.borrow(),
        _ = sleep_until(wake.into()) => false,
    }
}
