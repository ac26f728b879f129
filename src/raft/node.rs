use std::mem;
use std::time::Instant;

// Use external log crate
use ::log::{debug, info, warn};

use super::state::Tag;
use super::{ElectionTimer, Envelope, NodeId, NodeRole, NodeState, NodeStatus, RaftConfig, RaftMessage};

/// Leader-election state machine for one node.
///
/// The node performs no I/O. Timer evaluation and message handlers take the
/// current time and queue outbound messages in an outbox that the driver
/// drains with [`RaftNode::take_outbox`].
pub struct RaftNode {
    // Node identity
    id: NodeId,

    // Election state
    state: NodeState,

    // Configuration
    config: RaftConfig,
    timer: ElectionTimer,

    // Communication
    outbox: Vec<Envelope>,
}

impl RaftNode {
    pub fn new(config: RaftConfig, now: Instant) -> Self {
        let timer = ElectionTimer::new(&config);
        Self::with_timer(config, timer, now)
    }

    pub fn with_timer(config: RaftConfig, mut timer: ElectionTimer, now: Instant) -> Self {
        let deadline = timer.next_election_deadline(now);
        Self {
            id: config.node_id,
            state: NodeState::new(config.node_id, deadline),
            config,
            timer,
            outbox: Vec::new(),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn config(&self) -> &RaftConfig {
        &self.config
    }

    pub fn state(&self) -> &NodeState {
        &self.state
    }

    pub fn status(&self) -> NodeStatus {
        NodeStatus::from(&self.state)
    }

    pub fn role(&self) -> NodeRole {
        self.state.role
    }

    pub fn current_term(&self) -> u64 {
        self.state.current_term
    }

    pub fn is_leader(&self) -> bool {
        matches!(self.state.role, NodeRole::Leader)
    }

    pub fn take_outbox(&mut self) -> Vec<Envelope> {
        mem::take(&mut self.outbox)
    }

    /// Earliest instant at which [`RaftNode::tick`] has work to do.
    pub fn next_wakeup(&self) -> Instant {
        if self.is_leader() {
            self.timer
                .next_heartbeat(self.state.last_heartbeat_sent, self.state.election_deadline)
        } else {
            self.state.election_deadline
        }
    }

    /// Evaluates election and heartbeat timers.
    pub fn tick(&mut self, now: Instant) {
        if self.is_leader() {
            if self.timer.heartbeat_due(self.state.last_heartbeat_sent, now) {
                self.send_heartbeats(now);
            }
        } else if now >= self.state.election_deadline {
            self.start_election(now);
        }
    }

    pub fn start_election(&mut self, now: Instant) {
        // Increment current term and vote for self
        let Some(term) = self.state.current_term.checked_add(1) else {
            warn!(
                "{} Term space exhausted, not starting an election",
                Tag(&self.state)
            );
            self.reset_election_deadline(now);
            return;
        };
        self.state.current_term = term;
        self.state.role = NodeRole::Candidate;
        self.state.voted_for = Some(self.id);
        self.state.leader_id = None;
        self.state.votes.clear();
        self.state.votes.insert(self.id);

        self.reset_election_deadline(now);

        info!(
            "{} Election timeout, starting election and voting for self",
            Tag(&self.state)
        );

        self.broadcast(RaftMessage::RequestVote {
            term: self.state.current_term,
            candidate_id: self.id,
        });

        // A single-node cluster has already won
        if self.state.votes_received() >= self.config.quorum() {
            self.become_leader(now);
        }
    }

    pub fn handle_message(&mut self, from: NodeId, message: RaftMessage, now: Instant) {
        debug!("{} Received {} from node {}", Tag(&self.state), message.kind(), from);

        match message {
            RaftMessage::RequestVote { term, candidate_id } => {
                self.handle_request_vote(from, term, candidate_id, now)
            }
            RaftMessage::RequestVoteResponse { term, vote_granted } => {
                self.handle_request_vote_response(from, term, vote_granted, now)
            }
            RaftMessage::AppendEntries { term, leader_id } => {
                self.handle_append_entries(from, term, leader_id, now)
            }
            RaftMessage::AppendEntriesResponse { term, success } => {
                self.handle_append_entries_response(from, term, success, now)
            }
        }
    }

    fn handle_request_vote(&mut self, from: NodeId, term: u64, candidate_id: NodeId, now: Instant) {
        if term < self.state.current_term {
            debug!(
                "{} Rejecting vote for node {candidate_id}, its term {term} is stale",
                Tag(&self.state)
            );
            self.send(
                from,
                RaftMessage::RequestVoteResponse {
                    term: self.state.current_term,
                    vote_granted: false,
                },
            );
            return;
        }

        self.observe_term(term, now);

        let vote_granted = match self.state.voted_for {
            None => true,
            Some(voted) => voted == candidate_id,
        };

        if vote_granted {
            self.state.voted_for = Some(candidate_id);
            self.reset_election_deadline(now);
            info!("{} Voting for node {candidate_id}", Tag(&self.state));
        } else {
            debug!(
                "{} Already voted this term, not voting for node {candidate_id}",
                Tag(&self.state)
            );
        }

        self.send(
            from,
            RaftMessage::RequestVoteResponse {
                term: self.state.current_term,
                vote_granted,
            },
        );
    }

    fn handle_request_vote_response(
        &mut self,
        from: NodeId,
        term: u64,
        vote_granted: bool,
        now: Instant,
    ) {
        if self.observe_term(term, now) {
            return;
        }

        // Only a candidate counts votes, and only for the election it is running
        if self.state.role != NodeRole::Candidate || term != self.state.current_term {
            return;
        }

        if vote_granted && self.state.votes.insert(from) {
            info!(
                "{} Vote granted by node {from}, {} of {} needed",
                Tag(&self.state),
                self.state.votes_received(),
                self.config.quorum()
            );
            if self.state.votes_received() >= self.config.quorum() {
                self.become_leader(now);
            }
        }
    }

    fn handle_append_entries(&mut self, from: NodeId, term: u64, leader_id: NodeId, now: Instant) {
        if term < self.state.current_term {
            debug!(
                "{} Rejecting heartbeat from stale leader {leader_id} (term {term})",
                Tag(&self.state)
            );
            self.send(
                from,
                RaftMessage::AppendEntriesResponse {
                    term: self.state.current_term,
                    success: false,
                },
            );
            return;
        }

        self.observe_term(term, now);

        if self.state.role != NodeRole::Follower {
            info!(
                "{} Accepting node {leader_id} as leader, stepping down",
                Tag(&self.state)
            );
        } else if self.state.leader_id != Some(leader_id) {
            info!("{} Following leader {leader_id}", Tag(&self.state));
        }

        self.state.role = NodeRole::Follower;
        self.state.votes.clear();
        self.state.last_heartbeat_sent = None;
        self.state.leader_id = Some(leader_id);
        self.reset_election_deadline(now);

        self.send(
            from,
            RaftMessage::AppendEntriesResponse {
                term: self.state.current_term,
                success: true,
            },
        );
    }

    fn handle_append_entries_response(&mut self, from: NodeId, term: u64, success: bool, now: Instant) {
        // Heartbeats carry no entries, so there is nothing to track on success
        if !self.observe_term(term, now) && !success {
            debug!(
                "{} Heartbeat rejected by node {from} at term {term}",
                Tag(&self.state)
            );
        }
    }

    /// Adopts `term` if it is newer than ours, reverting to follower.
    /// Returns whether the term changed.
    fn observe_term(&mut self, term: u64, now: Instant) -> bool {
        if term <= self.state.current_term {
            return false;
        }

        let was_leader = self.is_leader();
        info!(
            "{} Observed higher term {term}, reverting to follower",
            Tag(&self.state)
        );

        self.state.current_term = term;
        self.state.voted_for = None;
        self.state.leader_id = None;
        self.state.role = NodeRole::Follower;
        self.state.votes.clear();
        self.state.last_heartbeat_sent = None;

        // Leaders keep no live election deadline
        if was_leader {
            self.reset_election_deadline(now);
        }
        true
    }

    fn become_leader(&mut self, now: Instant) {
        if self.state.role != NodeRole::Candidate {
            return;
        }

        self.state.role = NodeRole::Leader;
        self.state.leader_id = Some(self.id);
        info!(
            "{} Became leader with {} votes",
            Tag(&self.state),
            self.state.votes_received()
        );

        // Assert leadership right away
        self.send_heartbeats(now);
    }

    fn send_heartbeats(&mut self, now: Instant) {
        debug!("{} Sending heartbeats to all followers", Tag(&self.state));
        self.broadcast(RaftMessage::AppendEntries {
            term: self.state.current_term,
            leader_id: self.id,
        });
        self.state.last_heartbeat_sent = Some(now);
    }

    fn reset_election_deadline(&mut self, now: Instant) {
        self.state.election_deadline = self.timer.next_election_deadline(now);
    }

    fn broadcast(&mut self, message: RaftMessage) {
        for &peer_id in &self.config.peers {
            self.outbox.push(Envelope {
                to: peer_id,
                message,
            });
        }
    }

    fn send(&mut self, to: NodeId, message: RaftMessage) {
        self.outbox.push(Envelope { to, message });
    }
}
