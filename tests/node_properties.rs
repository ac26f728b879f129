use std::collections::HashMap;
use std::time::{Duration, Instant};

use proptest::prelude::*;
use raftlet::raft::{ElectionTimer, Envelope};
use raftlet::{NodeId, NodeRole, RaftConfig, RaftMessage, RaftNode};

const CLUSTER: u64 = 5;

#[derive(Debug, Clone)]
enum Op {
    Deliver { from: NodeId, message: RaftMessage },
    Advance { ms: u64 },
}

fn message_strategy() -> impl Strategy<Value = RaftMessage> {
    prop_oneof![
        (0u64..8, 1u64..CLUSTER)
            .prop_map(|(term, candidate_id)| RaftMessage::RequestVote { term, candidate_id }),
        (0u64..8, any::<bool>())
            .prop_map(|(term, vote_granted)| RaftMessage::RequestVoteResponse { term, vote_granted }),
        (0u64..8, 1u64..CLUSTER)
            .prop_map(|(term, leader_id)| RaftMessage::AppendEntries { term, leader_id }),
        (0u64..8, any::<bool>())
            .prop_map(|(term, success)| RaftMessage::AppendEntriesResponse { term, success }),
    ]
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (1u64..CLUSTER, message_strategy())
            .prop_map(|(from, message)| Op::Deliver { from, message }),
        1 => (0u64..400).prop_map(|ms| Op::Advance { ms }),
    ]
}

fn node(seed: u64, start: Instant) -> RaftNode {
    let mut cfg = RaftConfig::new(0).with_timeouts(150, 300, 50);
    for peer in 1..CLUSTER {
        cfg.add_peer(peer);
    }
    let timer = ElectionTimer::seeded(&cfg, seed);
    RaftNode::with_timer(cfg, timer, start)
}

fn is_request(message: &RaftMessage) -> bool {
    matches!(
        message,
        RaftMessage::RequestVote { .. } | RaftMessage::AppendEntries { .. }
    )
}

proptest! {
    #[test]
    fn election_invariants_hold_for_any_message_sequence(
        seed in any::<u64>(),
        ops in proptest::collection::vec(op_strategy(), 1..120),
    ) {
        let start = Instant::now();
        let mut now = start;
        let mut n = node(seed, start);
        let mut votes_by_term: HashMap<u64, NodeId> = HashMap::new();

        for op in ops {
            let before = n.state().clone();
            let expected_vote_on_new_term = match &op {
                Op::Advance { .. } => Some(n.id()),
                Op::Deliver { message: RaftMessage::RequestVote { candidate_id, .. }, .. } => {
                    Some(*candidate_id)
                }
                Op::Deliver { .. } => None,
            };

            match op {
                Op::Advance { ms } => {
                    now += Duration::from_millis(ms);
                    n.tick(now);
                    n.take_outbox();
                }
                Op::Deliver { from, message } => {
                    n.handle_message(from, message, now);
                    let out = n.take_outbox();

                    if is_request(&message) {
                        prop_assert_eq!(out.len(), 1);
                        prop_assert_eq!(out[0].to, from);
                        prop_assert_eq!(out[0].message.term(), n.current_term());
                    }

                    // Stale requests are answered negatively and change nothing
                    if is_request(&message) && message.term() < before.current_term {
                        let negative = match out[0].message {
                            RaftMessage::RequestVoteResponse { vote_granted, .. } => !vote_granted,
                            RaftMessage::AppendEntriesResponse { success, .. } => !success,
                            _ => false,
                        };
                        prop_assert!(negative);
                        prop_assert_eq!(n.role(), before.role);
                        prop_assert_eq!(n.current_term(), before.current_term);
                        prop_assert_eq!(n.state().voted_for, before.voted_for);
                        prop_assert_eq!(n.state().election_deadline, before.election_deadline);
                    }
                }
            }

            let state = n.state();
            prop_assert!(state.current_term >= before.current_term);
            // A new term starts with no vote, except the one cast in the same step
            if state.current_term > before.current_term {
                prop_assert_eq!(state.voted_for, expected_vote_on_new_term);
            }
            if let Some(voted) = state.voted_for {
                let first = *votes_by_term.entry(state.current_term).or_insert(voted);
                prop_assert_eq!(first, voted);
            }
            if state.role == NodeRole::Leader {
                prop_assert!(state.votes_received() >= n.config().quorum());
            }
            prop_assert!(state.votes_received() <= CLUSTER as usize);
        }
    }

    #[test]
    fn duplicate_delivery_matches_single_delivery(
        seed in any::<u64>(),
        prefix in proptest::collection::vec(op_strategy(), 0..40),
        from in 1u64..CLUSTER,
        message in message_strategy(),
    ) {
        let start = Instant::now();
        let mut once = node(seed, start);
        let mut twice = node(seed, start);
        let mut now = start;

        for op in prefix {
            match op {
                Op::Advance { ms } => {
                    now += Duration::from_millis(ms);
                    once.tick(now);
                    twice.tick(now);
                }
                Op::Deliver { from, message } => {
                    once.handle_message(from, message, now);
                    twice.handle_message(from, message, now);
                }
            }
        }
        once.take_outbox();
        twice.take_outbox();

        once.handle_message(from, message, now);
        twice.handle_message(from, message, now);
        let first_replies: Vec<Envelope> = twice.take_outbox();
        twice.handle_message(from, message, now);

        prop_assert_eq!(once.status(), twice.status());
        prop_assert_eq!(once.state().votes_received(), twice.state().votes_received());
        prop_assert_eq!(once.take_outbox(), first_replies);
    }
}
