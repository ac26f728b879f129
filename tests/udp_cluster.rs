use std::time::Duration;

use raftlet::{LocalCluster, NodeRole, NodeStatus, RaftConfig};
use tokio::time::{sleep, Instant};

fn fast_timing() -> RaftConfig {
    RaftConfig::new(0)
        .with_timeouts(150, 300, 40)
        .with_poll_interval(10)
}

async fn wait_for_leader(
    cluster: &LocalCluster,
    timeout: Duration,
    accept: impl Fn(&NodeStatus) -> bool,
) -> Option<NodeStatus> {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if let Some(leader) = cluster.leader().filter(|status| accept(status)) {
            return Some(leader);
        }
        sleep(Duration::from_millis(20)).await;
    }
    None
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn three_node_cluster_elects_and_fails_over() {
    let mut cluster = LocalCluster::start_ephemeral(3, &fast_timing())
        .await
        .expect("start cluster");

    let leader = wait_for_leader(&cluster, Duration::from_secs(10), |_| true)
        .await
        .expect("no leader elected");
    assert!(leader.term >= 1);

    // Give heartbeats time to reach every follower
    sleep(Duration::from_millis(300)).await;
    let statuses = cluster.statuses();
    let leaders: Vec<&NodeStatus> = statuses
        .iter()
        .filter(|s| s.role == NodeRole::Leader)
        .collect();
    assert_eq!(leaders.len(), 1, "{statuses:?}");
    let current = *leaders[0];
    for status in &statuses {
        assert_eq!(status.term, current.term, "{statuses:?}");
        assert_eq!(status.leader_id, Some(current.node_id), "{statuses:?}");
    }

    // Crash the leader; the survivors still form a majority
    let stats = cluster
        .stop_node(current.node_id)
        .await
        .expect("leader was running");
    assert!(stats.sent > 0);

    let successor = wait_for_leader(&cluster, Duration::from_secs(10), |s| {
        s.node_id != current.node_id && s.term > current.term
    })
    .await
    .expect("no new leader after failover");
    assert_ne!(successor.node_id, current.node_id);

    cluster.shutdown().await;
}

#[tokio::test]
async fn cluster_without_quorum_never_elects() {
    let mut cluster = LocalCluster::start_ephemeral(3, &fast_timing())
        .await
        .expect("start cluster");
    cluster.stop_node(1).await;
    cluster.stop_node(2).await;

    sleep(Duration::from_millis(1200)).await;
    let survivor = cluster.status(0).expect("node 0");
    assert_ne!(survivor.role, NodeRole::Leader);
    assert!(survivor.term >= 1, "node 0 never campaigned: {survivor:?}");

    cluster.shutdown().await;
}
