use std::fs::OpenOptions;
use std::future::Future;
use std::io;
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use log::{info, warn};
use tokio::sync::watch;
use tracing_log::LogTracer;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use raftlet::{Config, LocalCluster, NodeId, NodeStatus, Raft};

fn init_logging() {
    // RAFTLET_LOG_FILE sends plain env_logger output to a file instead of
    // structured output on stderr.
    if let Ok(path) = std::env::var("RAFTLET_LOG_FILE") {
        match OpenOptions::new().create(true).append(true).open(&path) {
            Ok(file) => {
                env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
                    .target(env_logger::Target::Pipe(Box::new(file)))
                    .init();
                return;
            }
            Err(e) => eprintln!("Cannot open log file {path}: {e}, logging to stderr"),
        }
    }

    let _ = LogTracer::init();

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_timer(fmt::time::UtcTime::rfc_3339());

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init();
}

#[derive(Parser)]
#[command(name = "raftlet")]
#[command(about = "Raft-style leader election and heartbeats over UDP")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run every node of the cluster in this process until Ctrl-C
    Cluster {
        #[command(flatten)]
        cluster: ClusterArgs,
    },

    /// Run a single node of a multi-process cluster until Ctrl-C
    Node {
        /// ID of this node (0 based); it listens on base port + ID
        #[arg(short, long)]
        id: NodeId,

        #[command(flatten)]
        cluster: ClusterArgs,
    },

    /// Print the effective configuration as JSON
    Config {
        #[command(flatten)]
        cluster: ClusterArgs,
    },
}

#[derive(Args)]
struct ClusterArgs {
    /// JSON configuration file; flags below override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of nodes in the cluster
    #[arg(short, long)]
    nodes: Option<u64>,

    /// Address every node binds to and is reached at (not a wildcard)
    #[arg(long)]
    host: Option<IpAddr>,

    /// Port of node 0; node N listens on base port + N
    #[arg(short = 'p', long)]
    base_port: Option<u16>,

    /// Lower bound of the randomized election timeout, in milliseconds
    #[arg(long)]
    election_min_ms: Option<u64>,

    /// Upper bound of the randomized election timeout, in milliseconds
    #[arg(long)]
    election_max_ms: Option<u64>,

    /// Interval between leader heartbeats, in milliseconds
    #[arg(long)]
    heartbeat_ms: Option<u64>,

    /// Upper bound on how long a node loop sleeps between passes, in milliseconds
    #[arg(long)]
    poll_ms: Option<u64>,
}

impl ClusterArgs {
    fn resolve(self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_file(path)?,
            None => Config::default(),
        };

        if let Some(nodes) = self.nodes {
            config.cluster_size = nodes;
        }
        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.base_port {
            config.base_port = port;
        }
        if let Some(ms) = self.election_min_ms {
            config.election_timeout_min_ms = ms;
        }
        if let Some(ms) = self.election_max_ms {
            config.election_timeout_max_ms = ms;
        }
        if let Some(ms) = self.heartbeat_ms {
            config.heartbeat_interval_ms = ms;
        }
        if let Some(ms) = self.poll_ms {
            config.poll_interval_ms = ms;
        }

        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    // Parse command line arguments
    let cli = Cli::parse();

    match cli.command {
        Command::Cluster { cluster } => run_cluster(cluster.resolve()?).await,
        Command::Node { id, cluster } => run_node(id, cluster.resolve()?).await,
        Command::Config { cluster } => {
            let config = cluster.resolve()?;
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

async fn run_cluster(config: Config) -> Result<()> {
    info!(
        "Starting {} nodes on {} from port {}",
        config.cluster_size, config.host, config.base_port
    );
    let cluster = LocalCluster::start(&config)
        .await
        .context("failed to start cluster")?;

    let every = Duration::from_millis(config.poll_interval_ms);
    report_leaders(&cluster, every, tokio::signal::ctrl_c()).await;

    info!("Interrupt received, stopping cluster");
    cluster.shutdown().await;
    Ok(())
}

/// Logs every change of leader until `interrupt` resolves. The same
/// `interrupt` future is polled on every pass, so a signal raised while a
/// report is being written is not lost.
async fn report_leaders<F>(cluster: &LocalCluster, every: Duration, interrupt: F)
where
    F: Future<Output = io::Result<()>>,
{
    tokio::pin!(interrupt);
    let mut report = tokio::time::interval(every);
    let mut last_leader: Option<NodeStatus> = None;

    loop {
        tokio::select! {
            result = &mut interrupt => {
                if let Err(e) = result {
                    warn!("Failed to listen for Ctrl-C: {e}");
                }
                break;
            }
            _ = report.tick() => {
                let leader = cluster.leader();
                let changed = match (&leader, &last_leader) {
                    (Some(now), Some(before)) => now.node_id != before.node_id || now.term != before.term,
                    (None, None) => false,
                    _ => true,
                };
                if changed {
                    match &leader {
                        Some(status) => info!("Leader is node {} at term {}", status.node_id, status.term),
                        None => info!("No leader"),
                    }
                    last_leader = leader;
                }
            }
        }
    }
}

async fn run_node(id: NodeId, config: Config) -> Result<()> {
    if id >= config.cluster_size {
        bail!(
            "node id {id} is outside a cluster of {} nodes",
            config.cluster_size
        );
    }

    let registry = config.registry()?;
    let raft = Raft::bind(config.raft_config(id), registry)
        .await
        .with_context(|| format!("node {id} cannot join the cluster"))?;
    info!("Node {id} listening on {}", raft.local_addr());

    let status = raft.subscribe();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(raft.run(shutdown_rx));

    follow_status(id, status, tokio::signal::ctrl_c()).await;

    let _ = shutdown_tx.send(true);
    let stats = task.await.context("node task failed")?;
    info!("Node {id} stopped: {stats:?}");
    Ok(())
}

/// Logs each status change of node `id` until `interrupt` resolves or the
/// node stops publishing.
async fn follow_status<F>(id: NodeId, mut status: watch::Receiver<NodeStatus>, interrupt: F)
where
    F: Future<Output = io::Result<()>>,
{
    tokio::pin!(interrupt);

    loop {
        tokio::select! {
            result = &mut interrupt => {
                if let Err(e) = result {
                    warn!("Failed to listen for Ctrl-C: {e}");
                }
                break;
            }
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *status.borrow_and_update();
                info!(
                    "Node {id} is {} at term {} (leader: {:?})",
                    current.role, current.term, current.leader_id
                );
            }
        }
    }
}
