use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::RaftConfig;

/// Source of election and heartbeat deadlines.
///
/// Every election deadline is drawn fresh from
/// `[election_timeout_min, election_timeout_max]`.
#[derive(Debug)]
pub struct ElectionTimer {
    min_ms: u64,
    max_ms: u64,
    heartbeat: Duration,
    rng: StdRng,
}

impl ElectionTimer {
    pub fn new(config: &RaftConfig) -> Self {
        Self::with_rng(config, StdRng::from_os_rng())
    }

    /// Deterministic timer for simulations and tests.
    pub fn seeded(config: &RaftConfig, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: &RaftConfig, rng: StdRng) -> Self {
        Self {
            min_ms: config.election_timeout_min,
            max_ms: config.election_timeout_max.max(config.election_timeout_min),
            heartbeat: config.heartbeat(),
            rng,
        }
    }

    pub fn election_timeout(&mut self) -> Duration {
        let timeout_ms = self.rng.random_range(self.min_ms..=self.max_ms);
        Duration::from_millis(timeout_ms)
    }

    pub fn next_election_deadline(&mut self, now: Instant) -> Instant {
        now + self.election_timeout()
    }

    pub fn heartbeat_interval(&self) -> Duration {
        self.heartbeat
    }

    pub fn heartbeat_due(&self, last_sent: Option<Instant>, now: Instant) -> bool {
        match last_sent {
            Some(last) => now.saturating_duration_since(last) >= self.heartbeat,
            None => true,
        }
    }

    pub fn next_heartbeat(&self, last_sent: Option<Instant>, now: Instant) -> Instant {
        last_sent.map_or(now, |last| last + self.heartbeat)
    }
}
