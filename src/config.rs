//! Runtime configuration.

use std::time::Duration;

/// Default sleep between polls while waiting for approvals or the barrier.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2);

/// Default upper bound on participants drawn per round.
pub const DEFAULT_MAX_PARTICIPANTS: u32 = 20;

/// Default time a peer holds the resource each round.
pub const DEFAULT_HOLD_DURATION: Duration = Duration::from_secs(2);

/// Configuration for a single [`crate::admission::Coordinator`].
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Sleep between polls in the blocking `request` and `synchronize` loops.
    pub poll_interval: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        CoordinatorConfig {
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl CoordinatorConfig {
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

/// Workload driven by [`crate::sim::ClusterRunner`].
///
/// Each round every peer waits a random delay, draws a participant count in
/// `[min_participants, max_participants]`, requests `resource` with that count
/// as capacity, holds it for `hold_duration` while servicing messages,
/// releases it and then waits on the termination barrier.
#[derive(Debug, Clone)]
pub struct WorkloadConfig {
    /// Cluster size `N`.
    pub peers: u32,
    /// Number of rounds to run.
    pub rounds: u64,
    /// Resource every peer competes for.
    pub resource: u32,
    /// Lower bound for the per-round participant count (capacity).
    pub min_participants: u32,
    /// Upper bound for the per-round participant count (capacity).
    pub max_participants: u32,
    /// How long a peer holds the resource.
    pub hold_duration: Duration,
    /// Upper bound on the random delay before requesting.
    pub max_request_delay: Duration,
    /// Seed for the per-peer workload generators; `None` draws from entropy.
    pub seed: Option<u64>,
    /// Coordinator settings shared by every peer.
    pub coordinator: CoordinatorConfig,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        WorkloadConfig {
            peers: 4,
            rounds: 3,
            resource: 0,
            min_participants: 2,
            max_participants: DEFAULT_MAX_PARTICIPANTS,
            hold_duration: DEFAULT_HOLD_DURATION,
            max_request_delay: Duration::from_millis(50),
            seed: None,
            coordinator: CoordinatorConfig::default(),
        }
    }
}

impl WorkloadConfig {
    /// Check internal consistency.
    pub fn validate(&self) -> Result<(), String> {
        if self.peers == 0 {
            return Err("peers must be at least 1".to_string());
        }
        if self.min_participants == 0 {
            return Err("min_participants must be at least 1".to_string());
        }
        if self.min_participants > self.max_participants {
            return Err(format!(
                "min_participants {} exceeds max_participants {}",
                self.min_participants, self.max_participants
            ));
        }
        Ok(())
    }
}

/// Deterministic simulation driven by [`crate::sim::Simulation`].
///
/// Time is measured in scheduler steps. Every step either delivers one
/// in-flight message or advances one peer's workload.
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Cluster size `N`.
    pub peers: u32,
    /// Resources are drawn from `0..resources` each round.
    pub resources: u32,
    /// Capacity every request uses; also the bound the checker enforces.
    pub capacity: u32,
    /// Rounds each peer runs.
    pub rounds: u64,
    /// Upper bound on steps a peer idles before requesting.
    pub max_delay_steps: u64,
    /// Upper bound on steps a peer holds before releasing.
    pub max_hold_steps: u64,
    /// Abort with [`crate::sim::SimError::Stalled`] after this many steps.
    pub max_steps: u64,
    /// Probability a step delivers a message rather than advancing a peer.
    pub delivery_bias: f64,
    /// Seed for scheduling and workload.
    pub seed: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        SimConfig {
            peers: 3,
            resources: 1,
            capacity: 1,
            rounds: 3,
            max_delay_steps: 4,
            max_hold_steps: 4,
            max_steps: 500_000,
            delivery_bias: 0.5,
            seed: 0,
        }
    }
}

impl SimConfig {
    /// Check internal consistency.
    pub fn validate(&self) -> Result<(), String> {
        if self.peers == 0 {
            return Err("peers must be at least 1".to_string());
        }
        if self.resources == 0 {
            return Err("resources must be at least 1".to_string());
        }
        if self.capacity == 0 {
            return Err("capacity must be at least 1".to_string());
        }
        if !(self.delivery_bias > 0.0 && self.delivery_bias < 1.0) {
            return Err(format!("delivery_bias {} outside (0, 1)", self.delivery_bias));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(WorkloadConfig::default().validate().is_ok());
        assert_eq!(CoordinatorConfig::default().poll_interval, Duration::from_millis(2));
    }

    #[test]
    fn test_sim_config_rejects_degenerate_values() {
        assert!(SimConfig::default().validate().is_ok());
        assert!(SimConfig { capacity: 0, ..Default::default() }.validate().is_err());
        assert!(SimConfig { resources: 0, ..Default::default() }.validate().is_err());
        assert!(SimConfig { delivery_bias: 0.0, ..Default::default() }.validate().is_err());
    }

    #[test]
    fn test_inverted_participant_range_rejected() {
        let config = WorkloadConfig {
            min_participants: 5,
            max_participants: 3,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
