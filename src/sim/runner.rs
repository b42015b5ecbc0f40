//! Threaded cluster runner.
//!
//! Runs each coordinator in its own thread over a [`MockNetwork`], using the
//! blocking `request` and `synchronize` calls. A shared occupancy counter
//! tracks how many peers hold the resource at once.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{info, info_span, warn};

use crate::admission::{Coordinator, CoordinatorError, MockNetwork, NetworkEndpoint, Transport};
use crate::clock::PeerId;
use crate::config::WorkloadConfig;

use super::error::SimError;
use super::workload::WorkloadGenerator;

/// Per-peer outcome of a run.
#[derive(Debug, Clone, Default)]
pub struct PeerReport {
    pub peer: PeerId,
    /// Rounds whose barrier completed.
    pub rounds: u64,
    /// Deferred requests granted on release, summed over rounds.
    pub deferred_grants: usize,
    /// Lamport time when the peer finished.
    pub final_time: u64,
}

/// Outcome of a whole cluster run.
#[derive(Debug, Clone)]
pub struct ClusterReport {
    pub peers: Vec<PeerReport>,
    /// Most peers seen holding the resource at the same time.
    pub peak_holders: u32,
    /// Admissions that found more holders than the capacity they asked for.
    pub over_admissions: u64,
}

/// Counts concurrent holders across threads.
#[derive(Debug, Default)]
struct Occupancy {
    holders: AtomicU32,
    peak: AtomicU32,
    over: AtomicU64,
}

impl Occupancy {
    fn enter(&self, capacity: u32) -> u32 {
        let holders = self.holders.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(holders, Ordering::SeqCst);
        if holders > capacity {
            self.over.fetch_add(1, Ordering::SeqCst);
        }
        holders
    }

    fn leave(&self) {
        self.holders.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Drives a [`WorkloadConfig`] on real threads.
pub struct ClusterRunner {
    config: WorkloadConfig,
}

impl ClusterRunner {
    pub fn new(config: WorkloadConfig) -> Result<Self, SimError> {
        config.validate().map_err(SimError::InvalidConfig)?;
        Ok(ClusterRunner { config })
    }

    pub fn config(&self) -> &WorkloadConfig {
        &self.config
    }

    /// Run every peer to completion and collect their reports.
    pub fn run(&self) -> Result<ClusterReport, SimError> {
        let occupancy = Arc::new(Occupancy::default());
        let endpoints = MockNetwork::new(self.config.peers).into_endpoints();

        info!(
            peers = self.config.peers,
            rounds = self.config.rounds,
            resource = self.config.resource,
            "starting cluster"
        );

        let handles: Vec<(PeerId, JoinHandle<Result<PeerReport, SimError>>)> = endpoints
            .into_iter()
            .map(|endpoint| {
                let peer = endpoint.peer_id();
                let config = self.config.clone();
                let occupancy = occupancy.clone();
                let handle = thread::spawn(move || run_peer(endpoint, config, &occupancy));
                (peer, handle)
            })
            .collect();

        // Join every thread before reporting, so a failing peer does not
        // leave the others detached.
        let mut peers = Vec::with_capacity(handles.len());
        let mut first_error = None;
        for (peer, handle) in handles {
            match handle.join() {
                Ok(Ok(report)) => peers.push(report),
                Ok(Err(e)) => {
                    first_error.get_or_insert(e);
                }
                Err(_) => {
                    first_error.get_or_insert(SimError::PeerPanicked { peer });
                }
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }

        let report = ClusterReport {
            peers,
            peak_holders: occupancy.peak.load(Ordering::SeqCst),
            over_admissions: occupancy.over.load(Ordering::SeqCst),
        };
        info!(
            peak_holders = report.peak_holders,
            over_admissions = report.over_admissions,
            "cluster finished"
        );
        Ok(report)
    }
}

fn run_peer(
    endpoint: NetworkEndpoint,
    config: WorkloadConfig,
    occupancy: &Occupancy,
) -> Result<PeerReport, SimError> {
    let peer = endpoint.peer_id();
    let span = info_span!("peer", id = peer);
    let _enter = span.enter();

    let hold_ms = config.hold_duration.as_millis() as u64;
    let mut workload = WorkloadGenerator::new(config.seed, peer)
        .resources(config.resource..=config.resource)
        .capacity(config.min_participants..=config.max_participants)
        .delay(0..=config.max_request_delay.as_millis() as u64)
        .hold(hold_ms..=hold_ms);
    let mut coordinator = Coordinator::new(endpoint, config.coordinator.clone());
    let mut report = PeerReport { peer, ..Default::default() };

    for _ in 0..config.rounds {
        let plan = workload.next_round();
        info!(participants = plan.capacity, "round starting");

        service_for(&mut coordinator, Duration::from_millis(plan.delay)).map_err(SimError::at(peer))?;
        info!(resource = plan.resource, "requesting");
        coordinator
            .request(plan.resource, plan.capacity)
            .map_err(SimError::at(peer))?;

        let holders = occupancy.enter(plan.capacity);
        info!(holders, now = %coordinator.now(), "admitted");
        if holders > plan.capacity {
            warn!(holders, capacity = plan.capacity, "more holders than requested capacity");
        }

        let held = service_for(&mut coordinator, Duration::from_millis(plan.hold));
        occupancy.leave();
        held.map_err(SimError::at(peer))?;

        let granted = coordinator.release(plan.resource).map_err(SimError::at(peer))?;
        report.deferred_grants += granted.len();
        info!(granted = ?granted, "released");

        let round = coordinator.synchronize().map_err(SimError::at(peer))?;
        report.rounds = round;
        info!(round, "round synchronized");
    }

    report.final_time = coordinator.now().as_u64();
    Ok(report)
}

/// Keep answering messages until `duration` has elapsed.
fn service_for<T: Transport>(
    coordinator: &mut Coordinator<T>,
    duration: Duration,
) -> Result<(), CoordinatorError> {
    let deadline = Instant::now() + duration;
    loop {
        coordinator.handle_all()?;
        let now = Instant::now();
        if now >= deadline {
            return Ok(());
        }
        thread::sleep(coordinator.config().poll_interval.min(deadline - now));
    }
}
