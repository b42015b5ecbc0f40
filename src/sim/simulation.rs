//! Step-driven deterministic simulation.
//!
//! All peers live on one thread and use the non-blocking coordinator API.
//! A seeded scheduler decides, one step at a time, whether to deliver an
//! in-flight message or to advance a peer, so every interleaving is
//! reproducible from the seed.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::admission::{Coordinator, Phase};
use crate::config::{CoordinatorConfig, SimConfig};

use super::checker::{CheckResult, Checker, Event, History};
use super::error::SimError;
use super::network::{SentRecord, SimEndpoint, SimNetwork};
use super::workload::{RoundPlan, WorkloadGenerator};

/// What a simulated peer is doing.
#[derive(Debug, Clone, Copy)]
enum Task {
    Waiting { plan: RoundPlan, delay_left: u64 },
    Requesting { plan: RoundPlan },
    Holding { plan: RoundPlan, hold_left: u64 },
    Synchronizing,
    Done,
}

struct SimPeer {
    coordinator: Coordinator<SimEndpoint>,
    workload: WorkloadGenerator,
    task: Task,
}

/// Everything a finished simulation produced.
#[derive(Debug, Clone)]
pub struct SimReport {
    pub config: SimConfig,
    pub history: History,
    pub sent: Vec<SentRecord>,
    pub steps: u64,
}

impl SimReport {
    /// Run the checker with the configured capacity.
    pub fn check(&self) -> CheckResult {
        Checker::new(self.config.peers, self.config.capacity).verify(&self.history, &self.sent)
    }
}

/// A seeded simulation of `N` peers.
pub struct Simulation {
    config: SimConfig,
    network: SimNetwork,
    peers: Vec<SimPeer>,
    rng: StdRng,
    history: History,
    step: u64,
}

impl Simulation {
    pub fn new(config: SimConfig) -> Result<Self, SimError> {
        config.validate().map_err(SimError::InvalidConfig)?;

        let network = SimNetwork::new(config.peers);
        let peers = (0..config.peers)
            .map(|id| {
                let mut workload = WorkloadGenerator::new(Some(config.seed), id)
                    .resources(0..=config.resources - 1)
                    .capacity(config.capacity..=config.capacity)
                    .delay(0..=config.max_delay_steps)
                    .hold(0..=config.max_hold_steps);
                let plan = workload.next_round();
                SimPeer {
                    coordinator: Coordinator::new(network.endpoint(id), CoordinatorConfig::default()),
                    workload,
                    task: Task::Waiting { plan, delay_left: plan.delay },
                }
            })
            .collect();

        Ok(Simulation {
            rng: StdRng::seed_from_u64(config.seed),
            config,
            network,
            peers,
            history: History::new(),
            step: 0,
        })
    }

    /// Run until every peer has finished its rounds.
    pub fn run(mut self) -> Result<SimReport, SimError> {
        while !self.all_done() {
            if self.step >= self.config.max_steps {
                return Err(SimError::Stalled {
                    steps: self.step,
                    unfinished: self.unfinished(),
                });
            }
            self.step += 1;

            if self.network.in_flight() > 0 && self.rng.gen_bool(self.config.delivery_bias) {
                self.network.deliver_random(&mut self.rng);
                continue;
            }

            let active = self.unfinished();
            let idx = active[self.rng.gen_range(0..active.len())] as usize;
            self.advance(idx)?;
        }

        debug!(steps = self.step, sent = self.network.sent_len(), "simulation finished");
        Ok(SimReport {
            sent: self.network.sent_log(),
            config: self.config,
            history: self.history,
            steps: self.step,
        })
    }

    fn all_done(&self) -> bool {
        self.peers.iter().all(|p| matches!(p.task, Task::Done))
    }

    fn unfinished(&self) -> Vec<u32> {
        self.peers
            .iter()
            .filter(|p| !matches!(p.task, Task::Done))
            .map(|p| p.coordinator.peer_id())
            .collect()
    }

    /// Move one peer forward by one step of its workload.
    fn advance(&mut self, idx: usize) -> Result<(), SimError> {
        let step = self.step;
        let rounds = self.config.rounds;
        let history = &mut self.history;
        let network = &self.network;
        let peer = &mut self.peers[idx];
        let id = peer.coordinator.peer_id();
        let at = || SimError::at(id);

        peer.task = match peer.task {
            Task::Waiting { plan, delay_left } => {
                peer.coordinator.handle_all().map_err(at())?;
                if delay_left > 0 {
                    Task::Waiting { plan, delay_left: delay_left - 1 }
                } else {
                    peer.coordinator
                        .begin_request(plan.resource, plan.capacity)
                        .map_err(at())?;
                    history.record(step, Event::Transition {
                        peer: id,
                        resource: plan.resource,
                        from: Phase::Idle,
                        to: Phase::Requesting,
                    });
                    Task::Requesting { plan }
                }
            }
            Task::Requesting { plan } => {
                if peer.coordinator.try_acquire(plan.resource).map_err(at())? {
                    history.record(step, Event::Transition {
                        peer: id,
                        resource: plan.resource,
                        from: Phase::Requesting,
                        to: Phase::Holding,
                    });
                    Task::Holding { plan, hold_left: plan.hold }
                } else {
                    Task::Requesting { plan }
                }
            }
            Task::Holding { plan, hold_left } => {
                peer.coordinator.handle_all().map_err(at())?;
                if hold_left > 0 {
                    Task::Holding { plan, hold_left: hold_left - 1 }
                } else {
                    let deferred_before = peer.coordinator.deferred(plan.resource).to_vec();
                    let start = network.sent_len();
                    let granted = peer.coordinator.release(plan.resource).map_err(at())?;
                    let end = network.sent_len();

                    history.record(step, Event::Release {
                        peer: id,
                        resource: plan.resource,
                        deferred_before,
                        granted,
                        deferred_after: peer.coordinator.deferred(plan.resource).len(),
                        sent: start..end,
                    });
                    history.record(step, Event::Transition {
                        peer: id,
                        resource: plan.resource,
                        from: Phase::Holding,
                        to: Phase::Idle,
                    });

                    peer.coordinator.begin_synchronize().map_err(at())?;
                    history.record(step, Event::TerminateSent {
                        peer: id,
                        round: peer.coordinator.round() + 1,
                    });
                    Task::Synchronizing
                }
            }
            Task::Synchronizing => match peer.coordinator.try_complete_synchronize().map_err(at())? {
                Some(round) => {
                    history.record(step, Event::RoundComplete { peer: id, round });
                    if round >= rounds {
                        Task::Done
                    } else {
                        let plan = peer.workload.next_round();
                        Task::Waiting { plan, delay_left: plan.delay }
                    }
                }
                None => Task::Synchronizing,
            },
            Task::Done => Task::Done,
        };
        Ok(())
    }
}
