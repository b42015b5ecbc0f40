//! Per-peer admission coordinator.
//!
//! Owns the Lamport clock, the per-resource state table and the termination
//! barrier for one peer, and drives them over a [`Transport`]. All mutation
//! happens on the caller's thread; the only suspension points are the sleeps
//! inside the blocking [`Coordinator::request`] and [`Coordinator::synchronize`].

use std::thread;

use tracing::{debug, error, trace};

use crate::clock::{has_priority, LamportClock, LogicalTimestamp, PeerId, Priority};
use crate::config::CoordinatorConfig;

use super::barrier::{BarrierPhase, TerminationBarrier};
use super::error::CoordinatorError;
use super::message::{Envelope, Message, MessageKind, ResourceId};
use super::network::Transport;
use super::state::{Phase, ResourceState, ResourceTable};

/// Quota-based Ricart-Agrawala coordinator for one peer.
pub struct Coordinator<T: Transport> {
    /// This peer's id.
    peer_id: PeerId,
    /// Cluster size `N`.
    peers: u32,
    clock: LamportClock,
    resources: ResourceTable,
    barrier: TerminationBarrier,
    transport: T,
    config: CoordinatorConfig,
}

impl<T: Transport> Coordinator<T> {
    /// Create a coordinator over a bootstrapped transport.
    ///
    /// Peer id and cluster size come from the transport and are fixed for
    /// the coordinator's lifetime.
    pub fn new(transport: T, config: CoordinatorConfig) -> Self {
        let peer_id = transport.peer_id();
        let peers = transport.peer_count();
        Coordinator {
            peer_id,
            peers,
            clock: LamportClock::new(),
            resources: ResourceTable::new(),
            barrier: TerminationBarrier::new(peer_id, peers),
            transport,
            config,
        }
    }

    // =========================================================================
    // OBSERVERS
    // =========================================================================

    pub fn peer_id(&self) -> PeerId {
        self.peer_id
    }

    pub fn peers(&self) -> u32 {
        self.peers
    }

    /// Current local logical time.
    pub fn now(&self) -> LogicalTimestamp {
        self.clock.now()
    }

    /// Phase of `resource` on this peer.
    pub fn phase(&self, resource: ResourceId) -> Phase {
        self.resources.phase(resource)
    }

    /// Approvals counted for `resource` since its last request.
    pub fn approvals(&self, resource: ResourceId) -> u32 {
        self.resources.get(resource).map(|s| s.approvals).unwrap_or(0)
    }

    /// Peers currently deferred on `resource`, in arrival order.
    pub fn deferred(&self, resource: ResourceId) -> &[PeerId] {
        self.resources
            .get(resource)
            .map(|s| s.deferred.as_slice())
            .unwrap_or(&[])
    }

    /// Full state of `resource`, if it has ever been touched.
    pub fn resource_state(&self, resource: ResourceId) -> Option<&ResourceState> {
        self.resources.get(resource)
    }

    /// Peers (self included) that have finished the current round.
    pub fn exited(&self) -> u32 {
        self.barrier.exited()
    }

    /// Rounds that have fully synchronized.
    pub fn round(&self) -> u64 {
        self.barrier.completed_rounds()
    }

    pub fn barrier_phase(&self) -> BarrierPhase {
        self.barrier.phase()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    // =========================================================================
    // ADMISSION
    // =========================================================================

    /// Block until this peer is admitted to `resource`.
    ///
    /// At most `capacity` peers are meant to hold the resource at once; the
    /// request needs `N - capacity` approvals. Incoming messages for every
    /// resource are serviced while waiting.
    pub fn request(&mut self, resource: ResourceId, capacity: u32) -> Result<(), CoordinatorError> {
        self.begin_request(resource, capacity)?;
        while !self.try_acquire(resource)? {
            thread::sleep(self.config.poll_interval);
        }
        Ok(())
    }

    /// Broadcast a request for `resource` without waiting for approvals.
    ///
    /// Returns the request timestamp.
    pub fn begin_request(
        &mut self,
        resource: ResourceId,
        capacity: u32,
    ) -> Result<LogicalTimestamp, CoordinatorError> {
        if capacity == 0 {
            return Err(CoordinatorError::InvalidCapacity { resource });
        }
        let phase = self.resources.phase(resource);
        if phase != Phase::Idle {
            return Err(CoordinatorError::AlreadyActive { resource, phase });
        }

        let timestamp = self.clock.tick();
        self.transport.broadcast(Message::request(timestamp, resource))?;

        let required = self.peers.saturating_sub(capacity);
        let state = self.resources.entry(resource);
        state.phase = Phase::Requesting;
        state.request_timestamp = timestamp;
        state.required_approvals = required;
        state.approvals = 0;

        debug!(
            peer = self.peer_id,
            resource,
            capacity,
            required,
            now = %timestamp,
            "requesting"
        );
        Ok(timestamp)
    }

    /// Drain available messages, then report whether `resource` is held.
    ///
    /// Transitions `Requesting -> Holding` once enough approvals are in.
    pub fn try_acquire(&mut self, resource: ResourceId) -> Result<bool, CoordinatorError> {
        self.handle_all()?;

        let now = self.clock.now();
        let state = self.resources.entry(resource);
        match state.phase {
            Phase::Holding => Ok(true),
            Phase::Requesting if state.has_quorum() => {
                state.phase = Phase::Holding;
                debug!(
                    peer = self.peer_id,
                    resource,
                    approvals = state.approvals,
                    required = state.required_approvals,
                    now = %now,
                    "holding"
                );
                Ok(true)
            }
            Phase::Requesting => Ok(false),
            Phase::Idle => Err(CoordinatorError::NotRequesting { resource }),
        }
    }

    /// Leave `resource` and grant every deferred request, in arrival order.
    ///
    /// Returns the peers that were granted.
    pub fn release(&mut self, resource: ResourceId) -> Result<Vec<PeerId>, CoordinatorError> {
        let phase = self.resources.phase(resource);
        if phase != Phase::Holding {
            return Err(CoordinatorError::NotHolding { resource, phase });
        }

        let now = self.clock.tick();
        let state = self.resources.entry(resource);
        let granted = std::mem::take(&mut state.deferred);
        state.phase = Phase::Idle;

        for &peer in &granted {
            self.transport.send(peer, Message::approve(now, resource))?;
        }

        debug!(
            peer = self.peer_id,
            resource,
            granted = ?granted,
            now = %now,
            "released"
        );
        Ok(granted)
    }

    // =========================================================================
    // MESSAGE HANDLING
    // =========================================================================

    /// Process at most one incoming message.
    ///
    /// Returns false if nothing was available.
    pub fn handle_incoming(&mut self) -> Result<bool, CoordinatorError> {
        let envelope = match self.transport.try_recv() {
            Ok(Some(envelope)) => envelope,
            Ok(None) => return Ok(false),
            Err(e) => {
                if e.is_fatal() {
                    error!(peer = self.peer_id, error = %e, kind = e.as_label(), "halting on bad frame");
                }
                return Err(e);
            }
        };

        let Envelope { from, message } = envelope;
        let now = self.clock.observe(message.timestamp);
        trace!(
            peer = self.peer_id,
            from,
            kind = ?message.kind,
            resource = message.resource,
            sent = %message.timestamp,
            now = %now,
            "received"
        );

        match message.kind {
            MessageKind::Request => self.on_request(from, message.timestamp, message.resource)?,
            MessageKind::Approve => self.on_approve(from, message.resource),
            MessageKind::Terminate => self.barrier.record_terminate(from)?,
        }
        Ok(true)
    }

    /// Process every message currently available.
    ///
    /// Returns the number of messages handled.
    pub fn handle_all(&mut self) -> Result<usize, CoordinatorError> {
        let mut handled = 0;
        while self.handle_incoming()? {
            handled += 1;
        }
        Ok(handled)
    }

    fn on_request(
        &mut self,
        from: PeerId,
        timestamp: LogicalTimestamp,
        resource: ResourceId,
    ) -> Result<(), CoordinatorError> {
        let state = self.resources.entry(resource);
        let grant = match state.phase {
            Phase::Idle => true,
            Phase::Requesting => has_priority(
                Priority::new(timestamp, from),
                Priority::new(state.request_timestamp, self.peer_id),
            ),
            Phase::Holding => false,
        };

        if grant {
            let now = self.clock.tick();
            self.transport.send(from, Message::approve(now, resource))?;
            debug!(peer = self.peer_id, resource, to = from, now = %now, "granted");
        } else {
            state.deferred.push(from);
            debug!(
                peer = self.peer_id,
                resource,
                deferred = from,
                phase = state.phase.as_str(),
                "deferred"
            );
        }
        Ok(())
    }

    fn on_approve(&mut self, from: PeerId, resource: ResourceId) {
        let state = self.resources.entry(resource);
        state.approvals += 1;
        if state.phase != Phase::Requesting {
            trace!(
                peer = self.peer_id,
                resource,
                from,
                phase = state.phase.as_str(),
                "approval outside pending request"
            );
        }
    }

    // =========================================================================
    // TERMINATION BARRIER
    // =========================================================================

    /// Block until every peer has finished the current round.
    ///
    /// Late admission traffic is serviced while waiting. Returns the number
    /// of the round that completed.
    pub fn synchronize(&mut self) -> Result<u64, CoordinatorError> {
        self.begin_synchronize()?;
        loop {
            if let Some(round) = self.try_complete_synchronize()? {
                return Ok(round);
            }
            thread::sleep(self.config.poll_interval);
        }
    }

    /// Count self as finished and broadcast `Terminate`.
    pub fn begin_synchronize(&mut self) -> Result<(), CoordinatorError> {
        self.barrier.arrive()?;
        let now = self.clock.tick();
        self.transport.broadcast(Message::terminate(now))?;
        debug!(
            peer = self.peer_id,
            round = self.barrier.completed_rounds() + 1,
            exited = self.barrier.exited(),
            now = %now,
            "terminate sent"
        );
        Ok(())
    }

    /// Drain available messages and close the round if every peer has finished.
    ///
    /// Returns the completed round number, or `None` while still waiting.
    pub fn try_complete_synchronize(&mut self) -> Result<Option<u64>, CoordinatorError> {
        if self.barrier.phase() != BarrierPhase::Waiting {
            return Err(CoordinatorError::BarrierNotEntered {
                round: self.barrier.completed_rounds() + 1,
            });
        }

        self.handle_all()?;
        if !self.barrier.is_complete() {
            return Ok(None);
        }

        let round = self.barrier.reset();
        debug!(peer = self.peer_id, round, now = %self.clock.now(), "round synchronized");
        Ok(Some(round))
    }
}
