//! Termination barrier: all-to-all round completion counting.
//!
//! Each peer broadcasts `Terminate` when it finishes a round and waits until
//! it has seen one from every peer. Terminates are tallied per sender, so a
//! fast peer's `Terminate` for the next round, delivered while this peer is
//! still waiting on the current one, is carried over rather than counted twice.
//! Per-sender FIFO guarantees a peer's round `r` Terminate always precedes its
//! round `r + 1` Terminate.

use crate::clock::PeerId;

use super::error::CoordinatorError;

/// Barrier phase for the current round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarrierPhase {
    /// This peer has not yet finished the round.
    Running,
    /// This peer has broadcast `Terminate` and is waiting for the others.
    Waiting,
}

/// Round-completion counter for one peer.
#[derive(Debug, Clone)]
pub struct TerminationBarrier {
    /// This peer's id.
    peer_id: PeerId,
    /// Total Terminates seen from each peer (self included), since startup.
    terminates: Vec<u64>,
    /// Rounds that have fully synchronized.
    completed_rounds: u64,
    phase: BarrierPhase,
}

impl TerminationBarrier {
    pub fn new(peer_id: PeerId, peer_count: u32) -> Self {
        TerminationBarrier {
            peer_id,
            terminates: vec![0; peer_count as usize],
            completed_rounds: 0,
            phase: BarrierPhase::Running,
        }
    }

    /// Count self as exited for the current round.
    pub fn arrive(&mut self) -> Result<(), CoordinatorError> {
        if self.phase == BarrierPhase::Waiting {
            return Err(CoordinatorError::BarrierAlreadyEntered {
                round: self.completed_rounds,
            });
        }
        self.phase = BarrierPhase::Waiting;
        self.terminates[self.peer_id as usize] += 1;
        Ok(())
    }

    /// Record a `Terminate` from `from`.
    pub fn record_terminate(&mut self, from: PeerId) -> Result<(), CoordinatorError> {
        let peers = self.terminates.len() as u32;
        let slot = self
            .terminates
            .get_mut(from as usize)
            .ok_or(CoordinatorError::PeerOutOfRange { peer: from, peers })?;
        *slot += 1;
        Ok(())
    }

    /// Number of peers (self included) that have finished the current round.
    pub fn exited(&self) -> u32 {
        self.terminates
            .iter()
            .filter(|&&seen| seen > self.completed_rounds)
            .count() as u32
    }

    /// True once every peer has finished the current round.
    pub fn is_complete(&self) -> bool {
        self.exited() as usize == self.terminates.len()
    }

    /// Close the current round. Resets `exited` for the next one.
    ///
    /// Returns the number of the round that just completed (1-based).
    pub fn reset(&mut self) -> u64 {
        debug_assert!(self.is_complete(), "barrier reset before completion");
        self.completed_rounds += 1;
        self.phase = BarrierPhase::Running;
        self.completed_rounds
    }

    pub fn phase(&self) -> BarrierPhase {
        self.phase
    }

    /// Rounds that have fully synchronized.
    pub fn completed_rounds(&self) -> u64 {
        self.completed_rounds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completes_when_all_arrive() {
        let mut barrier = TerminationBarrier::new(0, 3);
        barrier.arrive().unwrap();
        assert_eq!(barrier.exited(), 1);
        assert!(!barrier.is_complete());

        barrier.record_terminate(2).unwrap();
        assert_eq!(barrier.exited(), 2);
        barrier.record_terminate(1).unwrap();
        assert!(barrier.is_complete());

        assert_eq!(barrier.reset(), 1);
        assert_eq!(barrier.exited(), 0);
        assert_eq!(barrier.phase(), BarrierPhase::Running);
    }

    #[test]
    fn test_early_next_round_terminate_carried_over() {
        let mut barrier = TerminationBarrier::new(0, 3);
        barrier.record_terminate(1).unwrap();
        // Peer 1 already finished the next round too.
        barrier.record_terminate(1).unwrap();
        barrier.arrive().unwrap();

        // Peer 1 still counts once; peer 2 is missing.
        assert_eq!(barrier.exited(), 2);
        assert!(!barrier.is_complete());

        barrier.record_terminate(2).unwrap();
        assert!(barrier.is_complete());
        barrier.reset();

        // Peer 1's second Terminate belongs to this round.
        assert_eq!(barrier.exited(), 1);
    }

    #[test]
    fn test_double_arrive_rejected() {
        let mut barrier = TerminationBarrier::new(1, 2);
        barrier.arrive().unwrap();
        assert!(matches!(
            barrier.arrive(),
            Err(CoordinatorError::BarrierAlreadyEntered { round: 0 })
        ));
    }

    #[test]
    fn test_single_peer_completes_alone() {
        let mut barrier = TerminationBarrier::new(0, 1);
        barrier.arrive().unwrap();
        assert!(barrier.is_complete());
    }

    #[test]
    fn test_unknown_sender_rejected() {
        let mut barrier = TerminationBarrier::new(0, 2);
        assert!(matches!(
            barrier.record_terminate(5),
            Err(CoordinatorError::PeerOutOfRange { peer: 5, peers: 2 })
        ));
    }
}
