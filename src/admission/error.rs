//! Errors raised by the admission protocol.

use thiserror::Error;

use crate::clock::PeerId;

use super::message::ResourceId;
use super::state::Phase;

/// Errors produced by a [`super::Coordinator`] or its transport.
///
/// The protocol has no recoverable-error surface: every variant is either a
/// broken transport or a violated invariant. [`CoordinatorError::is_fatal`]
/// separates the two for callers that want to log differently.
#[derive(Error, Debug)]
pub enum CoordinatorError {
    /// A frame carried a message kind this build does not know.
    #[error("unknown message kind {kind} from peer {from}")]
    UnknownMessageKind { kind: u32, from: PeerId },

    /// A frame did not have the fixed wire size.
    #[error("malformed frame: expected {expected} bytes, got {len}")]
    MalformedFrame { len: usize, expected: usize },

    /// Encoding or decoding a frame failed.
    #[error("frame codec error: {0}")]
    Codec(#[from] bincode::Error),

    /// The target peer's endpoint is gone.
    #[error("peer {peer} is disconnected")]
    Disconnected { peer: PeerId },

    /// A peer id outside `[0, N)`, or a message addressed to self.
    #[error("peer {peer} is not a remote peer in a cluster of {peers}")]
    PeerOutOfRange { peer: PeerId, peers: u32 },

    /// Capacity zero can never be admitted.
    #[error("capacity must be at least 1 for resource {resource}")]
    InvalidCapacity { resource: ResourceId },

    /// `request` was called for a resource that is already requested or held.
    #[error("resource {resource} is already {phase:?}")]
    AlreadyActive { resource: ResourceId, phase: Phase },

    /// `try_acquire` was called for a resource with no pending request.
    #[error("resource {resource} has no pending request")]
    NotRequesting { resource: ResourceId },

    /// `release` was called for a resource that is not held.
    #[error("resource {resource} is not held (phase {phase:?})")]
    NotHolding { resource: ResourceId, phase: Phase },

    /// `synchronize` was entered twice without completing.
    #[error("termination barrier for round {round} already entered")]
    BarrierAlreadyEntered { round: u64 },

    /// The barrier was polled for completion without being entered.
    #[error("termination barrier for round {round} not entered")]
    BarrierNotEntered { round: u64 },
}

impl CoordinatorError {
    /// True for invariant violations that must halt the peer.
    ///
    /// Transport failures are reported as non-fatal so a driver can decide
    /// whether a dropped peer means shutdown.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, CoordinatorError::Disconnected { .. })
    }

    /// Short stable label for logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            CoordinatorError::UnknownMessageKind { .. } => "unknown_message_kind",
            CoordinatorError::MalformedFrame { .. } => "malformed_frame",
            CoordinatorError::Codec(_) => "codec",
            CoordinatorError::Disconnected { .. } => "disconnected",
            CoordinatorError::PeerOutOfRange { .. } => "peer_out_of_range",
            CoordinatorError::InvalidCapacity { .. } => "invalid_capacity",
            CoordinatorError::AlreadyActive { .. } => "already_active",
            CoordinatorError::NotRequesting { .. } => "not_requesting",
            CoordinatorError::NotHolding { .. } => "not_holding",
            CoordinatorError::BarrierAlreadyEntered { .. } => "barrier_already_entered",
            CoordinatorError::BarrierNotEntered { .. } => "barrier_not_entered",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disconnect_is_not_fatal() {
        assert!(!CoordinatorError::Disconnected { peer: 2 }.is_fatal());
        assert!(CoordinatorError::UnknownMessageKind { kind: 9, from: 1 }.is_fatal());
    }

    #[test]
    fn test_display_names_resource() {
        let err = CoordinatorError::NotHolding { resource: 4, phase: Phase::Idle };
        assert_eq!(err.to_string(), "resource 4 is not held (phase Idle)");
        assert_eq!(err.as_label(), "not_holding");
    }
}
