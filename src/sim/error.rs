//! Simulation and runner errors.

use thiserror::Error;

use crate::admission::CoordinatorError;
use crate::clock::PeerId;

#[derive(Error, Debug)]
pub enum SimError {
    /// A peer's coordinator failed.
    #[error("peer {peer}: {source}")]
    Coordinator {
        peer: PeerId,
        #[source]
        source: CoordinatorError,
    },

    /// The step limit was reached with peers still working.
    #[error("no progress after {steps} steps; unfinished peers {unfinished:?}")]
    Stalled { steps: u64, unfinished: Vec<PeerId> },

    /// A peer thread panicked.
    #[error("peer {peer} thread panicked")]
    PeerPanicked { peer: PeerId },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl SimError {
    pub(crate) fn at(peer: PeerId) -> impl FnOnce(CoordinatorError) -> SimError {
        move |source| SimError::Coordinator { peer, source }
    }
}
