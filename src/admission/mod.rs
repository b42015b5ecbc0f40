//! Quota-based distributed admission control.
//!
//! A generalization of Ricart-Agrawala mutual exclusion: a peer that wants a
//! resource broadcasts a timestamped `Request` and enters once it holds
//! `N - capacity` approvals. Idle peers approve at once, requesting peers
//! approve only requests with higher priority, and holding peers defer
//! everything until release. A termination barrier separates rounds.
//!
//! # Invariants
//!
//! 1. **One State per Resource**: each peer keeps exactly one [`ResourceState`] per
//!    resource id, created on first use and never removed.
//! 2. **Holding Defers**: while `Holding`, every request for that resource is deferred.
//! 3. **Deferred Grants Once**: every deferred peer receives exactly one `Approve` on
//!    release, and the deferred list is empty afterwards.
//! 4. **Exclusion at Capacity 1**: with `capacity = 1` at most one peer holds a resource.
//! 5. **Barrier Completeness**: no peer leaves a round before every peer has sent
//!    its `Terminate` for that round.

pub mod barrier;
pub mod coordinator;
pub mod error;
pub mod message;
pub mod network;
pub mod state;


pub use barrier::{BarrierPhase, TerminationBarrier};
pub use coordinator::Coordinator;
pub use error::CoordinatorError;
pub use message::{Envelope, Message, MessageKind, ResourceId, FRAME_LEN, NO_RESOURCE};
pub use network::{MockNetwork, NetworkEndpoint, Transport};
pub use state::{Phase, ResourceState, ResourceTable};
