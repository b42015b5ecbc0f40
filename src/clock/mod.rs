//! Logical time for the admission protocol.
//!
//! Peers share no physical clock. Every event a peer cares about is stamped
//! with a Lamport timestamp, and conflicting requests are resolved by the
//! total order `(timestamp, peer_id)`.
//!
//! # Invariants
//!
//! 1. **Strict Advance**: every [`LamportClock::tick`] returns a value larger than
//!    any value the clock returned before.
//! 2. **Causal Dominance**: after observing a timestamp `t`, the local clock is `>= t + 1`.
//! 3. **No Ties**: two distinct `(timestamp, peer)` pairs are always ordered.

pub mod lamport;
pub mod priority;

pub use lamport::{LamportClock, LogicalTimestamp};
pub use priority::{has_priority, Priority};

/// Identifier of a peer, in `[0, N)`.
pub type PeerId = u32;
