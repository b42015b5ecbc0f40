//! Quota-based distributed admission control.
//!
//! Peers coordinate entry to shared resources with Lamport-timestamped
//! `Request`/`Approve` messages. A resource requested with capacity `c`
//! admits a peer once `N - c` others approve, and a termination barrier
//! separates rounds.

pub mod admission;
pub mod clock;
pub mod config;
pub mod sim;

pub use admission::{Coordinator, CoordinatorError, MockNetwork, NetworkEndpoint, Phase, Transport};
pub use clock::{LamportClock, LogicalTimestamp, PeerId, Priority};
pub use config::{CoordinatorConfig, SimConfig, WorkloadConfig};
