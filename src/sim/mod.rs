//! Simulation and verification harness.
//!
//! Two drivers exercise the coordinator:
//!
//! - [`Simulation`] runs every peer on one thread over a [`SimNetwork`] whose
//!   delivery order is chosen by a seeded scheduler. It records a [`History`]
//!   that the [`Checker`] verifies afterwards.
//! - [`ClusterRunner`] runs one thread per peer over the in-memory
//!   [`crate::admission::MockNetwork`] with wall-clock delays and holds.
//!
//! # Checked properties
//!
//! 1. **Bounded Occupancy**: no more than `capacity` peers hold a resource at once.
//! 2. **Legal Transitions**: phases only move Idle -> Requesting -> Holding -> Idle.
//! 3. **Deferred Release**: every release approves each deferred peer exactly once
//!    and sends nothing else.
//! 4. **Barrier Order**: no peer completes round `k` before every peer has sent
//!    its `Terminate` for round `k`.

pub mod checker;
pub mod error;
pub mod network;
pub mod runner;
pub mod simulation;
pub mod workload;


pub use checker::{
    CheckResult, CheckStats, Checker, Event, History, HistoryEntry, Violation, ViolationKind,
};
pub use error::SimError;
pub use network::{SentRecord, SimEndpoint, SimNetwork};
pub use runner::{ClusterReport, ClusterRunner, PeerReport};
pub use simulation::{SimReport, Simulation};
pub use workload::{RoundPlan, WorkloadGenerator};
