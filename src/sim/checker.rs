//! History and Admission Checker.
//!
//! Records what every peer did during a simulation and verifies:
//! - Capacity: no more than `capacity` peers hold a resource at once
//! - Deferred-grant completeness: each release grants every deferred peer exactly once
//! - Barrier completeness: no peer closes a round before every peer has sent its Terminate

use std::collections::{HashMap, HashSet};
use std::ops::Range;

use crate::admission::{MessageKind, Phase, ResourceId};
use crate::clock::PeerId;

use super::network::SentRecord;

/// Something a peer did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Phase change for one resource.
    Transition {
        peer: PeerId,
        resource: ResourceId,
        from: Phase,
        to: Phase,
    },
    /// A release, with the deferred list seen just before it.
    Release {
        peer: PeerId,
        resource: ResourceId,
        deferred_before: Vec<PeerId>,
        granted: Vec<PeerId>,
        deferred_after: usize,
        /// Slice of the send log produced by the release.
        sent: Range<usize>,
    },
    /// The peer broadcast its Terminate for `round`.
    TerminateSent { peer: PeerId, round: u64 },
    /// The peer observed every Terminate for `round` and moved on.
    RoundComplete { peer: PeerId, round: u64 },
}

/// A single entry in the history.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    /// Scheduler step at which the event happened.
    pub step: u64,
    pub event: Event,
}

/// Ordered log of everything the peers did.
#[derive(Debug, Default, Clone)]
pub struct History {
    entries: Vec<HistoryEntry>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, step: u64, event: Event) {
        self.entries.push(HistoryEntry { step, event });
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Phase transitions of one peer on one resource, in order.
    pub fn transitions(&self, peer: PeerId, resource: ResourceId) -> Vec<(Phase, Phase)> {
        self.entries
            .iter()
            .filter_map(|entry| match entry.event {
                Event::Transition { peer: p, resource: r, from, to } if p == peer && r == resource => {
                    Some((from, to))
                }
                _ => None,
            })
            .collect()
    }
}

/// Result of a check.
#[derive(Debug, Clone)]
pub struct CheckResult {
    /// Whether all checks passed.
    pub passed: bool,
    /// List of violations found.
    pub violations: Vec<Violation>,
    /// Statistics about the run.
    pub stats: CheckStats,
}

impl CheckResult {
    /// Violations of one kind.
    pub fn of_kind(&self, kind: ViolationKind) -> impl Iterator<Item = &Violation> {
        self.violations.iter().filter(move |v| v.kind == kind)
    }
}

/// A violated property.
#[derive(Debug, Clone)]
pub struct Violation {
    pub kind: ViolationKind,
    pub description: String,
    /// Related history entries (by index).
    pub related_entries: Vec<usize>,
}

/// Types of violations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViolationKind {
    /// More peers held a resource than its capacity.
    CapacityExceeded,
    /// A phase change that the protocol never makes.
    IllegalTransition,
    /// A deferred peer got no Approve on release.
    MissingGrant,
    /// A deferred peer got more than one Approve on release, or a non-deferred peer got one.
    DuplicateGrant,
    /// The release did not grant exactly the deferred list, in order.
    GrantMismatch,
    /// The deferred list was not empty after release.
    DeferredNotCleared,
    /// A round closed before some peer had sent its Terminate.
    PrematureRound,
    /// A peer closed the same round twice, or skipped one.
    RoundOutOfOrder,
}

/// Statistics gathered while checking.
#[derive(Debug, Clone, Default)]
pub struct CheckStats {
    /// Highest number of simultaneous holders seen on any resource.
    pub peak_holders: u32,
    /// Peak per resource.
    pub peak_by_resource: HashMap<ResourceId, u32>,
    /// Number of admissions (transitions into Holding).
    pub admissions: usize,
    /// Number of releases.
    pub releases: usize,
    /// Deferred grants sent on release.
    pub deferred_grants: usize,
    /// Rounds closed, summed over peers.
    pub rounds_completed: usize,
}

/// Admission checker (oracle).
pub struct Checker {
    peers: u32,
    capacity: u32,
}

impl Checker {
    /// `capacity` is the bound holders are checked against.
    pub fn new(peers: u32, capacity: u32) -> Self {
        Checker { peers, capacity }
    }

    /// Verify a history against the send log it produced.
    pub fn verify(&self, history: &History, sent: &[SentRecord]) -> CheckResult {
        let mut violations = Vec::new();
        let mut stats = CheckStats::default();

        self.check_holders(history, &mut violations, &mut stats);
        self.check_releases(history, sent, &mut violations, &mut stats);
        self.check_rounds(history, &mut violations, &mut stats);

        CheckResult {
            passed: violations.is_empty(),
            violations,
            stats,
        }
    }

    fn check_holders(&self, history: &History, violations: &mut Vec<Violation>, stats: &mut CheckStats) {
        let mut holders: HashMap<ResourceId, HashSet<PeerId>> = HashMap::new();

        for (idx, entry) in history.entries().iter().enumerate() {
            let Event::Transition { peer, resource, from, to } = entry.event else {
                continue;
            };

            let legal = matches!(
                (from, to),
                (Phase::Idle, Phase::Requesting)
                    | (Phase::Requesting, Phase::Holding)
                    | (Phase::Holding, Phase::Idle)
            );
            if !legal {
                violations.push(Violation {
                    kind: ViolationKind::IllegalTransition,
                    description: format!(
                        "Peer {} moved {:?} -> {:?} on resource {}",
                        peer, from, to, resource
                    ),
                    related_entries: vec![idx],
                });
            }

            let current = holders.entry(resource).or_default();
            match to {
                Phase::Holding => {
                    current.insert(peer);
                    stats.admissions += 1;
                }
                _ if from == Phase::Holding => {
                    current.remove(&peer);
                }
                _ => {}
            }

            let count = current.len() as u32;
            let peak = stats.peak_by_resource.entry(resource).or_insert(0);
            *peak = (*peak).max(count);
            stats.peak_holders = stats.peak_holders.max(count);

            if count > self.capacity {
                let mut who: Vec<_> = current.iter().copied().collect();
                who.sort_unstable();
                violations.push(Violation {
                    kind: ViolationKind::CapacityExceeded,
                    description: format!(
                        "Resource {} held by {} peers {:?} at step {} (capacity {})",
                        resource, count, who, entry.step, self.capacity
                    ),
                    related_entries: vec![idx],
                });
            }
        }
    }

    fn check_releases(
        &self,
        history: &History,
        sent: &[SentRecord],
        violations: &mut Vec<Violation>,
        stats: &mut CheckStats,
    ) {
        for (idx, entry) in history.entries().iter().enumerate() {
            let Event::Release {
                peer,
                resource,
                ref deferred_before,
                ref granted,
                deferred_after,
                sent: ref range,
            } = entry.event
            else {
                continue;
            };
            stats.releases += 1;
            stats.deferred_grants += granted.len();

            if granted != deferred_before {
                violations.push(Violation {
                    kind: ViolationKind::GrantMismatch,
                    description: format!(
                        "Peer {} released resource {} granting {:?}, deferred was {:?}",
                        peer, resource, granted, deferred_before
                    ),
                    related_entries: vec![idx],
                });
            }

            if deferred_after != 0 {
                violations.push(Violation {
                    kind: ViolationKind::DeferredNotCleared,
                    description: format!(
                        "Peer {} still has {} deferred on resource {} after release",
                        peer, deferred_after, resource
                    ),
                    related_entries: vec![idx],
                });
            }

            let mut approvals: HashMap<PeerId, usize> = HashMap::new();
            for record in sent.get(range.clone()).unwrap_or(&[]) {
                if record.from == peer
                    && record.message.kind == MessageKind::Approve
                    && record.message.resource == resource
                {
                    *approvals.entry(record.to).or_insert(0) += 1;
                }
            }

            for &waiting in deferred_before {
                match approvals.get(&waiting).copied().unwrap_or(0) {
                    1 => {}
                    0 => violations.push(Violation {
                        kind: ViolationKind::MissingGrant,
                        description: format!(
                            "Peer {} released resource {} without granting deferred peer {}",
                            peer, resource, waiting
                        ),
                        related_entries: vec![idx],
                    }),
                    n => violations.push(Violation {
                        kind: ViolationKind::DuplicateGrant,
                        description: format!(
                            "Peer {} granted deferred peer {} {} times on resource {}",
                            peer, waiting, n, resource
                        ),
                        related_entries: vec![idx],
                    }),
                }
            }

            for (&to, &n) in &approvals {
                if !deferred_before.contains(&to) {
                    violations.push(Violation {
                        kind: ViolationKind::DuplicateGrant,
                        description: format!(
                            "Peer {} sent {} unrequested grant(s) to peer {} on resource {}",
                            peer, n, to, resource
                        ),
                        related_entries: vec![idx],
                    });
                }
            }
        }
    }

    fn check_rounds(&self, history: &History, violations: &mut Vec<Violation>, stats: &mut CheckStats) {
        // (peer, round) -> entry index of its Terminate.
        let mut terminated: HashMap<(PeerId, u64), usize> = HashMap::new();
        let mut last_round: HashMap<PeerId, u64> = HashMap::new();

        for (idx, entry) in history.entries().iter().enumerate() {
            match entry.event {
                Event::TerminateSent { peer, round } => {
                    terminated.insert((peer, round), idx);
                }
                Event::RoundComplete { peer, round } => {
                    stats.rounds_completed += 1;

                    let previous = last_round.insert(peer, round).unwrap_or(0);
                    if round != previous + 1 {
                        violations.push(Violation {
                            kind: ViolationKind::RoundOutOfOrder,
                            description: format!(
                                "Peer {} closed round {} after round {}",
                                peer, round, previous
                            ),
                            related_entries: vec![idx],
                        });
                    }

                    let missing: Vec<PeerId> = (0..self.peers)
                        .filter(|&p| !terminated.contains_key(&(p, round)))
                        .collect();
                    if !missing.is_empty() {
                        violations.push(Violation {
                            kind: ViolationKind::PrematureRound,
                            description: format!(
                                "Peer {} closed round {} at step {} before peers {:?} terminated",
                                peer, round, entry.step, missing
                            ),
                            related_entries: vec![idx],
                        });
                    }
                }
                _ => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admission::Message;
    use crate::clock::LogicalTimestamp;

    fn hold(history: &mut History, step: u64, peer: PeerId) {
        history.record(step, Event::Transition { peer, resource: 0, from: Phase::Idle, to: Phase::Requesting });
        history.record(step, Event::Transition { peer, resource: 0, from: Phase::Requesting, to: Phase::Holding });
    }

    fn leave(history: &mut History, step: u64, peer: PeerId) {
        history.record(step, Event::Transition { peer, resource: 0, from: Phase::Holding, to: Phase::Idle });
    }

    #[test]
    fn test_sequential_holders_pass() {
        let mut history = History::new();
        hold(&mut history, 1, 0);
        leave(&mut history, 2, 0);
        hold(&mut history, 3, 1);
        leave(&mut history, 4, 1);

        let result = Checker::new(2, 1).verify(&history, &[]);
        assert!(result.passed, "{:?}", result.violations);
        assert_eq!(result.stats.peak_holders, 1);
        assert_eq!(result.stats.admissions, 2);
    }

    #[test]
    fn test_overlapping_holders_flagged() {
        let mut history = History::new();
        hold(&mut history, 1, 0);
        hold(&mut history, 2, 1);

        let result = Checker::new(2, 1).verify(&history, &[]);
        assert!(!result.passed);
        assert_eq!(result.of_kind(ViolationKind::CapacityExceeded).count(), 1);
        assert_eq!(result.stats.peak_holders, 2);

        // The same history is fine at capacity 2.
        assert!(Checker::new(2, 2).verify(&history, &[]).passed);
    }

    #[test]
    fn test_illegal_transition_flagged() {
        let mut history = History::new();
        history.record(1, Event::Transition { peer: 0, resource: 0, from: Phase::Idle, to: Phase::Holding });
        let result = Checker::new(1, 1).verify(&history, &[]);
        assert_eq!(result.of_kind(ViolationKind::IllegalTransition).count(), 1);
    }

    #[test]
    fn test_release_grants_checked_against_log() {
        let approve = |to| SentRecord {
            seq: 0,
            from: 0,
            to,
            message: Message::approve(LogicalTimestamp::new(9), 0),
        };
        let sent = vec![approve(1), approve(2), approve(2)];

        let mut history = History::new();
        history.record(5, Event::Release {
            peer: 0,
            resource: 0,
            deferred_before: vec![1, 2, 3],
            granted: vec![1, 2, 3],
            deferred_after: 0,
            sent: 0..3,
        });

        let result = Checker::new(4, 1).verify(&history, &sent);
        assert_eq!(result.of_kind(ViolationKind::MissingGrant).count(), 1);
        assert_eq!(result.of_kind(ViolationKind::DuplicateGrant).count(), 1);
        assert_eq!(result.stats.deferred_grants, 3);
    }

    #[test]
    fn test_premature_round_flagged() {
        let mut history = History::new();
        history.record(1, Event::TerminateSent { peer: 0, round: 1 });
        history.record(2, Event::RoundComplete { peer: 0, round: 1 });
        history.record(3, Event::TerminateSent { peer: 1, round: 1 });
        history.record(4, Event::RoundComplete { peer: 1, round: 1 });

        let result = Checker::new(2, 1).verify(&history, &[]);
        let premature: Vec<_> = result.of_kind(ViolationKind::PrematureRound).collect();
        assert_eq!(premature.len(), 1);
        assert_eq!(premature[0].related_entries, vec![1]);
    }

    #[test]
    fn test_history_transitions_filter() {
        let mut history = History::new();
        hold(&mut history, 1, 0);
        hold(&mut history, 1, 1);
        leave(&mut history, 2, 0);
        assert_eq!(
            history.transitions(0, 0),
            vec![
                (Phase::Idle, Phase::Requesting),
                (Phase::Requesting, Phase::Holding),
                (Phase::Holding, Phase::Idle),
            ]
        );
    }
}
