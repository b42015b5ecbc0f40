//! Per-resource admission state.

use std::collections::HashMap;

use crate::clock::{LogicalTimestamp, PeerId};

use super::message::ResourceId;

/// Where this peer stands with respect to one resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Not interested; grants every request immediately.
    Idle,
    /// Waiting for approvals.
    Requesting,
    /// Admitted; defers every request until release.
    Holding,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Requesting => "requesting",
            Phase::Holding => "holding",
        }
    }
}

/// State of one resource on one peer.
///
/// Created on first use and never removed; fields are reset, not dropped.
#[derive(Debug, Clone)]
pub struct ResourceState {
    /// Current phase.
    pub phase: Phase,
    /// Timestamp of this peer's own pending request.
    /// Only meaningful while `phase == Requesting`.
    pub request_timestamp: LogicalTimestamp,
    /// Approvals needed to move from `Requesting` to `Holding`.
    /// Only meaningful while `phase == Requesting`.
    pub required_approvals: u32,
    /// Approvals counted since the last request.
    pub approvals: u32,
    /// Peers whose requests were postponed, in arrival order.
    pub deferred: Vec<PeerId>,
}

impl ResourceState {
    pub fn new() -> Self {
        ResourceState {
            phase: Phase::Idle,
            request_timestamp: LogicalTimestamp::ZERO,
            required_approvals: 0,
            approvals: 0,
            deferred: Vec::new(),
        }
    }

    /// True once a pending request has collected enough approvals.
    pub fn has_quorum(&self) -> bool {
        self.phase == Phase::Requesting && self.approvals >= self.required_approvals
    }
}

impl Default for ResourceState {
    fn default() -> Self {
        Self::new()
    }
}

/// Lazily populated map from resource id to [`ResourceState`].
#[derive(Debug, Default)]
pub struct ResourceTable {
    resources: HashMap<ResourceId, ResourceState>,
}

impl ResourceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// State for `resource`, creating an idle entry on first use.
    pub fn entry(&mut self, resource: ResourceId) -> &mut ResourceState {
        self.resources.entry(resource).or_default()
    }

    /// State for `resource` if it has ever been touched.
    pub fn get(&self, resource: ResourceId) -> Option<&ResourceState> {
        self.resources.get(&resource)
    }

    /// Phase of `resource`; untouched resources are idle.
    pub fn phase(&self, resource: ResourceId) -> Phase {
        self.get(resource).map(|s| s.phase).unwrap_or(Phase::Idle)
    }

    /// Number of resources ever touched.
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Resources currently held by this peer.
    pub fn held(&self) -> impl Iterator<Item = ResourceId> + '_ {
        self.resources
            .iter()
            .filter(|(_, s)| s.phase == Phase::Holding)
            .map(|(&id, _)| id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_created_lazily_and_kept() {
        let mut table = ResourceTable::new();
        assert!(table.is_empty());
        assert_eq!(table.phase(3), Phase::Idle);
        assert!(table.get(3).is_none());

        table.entry(3).phase = Phase::Holding;
        assert_eq!(table.len(), 1);

        let state = table.entry(3);
        state.phase = Phase::Idle;
        state.deferred.clear();
        assert_eq!(table.len(), 1);
        assert!(table.get(3).is_some());
    }

    #[test]
    fn test_quorum_only_while_requesting() {
        let mut state = ResourceState::new();
        state.required_approvals = 0;
        assert!(!state.has_quorum());

        state.phase = Phase::Requesting;
        state.required_approvals = 2;
        state.approvals = 1;
        assert!(!state.has_quorum());

        state.approvals = 2;
        assert!(state.has_quorum());
    }

    #[test]
    fn test_held_lists_holding_only() {
        let mut table = ResourceTable::new();
        table.entry(1).phase = Phase::Holding;
        table.entry(2).phase = Phase::Requesting;
        table.entry(3).phase = Phase::Holding;

        let mut held: Vec<_> = table.held().collect();
        held.sort();
        assert_eq!(held, vec![1, 3]);
    }
}
