//! Request priority: a strict total order over `(timestamp, peer)`.

use std::cmp::Ordering;

use super::{LogicalTimestamp, PeerId};

/// Priority of a pending request.
///
/// Earlier timestamps win; equal timestamps are broken by the lower peer id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Priority {
    pub timestamp: LogicalTimestamp,
    pub peer: PeerId,
}

impl Priority {
    pub fn new(timestamp: LogicalTimestamp, peer: PeerId) -> Self {
        Priority { timestamp, peer }
    }

    /// True if `self` must be served before `other`.
    #[inline]
    pub fn has_priority_over(&self, other: &Priority) -> bool {
        self < other
    }
}

impl Ord for Priority {
    fn cmp(&self, other: &Self) -> Ordering {
        self.timestamp
            .cmp(&other.timestamp)
            .then(self.peer.cmp(&other.peer))
    }
}

impl PartialOrd for Priority {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// True iff `a.timestamp < b.timestamp`, or the timestamps are equal and `a.peer < b.peer`.
#[inline]
pub fn has_priority(a: Priority, b: Priority) -> bool {
    a.has_priority_over(&b)
}
