//! Lamport clock.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A Lamport timestamp.
///
/// Timestamps from a single peer are strictly increasing. Across peers they
/// only form a partial order; see [`super::Priority`] for the tie-break.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LogicalTimestamp(u64);

impl LogicalTimestamp {
    /// The timestamp of a clock that has never ticked.
    pub const ZERO: LogicalTimestamp = LogicalTimestamp(0);

    #[inline]
    pub const fn new(value: u64) -> Self {
        LogicalTimestamp(value)
    }

    #[inline]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for LogicalTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for LogicalTimestamp {
    fn from(value: u64) -> Self {
        LogicalTimestamp(value)
    }
}

/// Per-peer Lamport counter.
///
/// Ticked before every send (observing nothing) and on every receive
/// (observing the message timestamp).
#[derive(Clone, Copy, Debug, Default)]
pub struct LamportClock {
    now: LogicalTimestamp,
}

impl LamportClock {
    /// Create a clock at time zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the clock for a local event.
    ///
    /// Equivalent to `observe(LogicalTimestamp::ZERO)`.
    #[inline]
    pub fn tick(&mut self) -> LogicalTimestamp {
        self.observe(LogicalTimestamp::ZERO)
    }

    /// Advance the clock past an observed timestamp.
    ///
    /// Sets local time to `max(local, observed) + 1` and returns it.
    #[inline]
    pub fn observe(&mut self, observed: LogicalTimestamp) -> LogicalTimestamp {
        self.now = LogicalTimestamp(self.now.0.max(observed.0) + 1);
        self.now
    }

    /// Current local time without advancing.
    #[inline]
    pub fn now(&self) -> LogicalTimestamp {
        self.now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_tick_from_zero() {
        let mut clock = LamportClock::new();
        assert_eq!(clock.now(), LogicalTimestamp::ZERO);
        assert_eq!(clock.tick(), LogicalTimestamp::new(1));
        assert_eq!(clock.tick(), LogicalTimestamp::new(2));
    }

    #[test]
    fn test_observe_jumps_past_remote() {
        let mut clock = LamportClock::new();
        clock.tick();
        assert_eq!(clock.observe(LogicalTimestamp::new(10)), LogicalTimestamp::new(11));

        // An older remote timestamp still advances by one.
        assert_eq!(clock.observe(LogicalTimestamp::new(3)), LogicalTimestamp::new(12));
    }

    proptest! {
        #[test]
        fn test_clock_strictly_increases(observed in proptest::collection::vec(0u64..1_000_000, 1..64)) {
            let mut clock = LamportClock::new();
            let mut previous = clock.now();

            for t in observed {
                let next = clock.observe(LogicalTimestamp::new(t));
                prop_assert!(next > previous);
                prop_assert!(next.as_u64() >= t + 1);
                prop_assert_eq!(next, clock.now());
                previous = next;
            }
        }
    }
}
