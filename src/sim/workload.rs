//! Per-round workload generation.
//!
//! Draws how long a peer waits before requesting, which resource it asks
//! for, the capacity (participant count) it requests with, and how long it
//! holds. Units of `delay` and `hold` are chosen by the caller: steps in the
//! simulation, milliseconds in the threaded runner.

use std::ops::RangeInclusive;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::admission::ResourceId;
use crate::clock::PeerId;

/// What one peer does in one round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundPlan {
    pub resource: ResourceId,
    pub capacity: u32,
    pub delay: u64,
    pub hold: u64,
}

/// Seeded generator of [`RoundPlan`]s for one peer.
pub struct WorkloadGenerator {
    rng: StdRng,
    resources: RangeInclusive<ResourceId>,
    capacity: RangeInclusive<u32>,
    delay: RangeInclusive<u64>,
    hold: RangeInclusive<u64>,
}

impl WorkloadGenerator {
    /// Create a generator. Peers sharing a seed still get distinct streams.
    pub fn new(seed: Option<u64>, peer: PeerId) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(u64::from(peer))),
            None => StdRng::from_entropy(),
        };
        WorkloadGenerator {
            rng,
            resources: 0..=0,
            capacity: 1..=1,
            delay: 0..=0,
            hold: 0..=0,
        }
    }

    pub fn resources(mut self, resources: RangeInclusive<ResourceId>) -> Self {
        self.resources = resources;
        self
    }

    pub fn capacity(mut self, capacity: RangeInclusive<u32>) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn delay(mut self, delay: RangeInclusive<u64>) -> Self {
        self.delay = delay;
        self
    }

    pub fn hold(mut self, hold: RangeInclusive<u64>) -> Self {
        self.hold = hold;
        self
    }

    /// Draw the next round.
    pub fn next_round(&mut self) -> RoundPlan {
        RoundPlan {
            resource: self.rng.gen_range(self.resources.clone()),
            capacity: self.rng.gen_range(self.capacity.clone()),
            delay: self.rng.gen_range(self.delay.clone()),
            hold: self.rng.gen_range(self.hold.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plans_stay_in_range() {
        let mut generator = WorkloadGenerator::new(Some(11), 2)
            .resources(0..=3)
            .capacity(2..=20)
            .delay(0..=5)
            .hold(1..=4);

        for _ in 0..200 {
            let plan = generator.next_round();
            assert!(plan.resource <= 3);
            assert!((2..=20).contains(&plan.capacity));
            assert!(plan.delay <= 5);
            assert!((1..=4).contains(&plan.hold));
        }
    }

    #[test]
    fn test_same_seed_same_plans() {
        let make = || WorkloadGenerator::new(Some(5), 1).capacity(1..=9).hold(0..=9);
        let mut a = make();
        let mut b = make();
        for _ in 0..20 {
            assert_eq!(a.next_round(), b.next_round());
        }
    }

    #[test]
    fn test_defaults_are_fixed() {
        let mut generator = WorkloadGenerator::new(None, 0);
        assert_eq!(
            generator.next_round(),
            RoundPlan { resource: 0, capacity: 1, delay: 0, hold: 0 }
        );
    }
}
