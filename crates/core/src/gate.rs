use core::num::NonZeroU64;

use crate::TracerError;

/// Returns whether the boundary numbered `counter` is sampled at the given `resolution`.
#[inline]
#[must_use]
pub const fn should_sample(counter: u64, resolution: NonZeroU64) -> bool {
    counter % resolution.get() == 0
}

/// The counter value following `counter`.
#[inline]
#[must_use]
pub const fn advance(counter: u64) -> u64 {
    counter.wrapping_add(1)
}

/// A frequency divider over instruction boundaries.
///
/// Holds nothing but the counter, so it can be rebuilt from [`Self::counter`] at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolutionGate {
    resolution: NonZeroU64,
    counter: u64,
}

impl ResolutionGate {
    /// Create a gate that samples every `resolution`-th boundary, starting with the first.
    pub fn new(resolution: u64) -> Result<Self, TracerError> {
        Self::from_counter(resolution, 0)
    }

    /// Rebuild a gate from a previously observed counter.
    pub fn from_counter(resolution: u64, counter: u64) -> Result<Self, TracerError> {
        let resolution = NonZeroU64::new(resolution)
            .ok_or_else(|| TracerError::config("resolution must be a positive integer"))?;
        Ok(Self { resolution, counter })
    }

    /// Decide whether the current boundary is sampled, then move to the next one.
    pub fn tick(&mut self) -> bool {
        let sample = should_sample(self.counter, self.resolution);
        self.counter = advance(self.counter);
        sample
    }

    /// The number of boundaries seen so far.
    #[must_use]
    pub const fn counter(&self) -> u64 {
        self.counter
    }

    /// The sampling divisor.
    #[must_use]
    pub const fn resolution(&self) -> u64 {
        self.resolution.get()
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn res(n: u64) -> NonZeroU64 {
        NonZeroU64::new(n).unwrap()
    }

    #[test]
    fn resolution_hundred() {
        assert!(should_sample(0, res(100)));
        assert!((1..100).all(|c| !should_sample(c, res(100))));
        assert!(should_sample(100, res(100)));
    }

    #[rstest]
    #[case(0)]
    #[case(1)]
    #[case(57)]
    #[case(u64::MAX)]
    fn resolution_one_always_samples(#[case] counter: u64) {
        assert!(should_sample(counter, res(1)));
    }

    #[test]
    fn zero_resolution_is_rejected() {
        assert!(matches!(ResolutionGate::new(0), Err(TracerError::Configuration(_))));
    }

    #[test]
    fn tick_advances() {
        let mut gate = ResolutionGate::new(3).unwrap();
        let picks: Vec<bool> = (0..7).map(|_| gate.tick()).collect();
        assert_eq!(picks, vec![true, false, false, true, false, false, true]);
        assert_eq!(gate.counter(), 7);
    }

    #[test]
    fn rebuilt_gate_continues() {
        let mut original = ResolutionGate::new(4).unwrap();
        for _ in 0..5 {
            original.tick();
        }
        let mut rebuilt = ResolutionGate::from_counter(4, original.counter()).unwrap();
        for _ in 0..10 {
            assert_eq!(original.tick(), rebuilt.tick());
        }
    }
}
