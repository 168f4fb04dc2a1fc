use std::time::Instant;

use crate::{Dimension, Measurement, Sampler, SamplingUnavailable};

/// Measures wall-clock nanoseconds between consecutive readings.
#[derive(Debug)]
pub struct WallClockSampler {
    last: Instant,
}

impl WallClockSampler {
    /// Create a sampler whose first interval starts now.
    #[must_use]
    pub fn new() -> Self {
        Self { last: Instant::now() }
    }
}

impl Default for WallClockSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl Sampler for WallClockSampler {
    fn dimension(&self) -> Dimension {
        Dimension::WallClock
    }

    fn sample(&mut self) -> Result<Vec<Measurement>, SamplingUnavailable> {
        let now = Instant::now();
        let nanos = now.duration_since(self.last).as_nanos();
        self.last = now;
        Ok(vec![Measurement::Int(i64::try_from(nanos).unwrap_or(i64::MAX))])
    }
}
