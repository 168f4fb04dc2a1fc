//! Resource samplers and the platform accessors behind them.
//!
//! Every sampler produces one reading per call to [`Sampler::sample`], one value per column of
//! its [`Dimension`]. Point-in-time dimensions (memory, cumulative I/O) report the state at the
//! instant of the call. Interval dimensions (cycles, wall clock, I/O rate) report what happened
//! since the previous call on the same sampler, so the first call only establishes a reference.

mod clock;
mod cycles;
mod io;
mod memory;

use core::fmt::{Display, Formatter, Result as FmtResult};
use core::str::FromStr;

use serde::{Deserialize, Serialize};
use strum_macros::{Display as StrumDisplay, EnumIter, EnumString, IntoStaticStr};

pub use clock::WallClockSampler;
pub use cycles::CycleSampler;
pub use io::{io_rates, read_io_counters, IoCounters, IoRateSampler, IoSampler};
pub use memory::{read_memory_stats, MemorySampler, MemoryStats};

use crate::SamplingUnavailable;

/// A resource dimension that a tracer can sample.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    StrumDisplay,
    EnumString,
    EnumIter,
    IntoStaticStr,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum Dimension {
    /// Heap and stack occupancy, in MiB.
    Memory,
    /// CPU cycles spent in the sampled interval.
    Cycles,
    /// Wall-clock nanoseconds spent in the sampled interval.
    WallClock,
    /// Cumulative process I/O counters.
    Io,
    /// Block-device I/O throughput over the sampled interval, in bytes per second.
    IoRate,
}

impl Dimension {
    /// The table columns contributed by this dimension, in output order.
    #[must_use]
    pub const fn columns(self) -> &'static [&'static str] {
        match self {
            Dimension::Memory => {
                &["heapAlloc", "heapSys", "heapIdle", "heapInuse", "stackInUse", "stackSys"]
            }
            Dimension::Cycles => &["cycles"],
            Dimension::WallClock => &["time"],
            Dimension::Io => &["Rchar", "Wchar", "Syscr", "Syscw", "ReadBytes", "WriteBytes"],
            Dimension::IoRate => &["IOReadBytes", "IOWriteBytes", "IOUsage"],
        }
    }

    /// Whether a reading describes the span since the previous reading rather than a point in
    /// time.
    #[must_use]
    pub const fn is_interval(self) -> bool {
        matches!(self, Dimension::Cycles | Dimension::WallClock | Dimension::IoRate)
    }

    /// Build the platform sampler for this dimension.
    #[must_use]
    pub fn sampler(self) -> Box<dyn Sampler> {
        match self {
            Dimension::Memory => Box::new(MemorySampler::new()),
            Dimension::Cycles => Box::new(CycleSampler::new()),
            Dimension::WallClock => Box::new(WallClockSampler::new()),
            Dimension::Io => Box::new(IoSampler::new()),
            Dimension::IoRate => Box::new(IoRateSampler::new()),
        }
    }
}

/// A single sampled value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Measurement {
    /// An integral reading (MiB, cycles, nanoseconds, bytes, syscalls).
    Int(i64),
    /// A fractional reading (rates).
    Float(f64),
}

impl Measurement {
    /// The reading as a float, for aggregation.
    #[must_use]
    pub fn as_f64(self) -> f64 {
        match self {
            Measurement::Int(v) => v as f64,
            Measurement::Float(v) => v,
        }
    }
}

impl From<i64> for Measurement {
    fn from(value: i64) -> Self {
        Measurement::Int(value)
    }
}

impl From<u64> for Measurement {
    fn from(value: u64) -> Self {
        Measurement::Int(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<f64> for Measurement {
    fn from(value: f64) -> Self {
        Measurement::Float(value)
    }
}

impl Display for Measurement {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Measurement::Int(v) => write!(f, "{v}"),
            // `Debug` keeps the fractional part, so the value reads back as a float.
            Measurement::Float(v) => write!(f, "{v:?}"),
        }
    }
}

impl FromStr for Measurement {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(v) = s.parse::<i64>() {
            return Ok(Measurement::Int(v));
        }
        s.parse::<f64>().map(Measurement::Float).map_err(|_| format!("invalid measurement `{s}`"))
    }
}

/// A source of readings for one resource dimension.
pub trait Sampler: Send {
    /// The dimension this sampler reads.
    fn dimension(&self) -> Dimension;

    /// The columns produced by [`Self::sample`].
    fn columns(&self) -> &'static [&'static str] {
        self.dimension().columns()
    }

    /// Take one reading, one value per column.
    fn sample(&mut self) -> Result<Vec<Measurement>, SamplingUnavailable>;
}
