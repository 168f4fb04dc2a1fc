use serde_json::Value;
use strum_macros::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::{Dimension, Layout, StoreBackend, Tracer, TracerConfig, TracerError};

/// The tracer variants registered by default.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, IntoStaticStr,
)]
#[strum(serialize_all = "camelCase")]
pub enum Preset {
    /// Process memory every 100 instructions, spooled to a temporary file.
    MemoryTracer,
    /// Process memory at transaction start and end.
    MemoryTransactionTracer,
    /// CPU cycles of every instruction.
    CycleTracer,
    /// Wall-clock time of every instruction.
    TimingTracer,
    /// Cumulative process I/O every 100 instructions.
    StorageTracer,
    /// Block I/O throughput every 100 instructions.
    StorageRateTracer,
}

impl Preset {
    /// The registry name of this preset.
    #[must_use]
    pub fn name(self) -> &'static str {
        self.into()
    }

    /// The configuration this preset builds tracers with.
    #[must_use]
    pub fn config(self) -> TracerConfig {
        let (dimension, layout, resolution, store) = match self {
            Preset::MemoryTracer => (Dimension::Memory, Layout::Snapshot, 100, StoreBackend::File),
            Preset::MemoryTransactionTracer => {
                (Dimension::Memory, Layout::Envelope, 100, StoreBackend::Memory)
            }
            Preset::CycleTracer => {
                (Dimension::Cycles, Layout::Instruction, 1, StoreBackend::Memory)
            }
            Preset::TimingTracer => {
                (Dimension::WallClock, Layout::Instruction, 1, StoreBackend::Memory)
            }
            Preset::StorageTracer => (Dimension::Io, Layout::Snapshot, 100, StoreBackend::Memory),
            Preset::StorageRateTracer => {
                (Dimension::IoRate, Layout::Snapshot, 100, StoreBackend::Memory)
            }
        };
        TracerConfig {
            resolution,
            dimensions: vec![dimension],
            layout,
            sample_at_end: true,
            store,
        }
    }

    /// Build a tracer from this preset, with optional JSON overrides of its configuration.
    pub fn build(self, overrides: Option<&Value>) -> Result<Tracer, TracerError> {
        let config = match overrides {
            Some(overrides) => self.config().with_overrides(overrides)?,
            None => self.config(),
        };
        Tracer::new(config)
    }
}
