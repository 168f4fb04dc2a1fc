use core::mem::take;

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

use crate::{Dimension, StoreBackend, TableSchema, TracerError};

/// The default sampling divisor.
pub const DEFAULT_RESOLUTION: u64 = 100;

/// How recorded rows relate to instruction boundaries.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum Layout {
    /// One row per sampled instruction, covering the interval until the next sampled boundary.
    /// The table carries the opcode and cost columns.
    #[default]
    Instruction,
    /// A point-in-time row at transaction start, at each sampled boundary and optionally at
    /// transaction end.
    Snapshot,
    /// A row at transaction start and one at transaction end.
    Envelope,
}

impl Layout {
    /// The output table layout for the given measurement columns.
    #[must_use]
    pub fn schema(self, columns: Vec<&'static str>) -> TableSchema {
        match self {
            Layout::Instruction => TableSchema::full(columns),
            Layout::Snapshot | Layout::Envelope => TableSchema::new(columns, false, false),
        }
    }
}

/// Construction parameters of a [`Tracer`](crate::Tracer).
///
/// Deserializes from camelCase JSON; missing fields take their defaults and unknown fields are
/// rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct TracerConfig {
    /// Sample every `resolution`-th instruction boundary.
    pub resolution: u64,
    /// The sampled dimensions, in column order.
    pub dimensions: Vec<Dimension>,
    /// How rows relate to instruction boundaries.
    pub layout: Layout,
    /// Whether snapshot and envelope layouts take a final row at transaction end.
    pub sample_at_end: bool,
    /// Where rows are kept until the result is requested.
    pub store: StoreBackend,
}

impl Default for TracerConfig {
    fn default() -> Self {
        Self {
            resolution: DEFAULT_RESOLUTION,
            dimensions: Vec::new(),
            layout: Layout::default(),
            sample_at_end: true,
            store: StoreBackend::default(),
        }
    }
}

impl TracerConfig {
    /// Create a new config builder. See [`TracerConfigBuilder`] for more details.
    #[must_use]
    pub fn builder() -> TracerConfigBuilder {
        TracerConfigBuilder::new()
    }

    /// Parse a config from JSON, then validate it.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, TracerError> {
        let config = Self::deserialize(value).map_err(|e| TracerError::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Apply the fields of a JSON object on top of this config and validate the outcome.
    pub fn with_overrides(self, overrides: &serde_json::Value) -> Result<Self, TracerError> {
        let serde_json::Value::Object(fields) = overrides else {
            let msg = format!("overrides must be a JSON object, got {overrides}");
            return Err(TracerError::config(msg));
        };
        let mut merged = serde_json::to_value(&self)?;
        if let serde_json::Value::Object(base) = &mut merged {
            for (key, value) in fields {
                if base.contains_key(key) {
                    tracing::debug!("overriding tracer config field `{key}` with {value}");
                }
                base.insert(key.clone(), value.clone());
            }
        }
        Self::from_json(&merged)
    }

    /// Check the invariants a tracer relies on.
    pub fn validate(&self) -> Result<(), TracerError> {
        if self.resolution == 0 {
            return Err(TracerError::config("resolution must be a positive integer"));
        }
        if self.dimensions.is_empty() {
            return Err(TracerError::config("at least one dimension must be sampled"));
        }
        for (i, dimension) in self.dimensions.iter().enumerate() {
            if self.dimensions[..i].contains(dimension) {
                return Err(TracerError::config(format!("dimension `{dimension}` listed twice")));
            }
        }
        Ok(())
    }

    /// The measurement columns of the sampled dimensions, in order.
    #[must_use]
    pub fn columns(&self) -> Vec<&'static str> {
        self.dimensions.iter().flat_map(|d| d.columns().iter().copied()).collect()
    }
}

/// A builder for [`TracerConfig`].
#[derive(Debug, Clone, Default)]
pub struct TracerConfigBuilder {
    resolution: Option<u64>,
    dimensions: Vec<Dimension>,
    layout: Option<Layout>,
    sample_at_end: Option<bool>,
    store: Option<StoreBackend>,
}

impl TracerConfigBuilder {
    /// Create a new [`TracerConfigBuilder`].
    ///
    /// Prefer using [`TracerConfig::builder`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and return the [`TracerConfig`].
    ///
    /// Clears and resets the builder, allowing it to be reused.
    pub fn build(&mut self) -> Result<TracerConfig, TracerError> {
        let defaults = TracerConfig::default();
        let config = TracerConfig {
            resolution: take(&mut self.resolution).unwrap_or(defaults.resolution),
            dimensions: take(&mut self.dimensions),
            layout: take(&mut self.layout).unwrap_or(defaults.layout),
            sample_at_end: take(&mut self.sample_at_end).unwrap_or(defaults.sample_at_end),
            store: take(&mut self.store).unwrap_or(defaults.store),
        };
        config.validate()?;
        Ok(config)
    }

    /// Set the sampling divisor.
    pub fn resolution(&mut self, resolution: u64) -> &mut Self {
        self.resolution = Some(resolution);
        self
    }

    /// Add a sampled dimension. Columns follow the order in which dimensions are added.
    pub fn dimension(&mut self, dimension: Dimension) -> &mut Self {
        self.dimensions.push(dimension);
        self
    }

    /// Set the row layout.
    pub fn layout(&mut self, layout: Layout) -> &mut Self {
        self.layout = Some(layout);
        self
    }

    /// Set whether a final row is taken at transaction end.
    pub fn sample_at_end(&mut self, value: bool) -> &mut Self {
        self.sample_at_end = Some(value);
        self
    }

    /// Set the row store.
    pub fn store(&mut self, store: StoreBackend) -> &mut Self {
        self.store = Some(store);
        self
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn defaults() {
        let config = TracerConfig::builder().dimension(Dimension::Cycles).build().unwrap();
        assert_eq!(config.resolution, DEFAULT_RESOLUTION);
        assert_eq!(config.layout, Layout::Instruction);
        assert_eq!(config.store, StoreBackend::Memory);
        assert_eq!(config.columns(), vec!["cycles"]);
    }

    #[test]
    fn builder_is_reusable() {
        let mut builder = TracerConfig::builder();
        builder.resolution(7).dimension(Dimension::Io).store(StoreBackend::File);
        let first = builder.build().unwrap();
        assert_eq!(first.resolution, 7);
        assert!(matches!(builder.build(), Err(TracerError::Configuration(_))));
        let second = builder.dimension(Dimension::Memory).build().unwrap();
        assert_eq!(second.resolution, DEFAULT_RESOLUTION);
        assert_eq!(second.store, StoreBackend::Memory);
    }

    #[test]
    fn rejects_invalid() {
        let zero = TracerConfig::builder().resolution(0).dimension(Dimension::Cycles).build();
        assert!(matches!(zero, Err(TracerError::Configuration(_))));
        let empty = TracerConfig::builder().build();
        assert!(matches!(empty, Err(TracerError::Configuration(_))));
        let twice = TracerConfig::builder()
            .dimension(Dimension::Cycles)
            .dimension(Dimension::Cycles)
            .build();
        assert!(matches!(twice, Err(TracerError::Configuration(_))));
    }

    #[test]
    fn parses_json() {
        let config = TracerConfig::from_json(&json!({
            "resolution": 5,
            "dimensions": ["wall-clock", "io-rate"],
            "layout": "snapshot",
            "sampleAtEnd": false,
            "store": "file",
        }))
        .unwrap();
        assert_eq!(config.dimensions, vec![Dimension::WallClock, Dimension::IoRate]);
        assert_eq!(config.layout, Layout::Snapshot);
        assert!(!config.sample_at_end);
        assert_eq!(config.columns(), vec!["time", "IOReadBytes", "IOWriteBytes", "IOUsage"]);
    }

    #[test]
    fn overrides_merge_onto_base() {
        let base = TracerConfig::builder().dimension(Dimension::Memory).build().unwrap();
        let config = base.clone().with_overrides(&json!({ "resolution": 1 })).unwrap();
        assert_eq!(config.resolution, 1);
        assert_eq!(config.dimensions, base.dimensions);

        for bad in [json!({ "resolution": 0 }), json!({ "bogus": 1 }), json!([1]), json!(3)] {
            let err = base.clone().with_overrides(&bad).unwrap_err();
            assert!(matches!(err, TracerError::Configuration(_)), "{bad}: {err}");
        }
    }

    #[test]
    fn layout_schemas() {
        let instruction = Layout::Instruction.schema(vec!["time"]);
        assert_eq!(instruction.header(), vec!["opcode", "time", "cost"]);
        assert_eq!(Layout::Envelope.schema(vec!["heapAlloc"]).header(), vec!["heapAlloc"]);
    }
}
