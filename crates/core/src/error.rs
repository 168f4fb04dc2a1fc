use thiserror::Error;

use crate::Dimension;

/// An error surfaced synchronously to the caller of a tracer operation.
#[derive(Error, Debug)]
pub enum TracerError {
    /// The tracer was constructed with invalid parameters and is not usable.
    #[error("invalid tracer configuration: {0}")]
    Configuration(String),

    /// The aligned series disagree on their length, so no result can be produced.
    #[error("aligned series length mismatch: {0}")]
    DataIntegrity(String),

    /// A table, configuration or trace could not be encoded or decoded.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// No tracer is registered under the requested name.
    #[error("no tracer registered under `{0}`")]
    UnknownTracer(String),

    /// A tracer is already registered under the given name.
    #[error("tracer `{0}` is already registered")]
    DuplicateTracer(String),
}

impl TracerError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }
}

impl From<csv::Error> for TracerError {
    fn from(err: csv::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for TracerError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// A platform resource read failed for one callback.
///
/// Never propagated out of a lifecycle callback: the controller logs it and skips the row.
#[derive(Error, Debug)]
#[error("{dimension} sampling unavailable: {reason}")]
pub struct SamplingUnavailable {
    /// The dimension whose reading failed.
    pub dimension: Dimension,
    /// Why the reading failed.
    pub reason: String,
}

impl SamplingUnavailable {
    /// Create a new [`SamplingUnavailable`] for `dimension`.
    pub fn new(dimension: Dimension, reason: impl Into<String>) -> Self {
        Self { dimension, reason: reason.into() }
    }
}
