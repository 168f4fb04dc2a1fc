//! Instruction-level resource sampling for metered virtual machines.
//!
//! A [`Tracer`] receives the execution engine's per-instruction callbacks through
//! [`InstructionTracer`], samples the configured resource [`Dimension`]s, pairs every reading
//! with the budget consumed over the same interval and encodes the aligned rows as a CSV table.

#![warn(clippy::pedantic)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![warn(missing_docs)]

mod config;
mod cost;
mod error;
mod gate;
mod logger;
mod presets;
mod registry;
pub mod replay;
mod report;
pub mod sampler;
mod schedule;
mod series;
mod table;
mod tracer;

pub use config::*;
pub use cost::*;
pub use error::*;
pub use gate::*;
pub use logger::setup_logger;
pub use presets::*;
pub use registry::*;
pub use report::*;
pub use sampler::{Dimension, Measurement, Sampler};
pub use schedule::*;
pub use series::*;
pub use table::*;
pub use tracer::*;
