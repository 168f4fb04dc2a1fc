//! The lifecycle controller driven by the execution engine's callbacks.

use core::mem::take;
use std::fmt::{Debug, Formatter, Result as FmtResult};

use strum_macros::{Display, IntoStaticStr};

use crate::{
    envelope, CostSchedule, CostWindow, Layout, Measurement, ResolutionGate, Row, Sampler,
    SeriesStore, TableSchema, TraceReport, TracerConfig, TracerError,
};

/// Opcode label of the row taken at transaction start.
pub const START_LABEL: &str = "<start>";

/// Opcode label of the row taken at transaction end.
pub const END_LABEL: &str = "<end>";

/// The callbacks an execution engine invokes while running one transaction.
///
/// Callbacks never fail: tracing is best-effort and must not change the outcome of the traced
/// transaction.
pub trait InstructionTracer {
    /// The transaction is about to run with `budget` available.
    fn on_transaction_start(&mut self, budget: u64);

    /// `opcode` is about to execute. `budget_before` is the remaining budget at this boundary;
    /// `budget_after` is what the engine expects to remain once the opcode's quoted cost is paid.
    fn on_instruction(&mut self, opcode: &str, budget_before: u64, budget_after: u64);

    /// `opcode` faulted. Faulted instructions are not recorded.
    fn on_fault(&mut self, _opcode: &str, _budget: u64, _error: &str) {}

    /// The transaction finished with `rest_budget` left.
    fn on_transaction_end(&mut self, rest_budget: u64);

    /// Encode everything recorded so far. Never mutates the tracer.
    fn result(&self) -> Result<serde_json::Value, TracerError>;

    /// Stop tracing. Rows already recorded are kept.
    fn stop(&mut self, reason: &str);
}

/// Where a [`Tracer`] is in the transaction lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum Phase {
    /// Constructed, no callback received.
    Created,
    /// Taking the baseline reading.
    Started,
    /// Between transaction start and end.
    Running,
    /// The transaction ended.
    Ended,
    /// Tracing was stopped early.
    Stopped,
}

/// Correlates resource readings with the cost of the instructions that caused them.
///
/// One tracer traces exactly one transaction. Rows are recorded according to the configured
/// [`Layout`]:
///
/// - [`Layout::Instruction`]: a row is opened at a sampled boundary for the opcode about to run
///   and closed at the next sampled boundary or at transaction end. Closing reads the samplers,
///   which report the interval since their previous reading, and takes the budget consumed over
///   the same interval. Budget consumed before the first sampled boundary is added to the first
///   row, so the cost column sums to the budget consumed by the transaction. A row that is still
///   open when the tracer is stopped is dropped.
/// - [`Layout::Snapshot`]: a [`START_LABEL`] row at transaction start, a row at every sampled
///   boundary with the budget consumed since the previous row, and an [`END_LABEL`] row if
///   `sample_at_end` is set.
/// - [`Layout::Envelope`]: the start row and, if `sample_at_end` is set, the end row.
///
/// A callback whose readings fail records nothing; every sampler is still read so that interval
/// samplers stay in step.
pub struct Tracer {
    config: TracerConfig,
    samplers: Vec<Box<dyn Sampler>>,
    gate: ResolutionGate,
    window: CostWindow,
    store: Box<dyn SeriesStore>,
    output: TableSchema,
    schedule: CostSchedule,
    phase: Phase,
    /// The opcode of the row opened at the last sampled boundary.
    pending: Option<String>,
    /// Budget consumed before the first row was opened.
    carry: i64,
    skipped: u64,
    stop_reason: Option<String>,
}

impl Tracer {
    /// Create a tracer that reads the platform samplers of the configured dimensions.
    pub fn new(config: TracerConfig) -> Result<Self, TracerError> {
        let samplers = config.dimensions.iter().map(|d| d.sampler()).collect();
        Self::with_samplers(config, samplers)
    }

    /// Create a tracer over the given samplers, one per configured dimension and in the same
    /// order.
    pub fn with_samplers(
        config: TracerConfig,
        samplers: Vec<Box<dyn Sampler>>,
    ) -> Result<Self, TracerError> {
        config.validate()?;
        let provided: Vec<_> = samplers.iter().map(|s| s.dimension()).collect();
        if provided != config.dimensions {
            return Err(TracerError::config(format!(
                "samplers {provided:?} do not match dimensions {:?}",
                config.dimensions
            )));
        }

        let columns: Vec<&'static str> =
            samplers.iter().flat_map(|s| s.columns().iter().copied()).collect();
        let gate = ResolutionGate::new(config.resolution)?;
        let store = config.store.open(columns.clone())?;
        let output = config.layout.schema(columns);
        tracing::debug!(
            "tracer created: layout={}, resolution={}, dimensions={:?}, store={}",
            config.layout,
            config.resolution,
            config.dimensions,
            config.store
        );

        Ok(Self {
            config,
            samplers,
            gate,
            window: CostWindow::new(),
            store,
            output,
            schedule: CostSchedule::new(),
            phase: Phase::Created,
            pending: None,
            carry: 0,
            skipped: 0,
            stop_reason: None,
        })
    }

    /// The configuration the tracer was built with.
    #[must_use]
    pub fn config(&self) -> &TracerConfig {
        &self.config
    }

    /// The current lifecycle phase.
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// The header of the result table.
    #[must_use]
    pub fn header(&self) -> Vec<&'static str> {
        self.output.header()
    }

    /// The quoted cost of every opcode seen so far.
    #[must_use]
    pub fn schedule(&self) -> &CostSchedule {
        &self.schedule
    }

    /// Rows lost to failed readings.
    #[must_use]
    pub fn skipped_rows(&self) -> u64 {
        self.skipped
    }

    /// The reason passed to [`InstructionTracer::stop`], if the tracer was stopped.
    #[must_use]
    pub fn stop_reason(&self) -> Option<&str> {
        self.stop_reason.as_deref()
    }

    /// The number of rows recorded so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// Whether no row has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Every recorded row, including the opcode labels and costs that the snapshot and envelope
    /// tables leave out.
    pub fn rows(&self) -> Result<Vec<Row>, TracerError> {
        self.store.snapshot()
    }

    /// Aggregate the recorded rows by opcode.
    pub fn report(&self) -> Result<TraceReport, TracerError> {
        let rows = self.rows()?;
        let report = TraceReport::from_rows(self.output.columns().to_vec(), &rows);
        Ok(report.with_schedule(&self.schedule))
    }

    /// Produce the result and release the tracer's resources.
    pub fn finish(self) -> Result<serde_json::Value, TracerError> {
        let result = self.result();
        tracing::debug!("tracer finished with {} rows", self.store.len());
        result
    }

    /// Read every sampler. Returns `None` if any reading failed.
    fn sample(&mut self) -> Option<Vec<Measurement>> {
        let mut row = Vec::with_capacity(self.output.width());
        let mut complete = true;
        for sampler in &mut self.samplers {
            match sampler.sample() {
                Ok(values) if values.len() == sampler.columns().len() => row.extend(values),
                Ok(values) => {
                    tracing::warn!(
                        "{} sampler returned {} values for {} columns",
                        sampler.dimension(),
                        values.len(),
                        sampler.columns().len()
                    );
                    complete = false;
                }
                Err(e) => {
                    tracing::warn!("{e}");
                    complete = false;
                }
            }
        }
        complete.then_some(row)
    }

    /// Sample and append a row, or count it as skipped.
    fn record(&mut self, opcode: String, cost: i64) {
        let Some(measurements) = self.sample() else {
            tracing::warn!("skipping row for `{opcode}`");
            self.skipped += 1;
            return;
        };
        if let Err(e) = self.store.append(Row { opcode, cost, measurements }) {
            tracing::error!("failed to record row: {e}");
            self.skipped += 1;
        }
    }

    fn transition(&mut self, phase: Phase) {
        tracing::debug!("tracer {} -> {}", self.phase, phase);
        self.phase = phase;
    }
}

impl InstructionTracer for Tracer {
    fn on_transaction_start(&mut self, budget: u64) {
        if self.phase != Phase::Created {
            tracing::trace!("ignoring transaction start in phase {}", self.phase);
            return;
        }
        self.transition(Phase::Started);
        self.window.reset();
        self.window.observe(budget);
        match self.config.layout {
            // Primes the interval samplers.
            Layout::Instruction => {
                if self.sample().is_none() {
                    tracing::warn!("baseline reading failed");
                }
            }
            Layout::Snapshot | Layout::Envelope => self.record(START_LABEL.to_string(), 0),
        }
        self.transition(Phase::Running);
    }

    fn on_instruction(&mut self, opcode: &str, budget_before: u64, budget_after: u64) {
        if self.phase != Phase::Running {
            tracing::trace!("ignoring `{opcode}` in phase {}", self.phase);
            return;
        }
        self.schedule.quote(opcode, budget_before.wrapping_sub(budget_after) as i64);
        if !self.gate.tick() {
            return;
        }

        match self.config.layout {
            Layout::Instruction => {
                let delta = self.window.observe(budget_before).unwrap_or_default();
                match self.pending.replace(opcode.to_string()) {
                    Some(open) => {
                        let cost = delta + take(&mut self.carry);
                        self.record(open, cost);
                    }
                    None => self.carry += delta,
                }
            }
            Layout::Snapshot => {
                let delta = self.window.observe(budget_before).unwrap_or_default();
                self.record(opcode.to_string(), delta);
            }
            Layout::Envelope => {}
        }
    }

    fn on_transaction_end(&mut self, rest_budget: u64) {
        if self.phase != Phase::Running {
            tracing::trace!("ignoring transaction end in phase {}", self.phase);
            return;
        }
        self.transition(Phase::Ended);
        let delta = self.window.flush(rest_budget);
        match self.config.layout {
            Layout::Instruction => {
                if let Some(open) = self.pending.take() {
                    let cost = delta + take(&mut self.carry);
                    self.record(open, cost);
                }
            }
            Layout::Snapshot | Layout::Envelope => {
                if self.config.sample_at_end {
                    self.record(END_LABEL.to_string(), delta);
                }
            }
        }
        if self.skipped > 0 {
            tracing::warn!("{} rows skipped after failed readings", self.skipped);
        }
    }

    fn result(&self) -> Result<serde_json::Value, TracerError> {
        let rows = self.store.snapshot()?;
        Ok(envelope(self.output.encode(&rows)?))
    }

    fn stop(&mut self, reason: &str) {
        if matches!(self.phase, Phase::Ended | Phase::Stopped) {
            tracing::trace!("ignoring stop in phase {}", self.phase);
            return;
        }
        if let Some(open) = self.pending.take() {
            tracing::debug!("dropping open row for `{open}`");
        }
        self.stop_reason = Some(reason.to_string());
        self.transition(Phase::Stopped);
    }
}

impl Debug for Tracer {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("Tracer")
            .field("config", &self.config)
            .field("phase", &self.phase)
            .field("gate", &self.gate)
            .field("window", &self.window)
            .field("store", &self.store)
            .field("pending", &self.pending)
            .field("skipped", &self.skipped)
            .finish_non_exhaustive()
    }
}
