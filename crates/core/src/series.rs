//! Storage for the aligned per-row series.

use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::fs::File;
use std::path::Path;

use csv::{Terminator, Writer, WriterBuilder};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use tempfile::NamedTempFile;

use crate::{Measurement, TableSchema, TracerError};

/// One recorded row: an instruction (or a transaction edge) with its cost and readings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Row {
    /// The instruction name, or `<start>`/`<end>` for rows taken at transaction edges.
    pub opcode: String,
    /// The budget consumed over the interval the row covers.
    pub cost: i64,
    /// One reading per measurement column.
    pub measurements: Vec<Measurement>,
}

impl Row {
    /// Create a new [`Row`].
    pub fn new(opcode: impl Into<String>, cost: i64, measurements: Vec<Measurement>) -> Self {
        Self { opcode: opcode.into(), cost, measurements }
    }
}

/// Append-only storage for the opcode, cost and measurement series of one transaction.
///
/// Every append extends all series together or none of them.
pub trait SeriesStore: Send + Debug {
    /// Append one row. A row whose width does not match the store leaves the store untouched.
    fn append(&mut self, row: Row) -> Result<(), TracerError>;

    /// The number of rows appended so far.
    fn len(&self) -> usize;

    /// Whether no row has been appended.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether every series has the same length.
    fn lengths_consistent(&self) -> bool;

    /// Read back every row, in append order.
    fn snapshot(&self) -> Result<Vec<Row>, TracerError>;
}

/// Where a tracer keeps its rows until the result is requested.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum StoreBackend {
    /// Columnar vectors in process memory.
    #[default]
    Memory,
    /// CSV records appended to a temporary file.
    File,
}

impl StoreBackend {
    /// Open an empty store over the given measurement columns.
    pub fn open(self, columns: Vec<&'static str>) -> Result<Box<dyn SeriesStore>, TracerError> {
        Ok(match self {
            StoreBackend::Memory => Box::new(MemoryStore::new(columns.len())),
            StoreBackend::File => Box::new(FileStore::new(columns)?),
        })
    }
}

/// An in-memory columnar store.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    width: usize,
    opcodes: Vec<String>,
    costs: Vec<i64>,
    columns: Vec<Vec<Measurement>>,
}

impl MemoryStore {
    /// Create an empty store whose rows carry `width` measurements.
    #[must_use]
    pub fn new(width: usize) -> Self {
        Self { width, opcodes: vec![], costs: vec![], columns: vec![vec![]; width] }
    }
}

impl SeriesStore for MemoryStore {
    fn append(&mut self, row: Row) -> Result<(), TracerError> {
        if row.measurements.len() != self.width {
            return Err(TracerError::DataIntegrity(format!(
                "row for `{}` has {} measurements, expected {}",
                row.opcode,
                row.measurements.len(),
                self.width
            )));
        }
        for (column, value) in self.columns.iter_mut().zip(row.measurements) {
            column.push(value);
        }
        self.opcodes.push(row.opcode);
        self.costs.push(row.cost);
        Ok(())
    }

    fn len(&self) -> usize {
        self.opcodes.len()
    }

    fn lengths_consistent(&self) -> bool {
        let len = self.opcodes.len();
        self.costs.len() == len && self.columns.iter().all(|column| column.len() == len)
    }

    fn snapshot(&self) -> Result<Vec<Row>, TracerError> {
        if !self.lengths_consistent() {
            let lengths: Vec<usize> = self.columns.iter().map(Vec::len).collect();
            return Err(TracerError::DataIntegrity(format!(
                "{} opcodes, {} costs, measurement columns {lengths:?}",
                self.opcodes.len(),
                self.costs.len()
            )));
        }
        Ok((0..self.len())
            .map(|i| Row {
                opcode: self.opcodes[i].clone(),
                cost: self.costs[i],
                measurements: self.columns.iter().map(|column| column[i]).collect(),
            })
            .collect())
    }
}

/// A store that appends each row as a CSV record to a temporary file.
///
/// Records are flushed as they are appended, so [`SeriesStore::snapshot`] can be called any
/// number of times. The file is removed when the store is dropped.
pub struct FileStore {
    schema: TableSchema,
    writer: Writer<File>,
    file: NamedTempFile,
    rows: usize,
}

impl FileStore {
    /// Create a store backed by a fresh temporary file.
    pub fn new(columns: Vec<&'static str>) -> Result<Self, TracerError> {
        let schema = TableSchema::full(columns);
        let file = NamedTempFile::new()
            .map_err(|e| TracerError::config(format!("cannot create series file: {e}")))?;
        let handle = file
            .reopen()
            .map_err(|e| TracerError::config(format!("cannot open series file: {e}")))?;
        let mut writer = WriterBuilder::new()
            .has_headers(false)
            .terminator(Terminator::Any(b'\n'))
            .from_writer(handle);
        writer.write_record(schema.header())?;
        writer.flush().map_err(|e| TracerError::Serialization(e.to_string()))?;
        Ok(Self { schema, writer, file, rows: 0 })
    }

    /// The path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

impl Debug for FileStore {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("FileStore")
            .field("path", &self.file.path())
            .field("columns", &self.schema.columns())
            .field("rows", &self.rows)
            .finish_non_exhaustive()
    }
}

impl SeriesStore for FileStore {
    fn append(&mut self, row: Row) -> Result<(), TracerError> {
        self.schema.check_width(&row)?;
        self.writer.write_record(self.schema.record(&row))?;
        self.writer.flush().map_err(|e| TracerError::Serialization(e.to_string()))?;
        self.rows += 1;
        Ok(())
    }

    fn len(&self) -> usize {
        self.rows
    }

    fn lengths_consistent(&self) -> bool {
        self.snapshot().is_ok()
    }

    fn snapshot(&self) -> Result<Vec<Row>, TracerError> {
        let text = std::fs::read_to_string(self.file.path()).map_err(|e| {
            TracerError::DataIntegrity(format!("cannot read {}: {e}", self.path().display()))
        })?;
        let rows = self.schema.decode(&text)?;
        if rows.len() != self.rows {
            return Err(TracerError::DataIntegrity(format!(
                "series file holds {} rows, {} were appended",
                rows.len(),
                self.rows
            )));
        }
        Ok(rows)
    }
}
