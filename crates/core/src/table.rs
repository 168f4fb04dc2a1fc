//! Tabular encoding of recorded rows.

use csv::{ReaderBuilder, StringRecord, Terminator, WriterBuilder};

use crate::{Measurement, Row, TracerError};

/// The header of the opcode column.
pub const OPCODE_COLUMN: &str = "opcode";

/// The header of the cost column.
pub const COST_COLUMN: &str = "cost";

/// The fixed column layout of an encoded table.
///
/// The layout is `opcode` (optional), the measurement columns in sampler order, then `cost`
/// (optional).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    columns: Vec<&'static str>,
    include_opcode: bool,
    include_cost: bool,
}

impl TableSchema {
    /// Create a schema over the given measurement columns.
    #[must_use]
    pub fn new(columns: Vec<&'static str>, include_opcode: bool, include_cost: bool) -> Self {
        Self { columns, include_opcode, include_cost }
    }

    /// A schema that keeps every field of a [`Row`].
    #[must_use]
    pub fn full(columns: Vec<&'static str>) -> Self {
        Self::new(columns, true, true)
    }

    /// The measurement columns.
    #[must_use]
    pub fn columns(&self) -> &[&'static str] {
        &self.columns
    }

    /// The number of measurements each row must carry.
    #[must_use]
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    /// The header record.
    #[must_use]
    pub fn header(&self) -> Vec<&'static str> {
        let mut header = Vec::with_capacity(self.columns.len() + 2);
        if self.include_opcode {
            header.push(OPCODE_COLUMN);
        }
        header.extend_from_slice(&self.columns);
        if self.include_cost {
            header.push(COST_COLUMN);
        }
        header
    }

    pub(crate) fn check_width(&self, row: &Row) -> Result<(), TracerError> {
        if row.measurements.len() == self.width() {
            return Ok(());
        }
        Err(TracerError::DataIntegrity(format!(
            "row for `{}` has {} measurements, expected {}",
            row.opcode,
            row.measurements.len(),
            self.width()
        )))
    }

    pub(crate) fn record(&self, row: &Row) -> Vec<String> {
        let mut record = Vec::with_capacity(self.columns.len() + 2);
        if self.include_opcode {
            record.push(row.opcode.clone());
        }
        record.extend(row.measurements.iter().map(ToString::to_string));
        if self.include_cost {
            record.push(row.cost.to_string());
        }
        record
    }

    pub(crate) fn parse_record(&self, record: &StringRecord) -> Result<Row, TracerError> {
        let expected = self.header().len();
        if record.len() != expected {
            return Err(integrity(format!(
                "record has {} fields, expected {expected}",
                record.len()
            )));
        }

        let mut fields = record.iter();
        let opcode = if self.include_opcode {
            fields.next().unwrap_or_default().to_string()
        } else {
            String::new()
        };
        let measurements = fields
            .by_ref()
            .take(self.width())
            .map(|field| field.parse::<Measurement>().map_err(integrity))
            .collect::<Result<Vec<_>, _>>()?;
        let cost = if self.include_cost {
            let field = fields.next().unwrap_or_default();
            field.parse::<i64>().map_err(|_| integrity(format!("invalid cost `{field}`")))?
        } else {
            0
        };
        Ok(Row { opcode, cost, measurements })
    }

    /// Encode `rows` as CSV text: a header line followed by one line per row.
    pub fn encode(&self, rows: &[Row]) -> Result<String, TracerError> {
        let mut writer =
            WriterBuilder::new().terminator(Terminator::Any(b'\n')).from_writer(Vec::new());
        writer.write_record(self.header())?;
        for row in rows {
            self.check_width(row)?;
            writer.write_record(self.record(row))?;
        }
        let bytes = writer.into_inner().map_err(|e| TracerError::Serialization(e.to_string()))?;
        String::from_utf8(bytes).map_err(|e| TracerError::Serialization(e.to_string()))
    }

    /// Decode CSV text produced by [`Self::encode`].
    ///
    /// Fields that the schema omits come back empty: `""` for the opcode and `0` for the cost.
    pub fn decode(&self, text: &str) -> Result<Vec<Row>, TracerError> {
        let mut reader =
            ReaderBuilder::new().has_headers(true).flexible(true).from_reader(text.as_bytes());
        let header = reader.headers().map_err(integrity)?;
        if !header.iter().eq(self.header()) {
            return Err(integrity(format!(
                "unexpected header `{}`, expected `{}`",
                header.iter().collect::<Vec<_>>().join(","),
                self.header().join(",")
            )));
        }
        reader.records().map(|record| self.parse_record(&record.map_err(integrity)?)).collect()
    }
}

/// Wrap encoded table text as the JSON result envelope.
#[must_use]
pub fn envelope(table: String) -> serde_json::Value {
    serde_json::Value::String(table)
}

fn integrity(err: impl ToString) -> TracerError {
    TracerError::DataIntegrity(err.to_string())
}
