use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    hash::Hash,
    ops::{Add, AddAssign},
};

use hashbrown::{hash_map::Entry, HashMap};

use crate::{CostSchedule, Row};

/// Per-opcode aggregates over the recorded rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OpcodeStats {
    /// The number of rows.
    pub count: u64,
    /// The summed cost.
    pub total_cost: i64,
    /// The summed readings, one per measurement column.
    pub sums: Vec<f64>,
}

impl OpcodeStats {
    /// The mean reading of each column.
    #[must_use]
    pub fn means(&self) -> Vec<f64> {
        if self.count == 0 {
            return vec![0.0; self.sums.len()];
        }
        self.sums.iter().map(|sum| sum / self.count as f64).collect()
    }
}

impl AddAssign for OpcodeStats {
    fn add_assign(&mut self, rhs: Self) {
        self.count += rhs.count;
        self.total_cost += rhs.total_cost;
        if self.sums.len() < rhs.sums.len() {
            self.sums.resize(rhs.sums.len(), 0.0);
        }
        for (sum, value) in self.sums.iter_mut().zip(rhs.sums) {
            *sum += value;
        }
    }
}

/// A summary of one or more traced transactions, grouped by opcode.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TraceReport {
    /// The measurement columns the sums refer to.
    pub columns: Vec<&'static str>,
    /// Aggregates per opcode label.
    pub opcodes: HashMap<String, OpcodeStats>,
    /// The engine's quoted cost per opcode.
    pub quoted_costs: HashMap<String, i64>,
}

impl TraceReport {
    /// Aggregate `rows` whose measurements follow `columns`.
    #[must_use]
    pub fn from_rows(columns: Vec<&'static str>, rows: &[Row]) -> Self {
        let mut opcodes: HashMap<String, OpcodeStats> = HashMap::new();
        for row in rows {
            let stats = opcodes.entry_ref(row.opcode.as_str()).or_insert_with(|| OpcodeStats {
                sums: vec![0.0; columns.len()],
                ..OpcodeStats::default()
            });
            stats.count += 1;
            stats.total_cost += row.cost;
            for (sum, value) in stats.sums.iter_mut().zip(&row.measurements) {
                *sum += value.as_f64();
            }
        }
        Self { columns, opcodes, quoted_costs: HashMap::new() }
    }

    /// Attach the quoted costs of `schedule`.
    #[must_use]
    pub fn with_schedule(mut self, schedule: &CostSchedule) -> Self {
        for (opcode, cost) in schedule.sorted() {
            self.quoted_costs.entry_ref(opcode).or_insert(cost);
        }
        self
    }

    /// The total number of rows.
    #[must_use]
    pub fn total_rows(&self) -> u64 {
        self.opcodes.values().map(|stats| stats.count).sum()
    }

    /// The total cost over all rows.
    #[must_use]
    pub fn total_cost(&self) -> i64 {
        self.opcodes.values().map(|stats| stats.total_cost).sum()
    }
}

/// Combines two maps. If a key is in both maps, the values are added together.
fn hashmap_add_assign<K, V>(lhs: &mut HashMap<K, V>, rhs: HashMap<K, V>)
where
    K: Eq + Hash,
    V: AddAssign,
{
    for (k, v) in rhs {
        // Can't use `.and_modify(...).or_insert(...)` because we want to use `v` in both places.
        match lhs.entry(k) {
            Entry::Occupied(e) => *e.into_mut() += v,
            Entry::Vacant(e) => {
                e.insert(v);
            }
        }
    }
}

impl AddAssign for TraceReport {
    fn add_assign(&mut self, rhs: Self) {
        if self.columns.is_empty() {
            self.columns = rhs.columns;
        }
        hashmap_add_assign(&mut self.opcodes, rhs.opcodes);
        for (opcode, cost) in rhs.quoted_costs {
            self.quoted_costs.entry(opcode).or_insert(cost);
        }
    }
}

impl Add for TraceReport {
    type Output = Self;

    fn add(mut self, rhs: Self) -> Self::Output {
        self += rhs;
        self
    }
}

/// Formats `entries` as aligned `key  value` lines, largest value first.
fn sorted_table_lines<V: Ord + Display>(entries: Vec<(&str, V)>) -> Vec<String> {
    let mut entries = entries;
    entries.sort_unstable_by(|(ka, va), (kb, vb)| vb.cmp(va).then_with(|| ka.cmp(kb)));
    let width = entries.iter().map(|(k, _)| k.len()).max().unwrap_or_default();
    entries.into_iter().map(|(k, v)| format_table_line(k, &v, width)).collect()
}

fn format_table_line(key: &str, value: &dyn Display, width: usize) -> String {
    format!("{key:<width$}  {value:>12}")
}

impl Display for TraceReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        writeln!(f, "opcode counts ({} total rows):", self.total_rows())?;
        let counts = self.opcodes.iter().map(|(k, s)| (k.as_str(), s.count)).collect();
        for line in sorted_table_lines(counts) {
            writeln!(f, "  {line}")?;
        }

        writeln!(f, "opcode costs ({} total cost):", self.total_cost())?;
        let costs = self.opcodes.iter().map(|(k, s)| (k.as_str(), s.total_cost)).collect();
        for line in sorted_table_lines(costs) {
            writeln!(f, "  {line}")?;
        }

        if !self.quoted_costs.is_empty() {
            writeln!(f, "quoted costs:")?;
            let quoted = self.quoted_costs.iter().map(|(k, v)| (k.as_str(), *v)).collect();
            for line in sorted_table_lines(quoted) {
                writeln!(f, "  {line}")?;
            }
        }

        if !self.columns.is_empty() {
            let width = self.opcodes.keys().map(String::len).max().unwrap_or_default();
            write!(f, "mean readings:\n  {:<width$}", "")?;
            for column in &self.columns {
                write!(f, "  {column:>12}")?;
            }
            writeln!(f)?;
            let mut opcodes: Vec<_> = self.opcodes.iter().collect();
            opcodes.sort_unstable_by(|(a, _), (b, _)| a.cmp(b));
            for (opcode, stats) in opcodes {
                write!(f, "  {opcode:<width$}")?;
                for mean in stats.means() {
                    write!(f, "  {mean:>12.2}")?;
                }
                writeln!(f)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::Measurement;

    use super::*;

    fn rows() -> Vec<Row> {
        vec![
            Row::new("ADD", 3, vec![Measurement::Int(10)]),
            Row::new("SSTORE", 20_000, vec![Measurement::Int(900)]),
            Row::new("ADD", 3, vec![Measurement::Int(14)]),
        ]
    }

    #[test]
    fn aggregates_by_opcode() {
        let report = TraceReport::from_rows(vec!["cycles"], &rows());
        assert_eq!(report.total_rows(), 3);
        assert_eq!(report.total_cost(), 20_006);
        let add = &report.opcodes["ADD"];
        assert_eq!(add.count, 2);
        assert_eq!(add.total_cost, 6);
        assert_eq!(add.means(), vec![12.0]);
    }

    #[test]
    fn add_merges_reports() {
        let mut schedule = CostSchedule::new();
        schedule.quote("ADD", 3);
        let a = TraceReport::from_rows(vec!["cycles"], &rows()).with_schedule(&schedule);
        let b = TraceReport::from_rows(vec!["cycles"], &rows()[..1]);
        let merged = a + b;
        assert_eq!(merged.opcodes["ADD"].count, 3);
        assert_eq!(merged.opcodes["ADD"].sums, vec![34.0]);
        assert_eq!(merged.quoted_costs["ADD"], 3);
    }

    #[test]
    fn display_sorts_by_value() {
        let text = TraceReport::from_rows(vec!["cycles"], &rows()).to_string();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "opcode counts (3 total rows):");
        assert!(lines[1].trim_start().starts_with("ADD"));
        assert!(lines[2].trim_start().starts_with("SSTORE"));
        assert!(text.contains("opcode costs (20006 total cost):"));
        assert!(text.contains("mean readings:"));
    }
}
