use hashbrown::HashMap;

/// The static cost the engine quoted for each opcode, as first observed.
///
/// The engine reports `budget_before - budget_after` for every executed instruction. For most
/// opcodes that quote is constant; for the rest the first observation is kept, which is what an
/// operator compares the measured costs against.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CostSchedule {
    quotes: HashMap<String, i64>,
}

impl CostSchedule {
    /// Create an empty schedule.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the quote for `opcode` unless one is already known. Returns whether it was new.
    pub fn quote(&mut self, opcode: &str, cost: i64) -> bool {
        if self.quotes.contains_key(opcode) {
            return false;
        }
        self.quotes.insert(opcode.to_owned(), cost);
        true
    }

    /// The first quote seen for `opcode`.
    #[must_use]
    pub fn get(&self, opcode: &str) -> Option<i64> {
        self.quotes.get(opcode).copied()
    }

    /// The number of distinct opcodes seen.
    #[must_use]
    pub fn len(&self) -> usize {
        self.quotes.len()
    }

    /// Whether no opcode has been seen.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.quotes.is_empty()
    }

    /// All quotes, sorted by opcode.
    #[must_use]
    pub fn sorted(&self) -> Vec<(&str, i64)> {
        let mut quotes: Vec<_> = self.quotes.iter().map(|(k, v)| (k.as_str(), *v)).collect();
        quotes.sort_unstable();
        quotes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_first_quote() {
        let mut schedule = CostSchedule::new();
        assert!(schedule.quote("SSTORE", 20_000));
        assert!(!schedule.quote("SSTORE", 2_900));
        assert!(schedule.quote("ADD", 3));
        assert_eq!(schedule.get("SSTORE"), Some(20_000));
        assert_eq!(schedule.get("MUL"), None);
        assert_eq!(schedule.sorted(), vec![("ADD", 3), ("SSTORE", 20_000)]);
    }
}
