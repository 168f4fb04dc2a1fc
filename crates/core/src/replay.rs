//! Recorded step traces, replayed through the [`InstructionTracer`] callbacks.
//!
//! A trace is a JSON-lines stream, one event per line:
//!
//! ```text
//! {"event":"start","budget":1000}
//! {"event":"step","opcode":"ADD","budget":900,"cost":3}
//! {"event":"end","restBudget":800}
//! ```

use std::io::BufRead;

use serde::{Deserialize, Serialize};

use crate::{InstructionTracer, TracerError};

/// One callback of a recorded execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum TraceEvent {
    /// The transaction starts with `budget` available.
    Start {
        /// The initial budget.
        budget: u64,
    },
    /// `opcode` is about to execute with `budget` remaining and a quoted cost of `cost`.
    Step {
        /// The instruction name.
        opcode: String,
        /// The remaining budget before the instruction.
        budget: u64,
        /// The cost the engine quotes for the instruction.
        cost: u64,
    },
    /// `opcode` faulted.
    Fault {
        /// The instruction name.
        opcode: String,
        /// The remaining budget at the fault.
        budget: u64,
        /// The engine's description of the fault.
        error: String,
    },
    /// The transaction ends with `rest_budget` left.
    End {
        /// The budget left over.
        rest_budget: u64,
    },
    /// The host stops tracing.
    Stop {
        /// Why tracing stopped.
        reason: String,
    },
}

/// Parse a JSON-lines trace. Blank lines are skipped.
pub fn parse_trace(reader: impl BufRead) -> Result<Vec<TraceEvent>, TracerError> {
    let mut events = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| TracerError::Serialization(format!("line {}: {e}", i + 1)))?;
        if line.trim().is_empty() {
            continue;
        }
        let event = serde_json::from_str(&line)
            .map_err(|e| TracerError::Serialization(format!("line {}: {e}", i + 1)))?;
        events.push(event);
    }
    Ok(events)
}

/// Split a trace into transactions. Every `start` event begins a new transaction.
#[must_use]
pub fn split_transactions(events: &[TraceEvent]) -> Vec<&[TraceEvent]> {
    let mut transactions = Vec::new();
    let mut begin = 0;
    for (i, event) in events.iter().enumerate() {
        if matches!(event, TraceEvent::Start { .. }) && i > begin {
            transactions.push(&events[begin..i]);
            begin = i;
        }
    }
    if begin < events.len() {
        transactions.push(&events[begin..]);
    }
    transactions
}

/// Drive `tracer` through `events`.
pub fn replay(events: &[TraceEvent], tracer: &mut dyn InstructionTracer) {
    for event in events {
        match event {
            TraceEvent::Start { budget } => tracer.on_transaction_start(*budget),
            TraceEvent::Step { opcode, budget, cost } => {
                tracer.on_instruction(opcode, *budget, budget.saturating_sub(*cost));
            }
            TraceEvent::Fault { opcode, budget, error } => tracer.on_fault(opcode, *budget, error),
            TraceEvent::End { rest_budget } => tracer.on_transaction_end(*rest_budget),
            TraceEvent::Stop { reason } => tracer.stop(reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRACE: &str = r#"{"event":"start","budget":1000}

{"event":"step","opcode":"ADD","budget":900,"cost":3}
{"event":"fault","opcode":"MUL","budget":850,"error":"stack underflow"}
{"event":"end","restBudget":800}
{"event":"start","budget":50}
{"event":"stop","reason":"cancelled"}
"#;

    #[test]
    fn parses_events() {
        let events = parse_trace(TRACE.as_bytes()).unwrap();
        assert_eq!(events.len(), 6);
        assert_eq!(events[0], TraceEvent::Start { budget: 1000 });
        assert_eq!(
            events[2],
            TraceEvent::Fault {
                opcode: "MUL".to_string(),
                budget: 850,
                error: "stack underflow".to_string()
            }
        );
        assert_eq!(events[3], TraceEvent::End { rest_budget: 800 });
    }

    #[test]
    fn serializes_camel_case() {
        let text = serde_json::to_string(&TraceEvent::End { rest_budget: 7 }).unwrap();
        assert_eq!(text, r#"{"event":"end","restBudget":7}"#);
    }

    #[test]
    fn reports_bad_line() {
        let text = "{\"event\":\"start\",\"budget\":1}\n{\"event\":\"jump\"}\n";
        let err = parse_trace(text.as_bytes()).unwrap_err();
        assert!(matches!(err, TracerError::Serialization(msg) if msg.starts_with("line 2")));
    }

    #[test]
    fn splits_on_start() {
        let events = parse_trace(TRACE.as_bytes()).unwrap();
        let transactions = split_transactions(&events);
        assert_eq!(transactions.iter().map(|t| t.len()).collect::<Vec<_>>(), vec![4, 2]);
        assert!(split_transactions(&[]).is_empty());
    }

    #[derive(Default)]
    struct Recorder(Vec<String>);

    impl InstructionTracer for Recorder {
        fn on_transaction_start(&mut self, budget: u64) {
            self.0.push(format!("start {budget}"));
        }

        fn on_instruction(&mut self, opcode: &str, budget_before: u64, budget_after: u64) {
            self.0.push(format!("{opcode} {budget_before} {budget_after}"));
        }

        fn on_transaction_end(&mut self, rest_budget: u64) {
            self.0.push(format!("end {rest_budget}"));
        }

        fn result(&self) -> Result<serde_json::Value, TracerError> {
            Ok(serde_json::Value::Null)
        }

        fn stop(&mut self, reason: &str) {
            self.0.push(format!("stop {reason}"));
        }
    }

    #[test]
    fn replays_callbacks() {
        let events = parse_trace(TRACE.as_bytes()).unwrap();
        let mut recorder = Recorder::default();
        replay(&events, &mut recorder);
        assert_eq!(
            recorder.0,
            vec!["start 1000", "ADD 900 897", "end 800", "start 50", "stop cancelled"]
        );
    }
}
