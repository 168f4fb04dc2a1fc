use std::{
    fs::File,
    io::{self, BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use clap::Parser;
use gasprobe_core::{
    lookup,
    replay::{parse_trace, replay, split_transactions},
    TraceReport,
};
use serde_json::Value;

#[derive(Parser, Debug)]
#[command(name = "replay", about = "Replay a recorded step trace through a tracer.")]
pub struct ReplayCmd {
    /// Name of the registered tracer, see `gasprobe list`.
    #[arg(short = 'n', long, default_value = "cycleTracer")]
    tracer: String,

    /// Path to the trace file. One JSON event per line; every `start` event begins a new
    /// transaction.
    #[arg(short = 't', long, required = true)]
    trace: PathBuf,

    /// JSON object overriding fields of the tracer configuration, e.g. `{"resolution":10}`.
    #[arg(short = 'c', long, env = "GASPROBE_CONFIG")]
    config: Option<String>,

    /// Print a per-opcode report after the results.
    #[arg(long)]
    report: bool,

    /// Write the results to this file instead of stdout, one JSON value per line.
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,
}

/// The outcome of replaying a trace file.
#[derive(Debug)]
pub struct Replayed {
    /// One result per transaction, in trace order.
    pub results: Vec<Value>,
    /// The merged report of every transaction, if requested.
    pub report: Option<TraceReport>,
}

impl ReplayCmd {
    pub fn run(&self) -> Result<()> {
        let overrides = self
            .config
            .as_deref()
            .map(serde_json::from_str::<Value>)
            .transpose()
            .context("--config is not valid JSON")?;
        let replayed = replay_file(&self.tracer, &self.trace, overrides.as_ref(), self.report)?;

        match &self.output {
            Some(path) => {
                let file = File::create(path)
                    .with_context(|| format!("failed to create {}", path.display()))?;
                write_results(BufWriter::new(file), &replayed.results)?;
            }
            None => write_results(io::stdout().lock(), &replayed.results)?,
        }

        if let Some(report) = replayed.report {
            write!(io::stdout().lock(), "{report}")?;
        }
        Ok(())
    }
}

/// Replay every transaction of the trace at `path` through a fresh tracer named `tracer`.
pub fn replay_file(
    tracer: &str,
    path: &Path,
    overrides: Option<&Value>,
    with_report: bool,
) -> Result<Replayed> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let events = parse_trace(BufReader::new(file))
        .with_context(|| format!("failed to parse {}", path.display()))?;

    let mut results = Vec::new();
    let mut report: Option<TraceReport> = None;
    for (i, events) in split_transactions(&events).into_iter().enumerate() {
        let mut instance = lookup(tracer, overrides)
            .with_context(|| format!("failed to create tracer `{tracer}`"))?;
        replay(events, &mut instance);
        tracing::info!(
            "transaction {i}: {} rows, {} skipped, phase {}",
            instance.len(),
            instance.skipped_rows(),
            instance.phase()
        );

        if with_report {
            let current = instance.report()?;
            report = Some(match report {
                Some(merged) => merged + current,
                None => current,
            });
        }
        results.push(instance.finish().with_context(|| format!("transaction {i}"))?);
    }
    Ok(Replayed { results, report })
}

fn write_results(mut out: impl Write, results: &[Value]) -> Result<()> {
    for result in results {
        serde_json::to_writer(&mut out, result)?;
        writeln!(out)?;
    }
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    fn trace_file(lines: &[&str]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        for line in lines {
            writeln!(file, "{line}").unwrap();
        }
        file
    }

    #[test]
    fn replays_each_transaction() {
        let file = trace_file(&[
            r#"{"event":"start","budget":100}"#,
            r#"{"event":"step","opcode":"PUSH1","budget":97,"cost":3}"#,
            r#"{"event":"step","opcode":"ADD","budget":94,"cost":3}"#,
            r#"{"event":"end","restBudget":91}"#,
            r#"{"event":"start","budget":50}"#,
            r#"{"event":"step","opcode":"STOP","budget":50,"cost":0}"#,
            r#"{"event":"end","restBudget":50}"#,
        ]);
        let replayed = replay_file("timingTracer", file.path(), None, true).unwrap();
        assert_eq!(replayed.results.len(), 2);
        let first = replayed.results[0].as_str().unwrap();
        assert_eq!(first.lines().count(), 3);
        assert!(first.starts_with("opcode,time,cost\n"));

        let report = replayed.report.unwrap();
        assert_eq!(report.total_rows(), 3);
        assert_eq!(report.total_cost(), 9);
        assert_eq!(report.quoted_costs["STOP"], 0);
    }

    #[test]
    fn applies_overrides() {
        let file = trace_file(&[
            r#"{"event":"start","budget":100}"#,
            r#"{"event":"step","opcode":"A","budget":90,"cost":10}"#,
            r#"{"event":"step","opcode":"B","budget":80,"cost":10}"#,
            r#"{"event":"end","restBudget":70}"#,
        ]);
        let overrides = serde_json::json!({ "resolution": 2 });
        let replayed = replay_file("timingTracer", file.path(), Some(&overrides), false).unwrap();
        assert_eq!(replayed.results[0].as_str().unwrap().lines().count(), 2);
        assert!(replayed.report.is_none());
    }

    #[test]
    fn reports_errors() {
        let file = trace_file(&[r#"{"event":"start","budget":100}"#]);
        let err = replay_file("noSuchTracer", file.path(), None, false).unwrap_err();
        assert!(err.to_string().contains("noSuchTracer"));

        let bad = trace_file(&["not json"]);
        assert!(replay_file("timingTracer", bad.path(), None, false).is_err());
    }

    #[test]
    fn writes_json_lines() {
        let mut out = Vec::new();
        write_results(&mut out, &[Value::String("time\n1\n".into()), Value::String(String::new())])
            .unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "\"time\\n1\\n\"\n\"\"\n");
    }

    #[test]
    fn parses_arguments() {
        let cmd = ReplayCmd::try_parse_from([
            "replay",
            "--tracer",
            "memoryTracer",
            "--trace",
            "trace.jsonl",
            "--report",
        ])
        .unwrap();
        assert_eq!(cmd.tracer, "memoryTracer");
        assert!(cmd.report);
        assert!(ReplayCmd::try_parse_from(["replay"]).is_err());
    }
}
