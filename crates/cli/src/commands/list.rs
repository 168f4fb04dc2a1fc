use std::io::{self, Write};

use anyhow::Result;
use clap::Parser;
use gasprobe_core::{registered_names, Preset};

#[derive(Parser, Debug)]
#[command(name = "list", about = "List the registered tracers.")]
pub struct ListCmd {
    /// Print only the names.
    #[arg(short, long)]
    quiet: bool,
}

impl ListCmd {
    pub fn run(&self) -> Result<()> {
        let mut out = io::stdout().lock();
        for line in self.lines() {
            writeln!(out, "{line}")?;
        }
        Ok(())
    }

    fn lines(&self) -> Vec<String> {
        registered_names()
            .into_iter()
            .map(|name| match name.parse::<Preset>() {
                Ok(preset) if !self.quiet => {
                    let config = preset.config();
                    let dimensions =
                        config.dimensions.iter().map(ToString::to_string).collect::<Vec<_>>();
                    format!(
                        "{name:<26} {:<12} {:<12} every {}",
                        config.layout,
                        dimensions.join(","),
                        config.resolution
                    )
                }
                _ => name,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_presets() {
        let lines = ListCmd { quiet: false }.lines();
        let cycle = lines.iter().find(|line| line.starts_with("cycleTracer ")).unwrap();
        assert!(cycle.contains("instruction"));
        assert!(cycle.contains("cycles"));
        assert!(cycle.ends_with("every 1"));

        let quiet = ListCmd { quiet: true }.lines();
        assert!(quiet.contains(&"memoryTracer".to_string()));
        assert!(quiet.iter().all(|line| !line.contains(' ')));
    }
}
