use anyhow::Result;
use clap::{Parser, Subcommand};
use gasprobe_cli::{
    commands::{list::ListCmd, replay::ReplayCmd},
    GASPROBE_VERSION_MESSAGE,
};

#[derive(Parser)]
#[command(name = "gasprobe", version = GASPROBE_VERSION_MESSAGE)]
#[command(about = "Correlate instruction costs with sampled resource usage.")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    Replay(ReplayCmd),
    List(ListCmd),
}

fn main() -> Result<()> {
    gasprobe_core::setup_logger();

    match Cli::parse().command {
        Command::Replay(cmd) => cmd.run(),
        Command::List(cmd) => cmd.run(),
    }
}
