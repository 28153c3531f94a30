mod cmd;

use anyhow::Result;
use clap::Parser;

/// gpuml: plan and run quantized GGUF decoders.
#[derive(Parser)]
#[command(name = "gpuml", version, about)]
struct Cli {
    #[command(subcommand)]
    command: cmd::Command,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    cmd::run(cli.command)
}
