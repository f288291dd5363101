//! Tonelink TX - encode data into a WAV file

use anyhow::Result;
use clap::Parser;
use tonelink_tools::cli::{run_tx, ProfileArgs, TxArgs};
use tonelink_tools::common::init_logging;

#[derive(Parser)]
#[command(name = "tonelink-tx")]
#[command(about = "Tonelink transmitter")]
struct Args {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(flatten)]
    profile: ProfileArgs,

    #[command(flatten)]
    tx: TxArgs,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose, false);
    run_tx(&args.profile.resolve()?, &args.tx)
}
