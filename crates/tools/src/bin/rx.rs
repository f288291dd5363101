//! Tonelink RX - decode a packet from a WAV file

use anyhow::Result;
use clap::Parser;
use tonelink_tools::cli::{run_rx, ProfileArgs, RxArgs};
use tonelink_tools::common::init_logging;

#[derive(Parser)]
#[command(name = "tonelink-rx")]
#[command(about = "Tonelink receiver")]
struct Args {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(flatten)]
    profile: ProfileArgs,

    #[command(flatten)]
    rx: RxArgs,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose, false);
    run_rx(&args.profile.resolve()?, &args.rx)
}
