//! Tonelink - send and receive data over sound

use anyhow::Result;
use clap::{Parser, Subcommand};
use tonelink_tools::cli::{
    run_info, run_listen, run_rx, run_tx, InfoArgs, ListenArgs, ProfileArgs, RxArgs, TxArgs,
};
use tonelink_tools::common::init_logging;
use tracing::info;

#[derive(Parser)]
#[command(name = "tonelink")]
#[command(about = "Acoustic modem: data to audio and back")]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable debug output
    #[arg(long, global = true)]
    debug: bool,

    #[command(flatten)]
    profile: ProfileArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encode data into a WAV file
    Tx(TxArgs),
    /// Decode one packet from a WAV file
    Rx(RxArgs),
    /// Run the streaming receiver over a WAV file
    Listen(ListenArgs),
    /// Show link figures for the profile
    Info(InfoArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.debug);

    let profile = cli.profile.resolve()?;
    info!(scheme = ?profile.modulation.scheme, "profile loaded");

    match &cli.command {
        Commands::Tx(args) => run_tx(&profile, args),
        Commands::Rx(args) => run_rx(&profile, args),
        Commands::Listen(args) => run_listen(&profile, args).await,
        Commands::Info(args) => run_info(&profile, args),
    }
}
