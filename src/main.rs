mod cli;

use clap::{Parser, Subcommand};
use tracing::{error, Level};

#[derive(Parser)]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbosity of the program:
    /// -v for info, -vv for debug, and -vvv for trace
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Fineness, centroid and principal moments of inertia of each model
    Info(cli::info::Args),

    /// Normalized spatial discrepancy between every pair of models
    Nsd(cli::nsd::Args),

    /// Face-centered cubic lattice enclosing all models
    Grid(cli::grid::Args),

    /// Averaged model from the occupancy of the lattice knots
    Average(cli::average::Args),
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .init();

    let result = match &cli.command {
        Commands::Info(args) => cli::info::run(args),
        Commands::Nsd(args) => cli::nsd::run(args),
        Commands::Grid(args) => cli::grid::run(args),
        Commands::Average(args) => cli::average::run(args),
    };
    if let Err(e) = result {
        error!("{e}");
        std::process::exit(1);
    }
}
