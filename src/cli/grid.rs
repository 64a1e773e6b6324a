use super::ensure_parent;
use clap::Parser;
use damavg::{format_records, load_models, FinenessMethod, Grid, ModelError, DEFAULT_KNOTS};
use std::path::PathBuf;
use tracing::{info, trace};

#[derive(Parser, Debug, Clone)]
#[command(version, about)]
pub(crate) struct Args {
    /// Dummy-atom models the lattice must enclose (PDB or mmCIF)
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// PDB file receiving the lattice knots
    #[arg(short, long, default_value = "grid.pdb")]
    output: PathBuf,

    /// Approximate number of knots in the lattice
    #[arg(short = 'n', long = "knots", default_value_t = DEFAULT_KNOTS)]
    knots: usize,

    /// Routine used to compute the fineness of each model
    #[arg(short, long, default_value_t = FinenessMethod::BruteForce)]
    method: FinenessMethod,
}

pub(crate) fn run(args: &Args) -> Result<(), ModelError> {
    trace!("{args:?}");

    let models = load_models(&args.inputs, args.method)?;
    let grid = Grid::new(&models, args.knots)?;
    info!("{grid} of radius {:.4}", grid.radius);
    let [max_x, max_y, max_z, min_x, min_y, min_z] = grid.extent.as_array();
    info!(
        "Extent: x {min_x:.3}..{max_x:.3}, y {min_y:.3}..{max_y:.3}, z {min_z:.3}..{max_z:.3}"
    );

    ensure_parent(&args.output)?;
    std::fs::write(&args.output, format_records(&grid.positions(), None))?;
    info!("Lattice saved to {}", args.output.display());
    Ok(())
}
