use super::ensure_parent;
use clap::Parser;
use damavg::{
    average_models, load_models, occupancy_df, save_knots, write_df_to_file, AverageSettings,
    DataFrameFileType, FinenessMethod, ModelError, DEFAULT_KNOTS, DEFAULT_OUTPUT,
};
use polars::prelude::*;
use std::path::PathBuf;
use tracing::{debug, info, trace, warn};

#[derive(Parser, Debug, Clone)]
#[command(version, about)]
pub(crate) struct Args {
    /// Aligned dummy-atom models (PDB or mmCIF)
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// PDB file receiving the averaged model
    #[arg(short, long, default_value = DEFAULT_OUTPUT)]
    output: PathBuf,

    /// Position of the reference model in the input list
    #[arg(short, long, default_value_t = 0)]
    reference: usize,

    /// Approximate number of knots in the lattice
    #[arg(short = 'n', long = "knots", default_value_t = DEFAULT_KNOTS)]
    knots: usize,

    /// Number of knots kept in the averaged model (default: mean atom count of the inputs)
    #[arg(short, long)]
    keep: Option<usize>,

    /// Also save the occupancy of every occupied knot to this file
    #[arg(long)]
    table: Option<PathBuf>,

    /// Output file type of the occupancy table
    #[arg(short = 't', long, default_value_t = DataFrameFileType::Csv)]
    output_format: DataFrameFileType,

    /// Routine used to compute the fineness of each model
    #[arg(short, long, default_value_t = FinenessMethod::BruteForce)]
    method: FinenessMethod,

    /// Number of threads to use for parallel processing, 0 for all cores
    #[arg(short = 'j', long = "num-threads", default_value_t = 0)]
    num_threads: usize,
}

pub(crate) fn run(args: &Args) -> Result<(), ModelError> {
    trace!("{args:?}");

    let models = load_models(&args.inputs, args.method)?;
    if models.len() < 2 {
        warn!("Averaging a single model only resamples it onto the lattice");
    }
    let settings = AverageSettings {
        knots: args.knots,
        reference: args.reference,
        fineness_method: args.method,
        consensus_size: args.keep,
        num_threads: args.num_threads,
    };
    debug!("{settings:?}");

    let (grid, consensus) = average_models(models, &settings)?;
    if consensus.is_empty() {
        warn!("No knot of the {grid} is occupied; the averaged model is empty");
    }

    ensure_parent(&args.output)?;
    save_knots(&consensus, &args.output)?;
    info!("Averaged model saved to {}", args.output.display());

    if let Some(table) = &args.table {
        let mut df = occupancy_df(&grid.knots)?
            .lazy()
            .filter(col("contribution").gt(lit(0)))
            .sort(["occupancy"], SortMultipleOptions::default().with_order_descending(true))
            .collect()?;
        debug!("Occupied knots\n{}", df);
        ensure_parent(table)?;
        write_df_to_file(&mut df, table, args.output_format)?;
        info!(
            "Occupancy table saved to {}",
            table.with_extension(args.output_format.to_string()).display()
        );
    }
    Ok(())
}
