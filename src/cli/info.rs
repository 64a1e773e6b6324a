use super::{ensure_parent, model_names};
use clap::Parser;
use damavg::{
    load_models, run_with_threads, summary_df, write_df_to_file, DataFrameFileType,
    FinenessMethod, ModelError,
};
use std::path::PathBuf;
use tracing::{debug, info, trace};

#[derive(Parser, Debug, Clone)]
#[command(version, about)]
pub(crate) struct Args {
    /// Dummy-atom models (PDB or mmCIF)
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Save the summary table to this file (extension set by the output format)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output file type
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
    let names = model_names(&args.inputs);
    let mut df = run_with_threads(args.num_threads, || {
        debug!("Using {} thread(s)", rayon::current_num_threads());
        summary_df(&names, &models)
    })?;
    info!("Summary of {} model(s)\n{}", models.len(), df);

    if let Some(output) = &args.output {
        ensure_parent(output)?;
        write_df_to_file(&mut df, output, args.output_format)?;
        info!(
            "Results saved to {}",
            output.with_extension(args.output_format.to_string()).display()
        );
    }
    Ok(())
}
