#![warn(missing_docs)]
#![doc = include_str!("../README.md")]

//! # damavg Library
//!
//! This library averages ensembles of aligned dummy-atom models, such as the
//! bead models reconstructed from small-angle scattering curves. It provides:
//!
//! - per-model metrics: fineness (mean nearest-neighbour spacing), centroid,
//!   inertia tensor and principal moments;
//! - the normalized spatial discrepancy (NSD) between two models and the
//!   distance matrix of an ensemble;
//! - a face-centered cubic lattice spanning all models, with soft occupancy
//!   accumulated on every knot and the consensus (averaged) model built from
//!   the best supported knots.
//!
//! Tables are returned as Polars DataFrames for the command line tool.

mod average;
mod distance;
mod error;
mod grid;
mod model;
mod settings;
mod spatial;
mod utils;

// Re-export key public types
pub use average::{
    assign_occupancy, occupancy, select_consensus, AverageModels, OccupancyIndex,
};
pub use distance::{distance_matrix, nsd, representative};
pub use error::ModelError;
pub use grid::{build_lattice, knot_radius, spatial_extent, Extent, Grid, Knot};
pub use model::{calc_fineness, SasModel};
pub use settings::{
    AverageSettings, FinenessMethod, DEFAULT_KNOTS, DEFAULT_OUTPUT, FCC_DENSITY,
};
pub use utils::{
    distance_df, format_model, format_records, load_models, load_structure, occupancy_df,
    parse_model, read_model, run_with_threads, save_knots, save_model, summary_df,
    write_df_to_file, DataFrameFileType,
};

/// Average an ensemble of aligned models.
///
/// # Arguments
///
/// * `models` - Aligned dummy-atom models
/// * `settings` - Knot count, reference model, consensus size and thread count
///
/// # Returns
///
/// The occupied lattice and the knots kept for the averaged model, best supported first.
///
/// # Example
///
/// ```no_run
/// use damavg::{average_models, load_models, AverageSettings, FinenessMethod};
///
/// let models = load_models(&["model-1.pdb", "model-2.pdb"], FinenessMethod::default()).unwrap();
/// let (grid, consensus) = average_models(models, &AverageSettings::default()).unwrap();
/// println!("Kept {} of {} knots", consensus.len(), grid.len());
/// ```
pub fn average_models(
    models: Vec<SasModel>,
    settings: &AverageSettings,
) -> Result<(Grid, Vec<Knot>), ModelError> {
    let models: Vec<SasModel> = models
        .into_iter()
        .map(|m| m.with_method(settings.fineness_method))
        .collect();
    let aver = AverageModels::new(models, settings.reference)?;
    run_with_threads(settings.num_threads, || aver.average(settings))
}

/// Pairwise NSD of an ensemble as a long-form DataFrame.
///
/// # Example
///
/// ```no_run
/// use damavg::{get_distances, load_models, FinenessMethod};
///
/// let names = vec!["a".to_string(), "b".to_string()];
/// let models = load_models(&["a.pdb", "b.pdb"], FinenessMethod::default()).unwrap();
/// let (df, best) = get_distances(&names, &models).unwrap();
/// println!("Most representative model: {}\n{}", names[best], df);
/// ```
pub fn get_distances(
    names: &[String],
    models: &[SasModel],
) -> Result<(polars::prelude::DataFrame, usize), ModelError> {
    if names.len() != models.len() {
        return Err(ModelError::InvalidParameter(format!(
            "{} name(s) for {} model(s)",
            names.len(),
            models.len()
        )));
    }
    let matrix = distance_matrix(models)?;
    let best = representative(&matrix)?;
    Ok((distance_df(names, &matrix)?, best))
}
