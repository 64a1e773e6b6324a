//! Averaging settings and lattice constants.

use std::f64::consts::PI;

/// Number of lattice knots requested when none is given
pub const DEFAULT_KNOTS: usize = 5000;
/// Packing density of face-centered cubic close-packed spheres, π / (3√2)
pub const FCC_DENSITY: f64 = PI / (3.0 * std::f64::consts::SQRT_2);
/// Output file name of the averaged model
pub const DEFAULT_OUTPUT: &str = "aver-model.pdb";

/// Routine used to compute the fineness of a model.
#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FinenessMethod {
    /// Full pairwise distance scan
    #[default]
    BruteForce,
    /// Nearest neighbour queries on an R*-tree
    Indexed,
}

impl std::fmt::Display for FinenessMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            FinenessMethod::BruteForce => write!(f, "brute-force"),
            FinenessMethod::Indexed => write!(f, "indexed"),
        }
    }
}

/// Parameters of an averaging run.
#[derive(Clone, Debug)]
pub struct AverageSettings {
    /// Target number of lattice knots
    pub knots: usize,
    /// Index of the reference model in the input list
    pub reference: usize,
    /// Fineness routine applied to every model
    pub fineness_method: FinenessMethod,
    /// Number of knots kept in the consensus model; mean atom count if unset
    pub consensus_size: Option<usize>,
    /// Worker threads, 0 for all cores
    pub num_threads: usize,
}

impl Default for AverageSettings {
    fn default() -> Self {
        Self {
            knots: DEFAULT_KNOTS,
            reference: 0,
            fineness_method: FinenessMethod::default(),
            consensus_size: None,
            num_threads: 0,
        }
    }
}
