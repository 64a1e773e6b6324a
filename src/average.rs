//! Occupancy of lattice knots and the averaged (consensus) model.
//!
//! Every atom of every model spreads a linearly decaying weight onto nearby
//! knots: `max(1 - d² / (f / 2), 0)` where `d²` is the squared atom-knot
//! distance and `f` the fineness of the atom's model. The occupancy of a knot is
//! the sum of these weights and its contribution is the number of atoms with a
//! nonzero weight. The best supported knots form the averaged model.

use crate::error::ModelError;
use crate::grid::{Grid, Knot};
use crate::model::SasModel;
use crate::settings::AverageSettings;
use crate::spatial::{build_tree, IndexedPoint};
use nalgebra::{distance_squared, Point3};
use rayon::prelude::*;
use rstar::RTree;
use std::cmp::Ordering;
use std::fmt;
use tracing::{debug, info};

/// Weight of an atom at squared distance `dist2` from a knot.
fn kernel(dist2: f64, fineness: f64) -> f64 {
    (1.0 - dist2 / (fineness / 2.0)).max(0.0)
}

/// Occupancy and contribution count of `point`, scanning every atom of every model.
pub fn occupancy(point: &Point3<f64>, models: &[SasModel]) -> Result<(f64, usize), ModelError> {
    if models.is_empty() {
        return Err(ModelError::EmptyInput("no models to accumulate"));
    }
    let mut occ = 0.0;
    let mut contrib = 0;
    for model in models {
        let f = model.fineness()?;
        for atom in model.atoms() {
            let add = kernel(distance_squared(atom, point), f);
            if add != 0.0 {
                contrib += 1;
                occ += add;
            }
        }
    }
    Ok((occ, contrib))
}

/// Per-model R*-trees for occupancy queries restricted to the kernel support.
pub struct OccupancyIndex {
    trees: Vec<(RTree<IndexedPoint>, f64)>,
}

impl OccupancyIndex {
    /// Index every model, computing its fineness if not cached yet.
    pub fn new(models: &[SasModel]) -> Result<Self, ModelError> {
        if models.is_empty() {
            return Err(ModelError::EmptyInput("no models to accumulate"));
        }
        let trees = models
            .par_iter()
            .map(|m| Ok((build_tree(m.atoms()), m.fineness()?)))
            .collect::<Result<Vec<_>, ModelError>>()?;
        Ok(Self { trees })
    }

    /// Same result as [`occupancy`], visiting only atoms within the cutoff.
    ///
    /// Models are summed in input order and atoms in index order so the value
    /// matches the brute-force scan.
    pub fn occupancy(&self, point: &Point3<f64>) -> (f64, usize) {
        let query = [point.x, point.y, point.z];
        let mut occ = 0.0;
        let mut contrib = 0;
        for (tree, f) in &self.trees {
            // The kernel vanishes once the squared distance reaches f / 2
            let mut near: Vec<&IndexedPoint> =
                tree.locate_within_distance(query, f / 2.0).collect();
            near.sort_unstable_by_key(|p| p.index);
            for p in near {
                let add = kernel(distance_squared(&Point3::from(p.coor), point), *f);
                if add != 0.0 {
                    contrib += 1;
                    occ += add;
                }
            }
        }
        (occ, contrib)
    }
}

/// Fill the occupancy and contribution of every knot of `grid`.
pub fn assign_occupancy(grid: &mut Grid, models: &[SasModel]) -> Result<(), ModelError> {
    let index = OccupancyIndex::new(models)?;
    grid.knots.par_iter_mut().for_each(|knot| {
        let (occ, contrib) = index.occupancy(&knot.position);
        knot.occupancy = occ;
        knot.contribution = contrib;
    });
    debug!(
        "{} of {} knots are occupied",
        grid.knots.iter().filter(|k| k.contribution > 0).count(),
        grid.len()
    );
    Ok(())
}

/// Occupied knots ranked by occupancy then contribution, at most `keep` of them.
///
/// Equal knots keep their lattice order.
pub fn select_consensus(knots: &[Knot], keep: usize) -> Vec<Knot> {
    let mut ranked: Vec<Knot> = knots
        .iter()
        .filter(|k| k.occupancy > 0.0)
        .copied()
        .collect();
    ranked.sort_by(|a, b| {
        b.occupancy
            .partial_cmp(&a.occupancy)
            .unwrap_or(Ordering::Equal)
            .then(b.contribution.cmp(&a.contribution))
    });
    ranked.truncate(keep);
    ranked
}

/// An ensemble of aligned models to be averaged, reference model first.
pub struct AverageModels {
    models: Vec<SasModel>,
}

impl AverageModels {
    /// Take ownership of the models, moving the one at `reference` to the front.
    pub fn new(mut models: Vec<SasModel>, reference: usize) -> Result<Self, ModelError> {
        if models.is_empty() {
            return Err(ModelError::EmptyInput("no models to average"));
        }
        if reference >= models.len() {
            return Err(ModelError::InvalidParameter(format!(
                "reference model {reference} out of range for {} model(s)",
                models.len()
            )));
        }
        let reference_model = models.remove(reference);
        models.insert(0, reference_model);
        Ok(Self { models })
    }

    /// Models with the reference first.
    pub fn models(&self) -> &[SasModel] {
        &self.models
    }

    /// The reference model.
    pub fn reference(&self) -> &SasModel {
        &self.models[0]
    }

    /// Rounded mean number of atoms per model.
    pub fn mean_atom_count(&self) -> usize {
        let total: usize = self.models.iter().map(|m| m.len()).sum();
        (total as f64 / self.models.len() as f64).round() as usize
    }

    /// Occupancy of a single point.
    pub fn calc_occupancy(&self, point: &Point3<f64>) -> Result<(f64, usize), ModelError> {
        occupancy(point, &self.models)
    }

    /// Lattice over all models with occupancy assigned to every knot.
    pub fn make_grid(&self, nbknots: usize) -> Result<Grid, ModelError> {
        let mut grid = Grid::new(&self.models, nbknots)?;
        assign_occupancy(&mut grid, &self.models)?;
        Ok(grid)
    }

    /// Build the lattice and keep the best supported knots.
    pub fn average(&self, settings: &AverageSettings) -> Result<(Grid, Vec<Knot>), ModelError> {
        let grid = self.make_grid(settings.knots)?;
        let keep = settings
            .consensus_size
            .unwrap_or_else(|| self.mean_atom_count());
        let consensus = select_consensus(&grid.knots, keep);
        info!(
            "Averaged {} models into {} of {} knots",
            self.models.len(),
            consensus.len(),
            grid.len()
        );
        Ok((grid, consensus))
    }
}

impl fmt::Display for AverageModels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Average of {} SAS models", self.models.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tests::{scattered, unit_cube};
    use nalgebra::Vector3;

    fn ensemble() -> Vec<SasModel> {
        let base = scattered(120, 8.0);
        [
            Vector3::zeros(),
            Vector3::new(0.3, -0.2, 0.1),
            Vector3::new(-0.25, 0.15, 0.2),
        ]
        .iter()
        .map(|by| SasModel::new(base.iter().map(|p| p + by).collect()).unwrap())
        .collect()
    }

    #[test]
    fn atom_on_knot_has_full_weight() {
        let models = vec![SasModel::new(unit_cube()).unwrap()];
        // f = 1: only the atom at the origin is within sqrt(1/2) of the origin
        let (occ, contrib) = occupancy(&Point3::origin(), &models).unwrap();
        assert_eq!(contrib, 1);
        assert!((occ - 1.0).abs() < 1e-12);

        // At the cube centre every corner sits at d² = 0.75 > 0.5
        let (occ, contrib) = occupancy(&Point3::new(0.5, 0.5, 0.5), &models).unwrap();
        assert_eq!((occ, contrib), (0.0, 0));
    }

    #[test]
    fn kernel_decays_linearly() {
        assert_eq!(kernel(0.0, 2.0), 1.0);
        assert!((kernel(0.5, 2.0) - 0.5).abs() < 1e-12);
        assert_eq!(kernel(1.0, 2.0), 0.0);
        assert_eq!(kernel(5.0, 2.0), 0.0);
    }

    #[test]
    fn far_knots_are_empty() {
        let models = ensemble();
        let (occ, contrib) = occupancy(&Point3::new(500.0, 500.0, 500.0), &models).unwrap();
        assert_eq!((occ, contrib), (0.0, 0));
    }

    #[test]
    fn index_matches_brute_force() {
        let models = ensemble();
        let index = OccupancyIndex::new(&models).unwrap();
        let mut grid = Grid::new(&models, 800).unwrap();
        assign_occupancy(&mut grid, &models).unwrap();
        for knot in &grid.knots {
            let (occ, contrib) = occupancy(&knot.position, &models).unwrap();
            assert_eq!(knot.contribution, contrib);
            assert!((knot.occupancy - occ).abs() < 1e-12);
            assert_eq!(index.occupancy(&knot.position), (knot.occupancy, contrib));
            assert!(knot.occupancy >= 0.0);
        }
        assert!(grid.knots.iter().any(|k| k.contribution > 0));
    }

    #[test]
    fn consensus_is_ranked_and_truncated() {
        let knots = vec![
            Knot { position: Point3::new(0.0, 0.0, 0.0), occupancy: 0.5, contribution: 2 },
            Knot { position: Point3::new(1.0, 0.0, 0.0), occupancy: 0.0, contribution: 0 },
            Knot { position: Point3::new(2.0, 0.0, 0.0), occupancy: 1.5, contribution: 3 },
            Knot { position: Point3::new(3.0, 0.0, 0.0), occupancy: 0.5, contribution: 4 },
        ];
        let kept = select_consensus(&knots, 10);
        let xs: Vec<f64> = kept.iter().map(|k| k.position.x).collect();
        assert_eq!(xs, vec![2.0, 3.0, 0.0]);
        assert_eq!(select_consensus(&knots, 1).len(), 1);
    }

    #[test]
    fn reference_goes_first() {
        let models = vec![
            SasModel::new(unit_cube()).unwrap(),
            SasModel::new(scattered(30, 5.0)).unwrap(),
            SasModel::new(scattered(40, 5.0)).unwrap(),
        ];
        let aver = AverageModels::new(models, 2).unwrap();
        assert_eq!(aver.reference().len(), 40);
        let counts: Vec<usize> = aver.models().iter().map(|m| m.len()).collect();
        assert_eq!(counts, vec![40, 8, 30]);
        assert_eq!(aver.mean_atom_count(), 26);
        assert_eq!(aver.to_string(), "Average of 3 SAS models");
    }

    #[test]
    fn bad_reference_or_empty_fails() {
        let models = vec![SasModel::new(unit_cube()).unwrap()];
        assert!(matches!(
            AverageModels::new(models, 1),
            Err(ModelError::InvalidParameter(_))
        ));
        assert!(matches!(
            AverageModels::new(Vec::new(), 0),
            Err(ModelError::EmptyInput(_))
        ));
        assert!(matches!(
            OccupancyIndex::new(&[]),
            Err(ModelError::EmptyInput(_))
        ));
        assert!(matches!(
            occupancy(&Point3::origin(), &[]),
            Err(ModelError::EmptyInput(_))
        ));
    }

    #[test]
    fn average_keeps_mean_atom_count() {
        let aver = AverageModels::new(ensemble(), 0).unwrap();
        let settings = AverageSettings {
            knots: 2000,
            ..Default::default()
        };
        let (grid, consensus) = aver.average(&settings).unwrap();
        assert!(consensus.len() <= 120);
        assert!(!consensus.is_empty());
        assert!(consensus.iter().all(|k| grid.extent.contains(&k.position)));
        assert!(consensus
            .windows(2)
            .all(|w| w[0].occupancy >= w[1].occupancy));
    }
}
