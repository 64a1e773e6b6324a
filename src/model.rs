//! Dummy-atom models and their per-model metrics.
//!
//! A [`SasModel`] is a cloud of dummy atoms from a low-resolution shape
//! reconstruction. Its fineness (the mean nearest-neighbour spacing) is the
//! natural length scale of the model and is used by the distance metric, the
//! lattice builder and the occupancy kernel, so it is computed once and cached.

use crate::error::ModelError;
use crate::settings::FinenessMethod;
use crate::spatial::build_tree;
use nalgebra::{distance_squared, Matrix3, Point3, Vector3};
use rayon::prelude::*;
use std::fmt;
use std::sync::OnceLock;

/// A cloud of dummy atoms with its source text and a cached fineness.
#[derive(Debug)]
pub struct SasModel {
    atoms: Vec<Point3<f64>>,
    header: String,
    method: FinenessMethod,
    fineness: OnceLock<f64>,
}

impl SasModel {
    /// Create a model from raw coordinates.
    ///
    /// Fails on an empty atom list or on any NaN/infinite coordinate.
    pub fn new(atoms: Vec<Point3<f64>>) -> Result<Self, ModelError> {
        Self::with_header(atoms, String::new())
    }

    /// Create a model that keeps the text of the file it was read from.
    pub fn with_header(atoms: Vec<Point3<f64>>, header: String) -> Result<Self, ModelError> {
        if atoms.is_empty() {
            return Err(ModelError::EmptyInput("model has no atoms"));
        }
        if let Some(index) = atoms
            .iter()
            .position(|p| !(p.x.is_finite() && p.y.is_finite() && p.z.is_finite()))
        {
            return Err(ModelError::NonFinite { index });
        }
        Ok(Self {
            atoms,
            header,
            method: FinenessMethod::default(),
            fineness: OnceLock::new(),
        })
    }

    /// Select the fineness routine. Resets any cached value.
    pub fn with_method(mut self, method: FinenessMethod) -> Self {
        self.method = method;
        self.fineness = OnceLock::new();
        self
    }

    /// Atom positions in file order.
    pub fn atoms(&self) -> &[Point3<f64>] {
        &self.atoms
    }

    /// Text of the source file, empty for models built from coordinates.
    pub fn header(&self) -> &str {
        &self.header
    }

    /// Routine used by [`SasModel::fineness`].
    pub fn method(&self) -> FinenessMethod {
        self.method
    }

    /// Number of atoms.
    pub fn len(&self) -> usize {
        self.atoms.len()
    }

    /// Always false for a validated model.
    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }

    /// Mean distance between each atom and its nearest neighbour.
    ///
    /// Computed on first use and cached. Concurrent first callers may each
    /// compute the value; they all get the one stored first, and no lock is held
    /// while the parallel scan runs.
    pub fn fineness(&self) -> Result<f64, ModelError> {
        if let Some(f) = self.fineness.get() {
            return Ok(*f);
        }
        let f = calc_fineness(&self.atoms, self.method)?;
        Ok(*self.fineness.get_or_init(|| f))
    }

    /// Arithmetic mean of the atom positions.
    pub fn centroid(&self) -> Point3<f64> {
        let sum = self
            .atoms
            .iter()
            .fold(Vector3::zeros(), |acc, p| acc + p.coords);
        Point3::from(sum / self.atoms.len() as f64)
    }

    /// Inertia tensor about the centroid, normalized by the number of atoms.
    pub fn inertia_tensor(&self) -> Matrix3<f64> {
        let com = self.centroid();
        let n = self.atoms.len() as f64;
        let mut tensor = Matrix3::zeros();
        for i in 0..3 {
            for j in i..3 {
                let delta = if i == j { 1.0 } else { 0.0 };
                let sum: f64 = self
                    .atoms
                    .iter()
                    .map(|p| {
                        let r = p - com;
                        delta * r.norm_squared() - r[i] * r[j]
                    })
                    .sum();
                tensor[(i, j)] = sum / n;
                tensor[(j, i)] = sum / n;
            }
        }
        tensor
    }

    /// Eigenvalues of the inertia tensor in ascending order.
    pub fn principal_moments(&self) -> [f64; 3] {
        let eigen = self.inertia_tensor().symmetric_eigenvalues();
        let mut moments = [eigen[0], eigen[1], eigen[2]];
        moments.sort_by(f64::total_cmp);
        moments
    }
}

impl fmt::Display for SasModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SAS model with {} atoms", self.atoms.len())
    }
}

/// Square root of the mean squared nearest-neighbour distance.
///
/// Each atom is compared with every *other* atom only, which is what putting the
/// largest pairwise distance on the diagonal of the distance matrix amounts to.
pub fn calc_fineness(atoms: &[Point3<f64>], method: FinenessMethod) -> Result<f64, ModelError> {
    if atoms.len() < 2 {
        return Err(ModelError::DegenerateGeometry { atoms: atoms.len() });
    }
    let nearest = match method {
        FinenessMethod::BruteForce => nearest_sq_brute_force(atoms),
        FinenessMethod::Indexed => nearest_sq_indexed(atoms),
    };
    let mean = nearest.iter().sum::<f64>() / nearest.len() as f64;
    let fineness = mean.sqrt();
    if fineness > 0.0 {
        Ok(fineness)
    } else {
        // Every atom sits on top of another one
        Err(ModelError::DegenerateGeometry { atoms: atoms.len() })
    }
}

fn nearest_sq_brute_force(atoms: &[Point3<f64>]) -> Vec<f64> {
    atoms
        .par_iter()
        .enumerate()
        .map(|(i, a)| {
            atoms
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != i)
                .map(|(_, b)| distance_squared(a, b))
                .fold(f64::INFINITY, f64::min)
        })
        .collect()
}

fn nearest_sq_indexed(atoms: &[Point3<f64>]) -> Vec<f64> {
    let tree = build_tree(atoms);
    atoms
        .par_iter()
        .enumerate()
        .map(|(i, a)| {
            let query = [a.x, a.y, a.z];
            tree.nearest_neighbor_iter(&query)
                .find(|p| p.index != i)
                .map_or(f64::INFINITY, |p| distance_squared(a, &atoms[p.index]))
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn unit_cube() -> Vec<Point3<f64>> {
        let mut atoms = Vec::new();
        for x in [0.0, 1.0] {
            for y in [0.0, 1.0] {
                for z in [0.0, 1.0] {
                    atoms.push(Point3::new(x, y, z));
                }
            }
        }
        atoms
    }

    /// Deterministic scattered cloud used where a less regular shape is needed.
    pub(crate) fn scattered(n: usize, scale: f64) -> Vec<Point3<f64>> {
        (0..n)
            .map(|i| {
                let t = i as f64;
                Point3::new(
                    scale * (t * 0.618_034).sin(),
                    scale * (t * 1.324_718).cos(),
                    scale * (t * 0.414_214).sin() * (t * 0.1).cos(),
                )
            })
            .collect()
    }

    #[test]
    fn cube_fineness_is_edge_length() {
        let model = SasModel::new(unit_cube()).unwrap();
        let f = model.fineness().unwrap();
        assert!((f - 1.0).abs() < 1e-12, "Expected fineness 1.0, got {f}");
    }

    #[test]
    fn fineness_is_positive() {
        let model = SasModel::new(scattered(200, 10.0)).unwrap();
        assert!(model.fineness().unwrap() > 0.0);
    }

    #[test]
    fn fineness_methods_agree() {
        let atoms = scattered(300, 25.0);
        let brute = SasModel::new(atoms.clone()).unwrap();
        let indexed = SasModel::new(atoms)
            .unwrap()
            .with_method(FinenessMethod::Indexed);
        let (a, b) = (brute.fineness().unwrap(), indexed.fineness().unwrap());
        assert!((a - b).abs() < 1e-9, "Brute force {a} vs indexed {b}");
    }

    #[test]
    fn duplicate_atoms_count_as_neighbours() {
        let mut atoms = unit_cube();
        atoms.push(Point3::new(0.0, 0.0, 0.0));
        let model = SasModel::new(atoms).unwrap();
        // Two atoms at the origin see each other at distance 0; the other seven see 1
        let expected = (7.0_f64 / 9.0).sqrt();
        assert!((model.fineness().unwrap() - expected).abs() < 1e-12);
    }

    #[test]
    fn fineness_is_cached_across_threads() {
        let model = SasModel::new(scattered(500, 20.0)).unwrap();
        let values: Vec<f64> = (0..8)
            .into_par_iter()
            .map(|_| model.fineness().unwrap())
            .collect();
        assert!(values.windows(2).all(|w| w[0] == w[1]));
    }

    #[test]
    fn many_readers_share_one_model() {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(8)
            .build()
            .unwrap();
        for _ in 0..3 {
            let model = SasModel::new(scattered(3000, 20.0)).unwrap();
            let values: Vec<f64> = pool.install(|| {
                (0..64)
                    .into_par_iter()
                    .map(|_| model.fineness().unwrap())
                    .collect()
            });
            assert_eq!(values.len(), 64);
            assert!(values.iter().all(|v| *v == values[0] && *v > 0.0));
        }
    }

    #[test]
    fn single_atom_is_degenerate() {
        let model = SasModel::new(vec![Point3::new(1.0, 2.0, 3.0)]).unwrap();
        assert!(matches!(
            model.fineness(),
            Err(ModelError::DegenerateGeometry { atoms: 1 })
        ));
    }

    #[test]
    fn coincident_atoms_are_degenerate() {
        let model = SasModel::new(vec![Point3::new(1.0, 1.0, 1.0); 4]).unwrap();
        assert!(matches!(
            model.fineness(),
            Err(ModelError::DegenerateGeometry { atoms: 4 })
        ));
    }

    #[test]
    fn rejects_empty_and_non_finite() {
        assert!(matches!(
            SasModel::new(Vec::new()),
            Err(ModelError::EmptyInput(_))
        ));
        let atoms = vec![Point3::new(0.0, 0.0, 0.0), Point3::new(f64::NAN, 0.0, 0.0)];
        assert!(matches!(
            SasModel::new(atoms),
            Err(ModelError::NonFinite { index: 1 })
        ));
    }

    #[test]
    fn cube_centroid_and_inertia() {
        let model = SasModel::new(unit_cube()).unwrap();
        let com = model.centroid();
        assert!((com - Point3::new(0.5, 0.5, 0.5)).norm() < 1e-12);

        let tensor = model.inertia_tensor();
        for i in 0..3 {
            for j in 0..3 {
                let expected = if i == j { 0.5 } else { 0.0 };
                assert!(
                    (tensor[(i, j)] - expected).abs() < 1e-12,
                    "I[{i},{j}] = {}",
                    tensor[(i, j)]
                );
            }
        }
        assert_eq!(tensor, tensor.transpose());
    }

    #[test]
    fn principal_moments_are_sorted() {
        // Elongated along x: smallest moment about the x axis
        let atoms: Vec<Point3<f64>> = (0..20)
            .map(|i| Point3::new(i as f64, (i % 2) as f64 * 0.5, (i % 3) as f64 * 0.5))
            .collect();
        let moments = SasModel::new(atoms).unwrap().principal_moments();
        assert!(moments[0] <= moments[1] && moments[1] <= moments[2]);
        assert!(moments[0] >= -1e-9);
    }

    #[test]
    fn display_counts_atoms() {
        let model = SasModel::new(unit_cube()).unwrap();
        assert_eq!(model.to_string(), "SAS model with 8 atoms");
    }
}
