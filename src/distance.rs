//! Normalized spatial discrepancy (NSD) between dummy-atom models.
//!
//! For every atom of one model the squared distance to the closest atom of the
//! other model is taken. Each directed sum is normalized by the atom count of
//! the source model and the squared fineness of the target model, and the NSD is
//! the square root of the mean of the two directed terms:
//!
//! NSD(A, B) = sqrt( 1/2 * ( Σ_a min_b |a-b|² / (N_A f_B²) + Σ_b min_a |a-b|² / (N_B f_A²) ) )
//!
//! Normalizing by the fineness keeps models with different sampling densities
//! comparable; the two directions catch coverage gaps on either side.

use crate::error::ModelError;
use crate::model::SasModel;
use nalgebra::{distance_squared, DMatrix, Point3};
use rayon::prelude::*;
use tracing::debug;

/// NSD between two models. Zero for a model compared with itself.
pub fn nsd(a: &SasModel, b: &SasModel) -> Result<f64, ModelError> {
    let fa = a.fineness()?;
    let fb = b.fineness()?;

    let a_to_b = sum_nearest_sq(a.atoms(), b.atoms());
    let b_to_a = sum_nearest_sq(b.atoms(), a.atoms());

    let term_a = a_to_b / (a.len() as f64 * fb * fb);
    let term_b = b_to_a / (b.len() as f64 * fa * fa);
    Ok((0.5 * (term_a + term_b)).sqrt())
}

/// Sum over `from` of the squared distance to the closest point of `to`.
fn sum_nearest_sq(from: &[Point3<f64>], to: &[Point3<f64>]) -> f64 {
    let minima: Vec<f64> = from
        .par_iter()
        .map(|p| {
            to.iter()
                .map(|q| distance_squared(p, q))
                .fold(f64::INFINITY, f64::min)
        })
        .collect();
    minima.iter().sum()
}

/// Symmetric matrix of pairwise NSD values with a zero diagonal.
pub fn distance_matrix(models: &[SasModel]) -> Result<DMatrix<f64>, ModelError> {
    if models.is_empty() {
        return Err(ModelError::EmptyInput("no models to compare"));
    }
    // Fill the caches up front so pair workers never wait on each other
    models
        .par_iter()
        .map(|m| m.fineness().map(|_| ()))
        .collect::<Result<Vec<()>, ModelError>>()?;

    let n = models.len();
    let pairs: Vec<(usize, usize)> = (0..n)
        .flat_map(|i| ((i + 1)..n).map(move |j| (i, j)))
        .collect();
    let values = pairs
        .par_iter()
        .map(|&(i, j)| nsd(&models[i], &models[j]))
        .collect::<Result<Vec<f64>, ModelError>>()?;

    let mut matrix = DMatrix::zeros(n, n);
    for (&(i, j), d) in pairs.iter().zip(values) {
        matrix[(i, j)] = d;
        matrix[(j, i)] = d;
    }
    debug!("Computed {} pairwise distances", pairs.len());
    Ok(matrix)
}

/// Index of the model with the lowest mean NSD to all other models.
///
/// Ties go to the lowest index. A single model is its own representative.
pub fn representative(matrix: &DMatrix<f64>) -> Result<usize, ModelError> {
    let n = matrix.nrows();
    if n == 0 {
        return Err(ModelError::EmptyInput("empty distance matrix"));
    }
    if n == 1 {
        return Ok(0);
    }
    let means: Vec<f64> = (0..n)
        .map(|i| matrix.row(i).sum() / (n - 1) as f64)
        .collect();
    let mut best = 0;
    for (i, m) in means.iter().enumerate().skip(1) {
        if *m < means[best] {
            best = i;
        }
    }
    Ok(best)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tests::{scattered, unit_cube};
    use nalgebra::Vector3;

    fn shifted(atoms: &[Point3<f64>], by: Vector3<f64>) -> Vec<Point3<f64>> {
        atoms.iter().map(|p| p + by).collect()
    }

    #[test]
    fn self_distance_is_zero() {
        let model = SasModel::new(scattered(150, 12.0)).unwrap();
        assert_eq!(nsd(&model, &model).unwrap(), 0.0);
    }

    #[test]
    fn identical_cubes_are_zero_apart() {
        let models: Vec<SasModel> = (0..3)
            .map(|_| SasModel::new(unit_cube()).unwrap())
            .collect();
        for a in &models {
            for b in &models {
                assert!(nsd(a, b).unwrap().abs() < 1e-12);
            }
        }
    }

    #[test]
    fn symmetric_in_arguments() {
        let a = SasModel::new(scattered(120, 10.0)).unwrap();
        let b = SasModel::new(scattered(90, 11.0)).unwrap();
        let (ab, ba) = (nsd(&a, &b).unwrap(), nsd(&b, &a).unwrap());
        assert!((ab - ba).abs() < 1e-12, "{ab} vs {ba}");
        assert!(ab > 0.0);
    }

    #[test]
    fn invariant_under_common_translation() {
        let atoms_a = scattered(100, 10.0);
        let atoms_b = scattered(80, 12.0);
        let by = Vector3::new(13.5, -7.25, 42.0);
        let d = nsd(
            &SasModel::new(atoms_a.clone()).unwrap(),
            &SasModel::new(atoms_b.clone()).unwrap(),
        )
        .unwrap();
        let d_shifted = nsd(
            &SasModel::new(shifted(&atoms_a, by)).unwrap(),
            &SasModel::new(shifted(&atoms_b, by)).unwrap(),
        )
        .unwrap();
        assert!((d - d_shifted).abs() < 1e-9, "{d} vs {d_shifted}");
    }

    #[test]
    fn invariant_under_reordering() {
        let atoms_a = scattered(100, 10.0);
        let atoms_b = scattered(80, 12.0);
        let mut reversed = atoms_b.clone();
        reversed.reverse();
        let a = SasModel::new(atoms_a).unwrap();
        let d = nsd(&a, &SasModel::new(atoms_b).unwrap()).unwrap();
        let d_rev = nsd(&a, &SasModel::new(reversed).unwrap()).unwrap();
        assert!((d - d_rev).abs() < 1e-12);
    }

    #[test]
    fn grows_with_separation() {
        let atoms = scattered(100, 10.0);
        let base = SasModel::new(atoms.clone()).unwrap();
        let near = SasModel::new(shifted(&atoms, Vector3::new(1.0, 0.0, 0.0))).unwrap();
        let far = SasModel::new(shifted(&atoms, Vector3::new(20.0, 0.0, 0.0))).unwrap();
        assert!(nsd(&base, &near).unwrap() < nsd(&base, &far).unwrap());
    }

    #[test]
    fn degenerate_model_propagates() {
        let a = SasModel::new(unit_cube()).unwrap();
        let b = SasModel::new(vec![Point3::new(0.0, 0.0, 0.0)]).unwrap();
        assert!(matches!(
            nsd(&a, &b),
            Err(ModelError::DegenerateGeometry { .. })
        ));
    }

    #[test]
    fn matrix_and_representative() {
        let base = scattered(60, 10.0);
        let models = vec![
            SasModel::new(shifted(&base, Vector3::new(-3.0, 0.0, 0.0))).unwrap(),
            SasModel::new(base.clone()).unwrap(),
            SasModel::new(shifted(&base, Vector3::new(3.0, 0.0, 0.0))).unwrap(),
        ];
        let matrix = distance_matrix(&models).unwrap();
        assert_eq!(matrix.shape(), (3, 3));
        for i in 0..3 {
            assert_eq!(matrix[(i, i)], 0.0);
            for j in 0..3 {
                assert_eq!(matrix[(i, j)], matrix[(j, i)]);
            }
        }
        // The middle model is closest on average
        assert_eq!(representative(&matrix).unwrap(), 1);
    }

    #[test]
    fn empty_inputs_fail() {
        assert!(matches!(
            distance_matrix(&[]),
            Err(ModelError::EmptyInput(_))
        ));
        assert!(matches!(
            representative(&DMatrix::zeros(0, 0)),
            Err(ModelError::EmptyInput(_))
        ));
    }
}
