//! Face-centered cubic lattice spanning a set of models.

use crate::error::ModelError;
use crate::model::SasModel;
use crate::settings::FCC_DENSITY;
use nalgebra::Point3;
use std::f64::consts::PI;
use std::fmt;
use tracing::debug;

/// Axis-aligned bounding box.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Extent {
    /// Upper corner
    pub max: Point3<f64>,
    /// Lower corner
    pub min: Point3<f64>,
}

impl Extent {
    /// `[max_x, max_y, max_z, min_x, min_y, min_z]`
    pub fn as_array(&self) -> [f64; 6] {
        [
            self.max.x, self.max.y, self.max.z, self.min.x, self.min.y, self.min.z,
        ]
    }

    /// Volume of the box.
    pub fn volume(&self) -> f64 {
        let d = self.max - self.min;
        d.x * d.y * d.z
    }

    /// Whether `p` lies inside the box or on its boundary.
    pub fn contains(&self, p: &Point3<f64>) -> bool {
        (0..3).all(|i| p[i] >= self.min[i] && p[i] <= self.max[i])
    }
}

/// A lattice point with the occupancy accumulated on it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Knot {
    /// Position of the knot
    pub position: Point3<f64>,
    /// Sum of the kernel weights of all atoms near the knot
    pub occupancy: f64,
    /// Number of atoms with a nonzero weight on the knot
    pub contribution: usize,
}

impl Knot {
    /// Empty knot at `position`.
    pub fn new(position: Point3<f64>) -> Self {
        Self {
            position,
            occupancy: 0.0,
            contribution: 0,
        }
    }
}

/// Bounding box of every atom of every model, grown on all sides by the mean
/// fineness of the models.
pub fn spatial_extent(models: &[SasModel]) -> Result<Extent, ModelError> {
    if models.is_empty() {
        return Err(ModelError::EmptyInput("no models to span"));
    }
    let mut min = Point3::new(f64::INFINITY, f64::INFINITY, f64::INFINITY);
    let mut max = Point3::new(f64::NEG_INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY);
    let mut fineness_sum = 0.0;
    for model in models {
        for p in model.atoms() {
            for i in 0..3 {
                min[i] = min[i].min(p[i]);
                max[i] = max[i].max(p[i]);
            }
        }
        fineness_sum += model.fineness()?;
    }
    let margin = fineness_sum / models.len() as f64;
    debug!("Mean fineness of {} model(s): {margin:.4}", models.len());

    Ok(Extent {
        max: max.map(|c| c + margin),
        min: min.map(|c| c - margin),
    })
}

/// Radius of close-packed spheres such that about `nbknots` of them fill `extent`.
pub fn knot_radius(extent: &Extent, nbknots: usize) -> Result<f64, ModelError> {
    if nbknots == 0 {
        return Err(ModelError::InvalidParameter(
            "number of knots must be positive".to_string(),
        ));
    }
    let volume = extent.volume();
    if !(volume.is_finite() && volume > 0.0) {
        return Err(ModelError::InvalidParameter(format!(
            "extent volume must be positive and finite, got {volume}"
        )));
    }
    Ok(((3.0 / (4.0 * PI)) * FCC_DENSITY * volume / nbknots as f64).powf(1.0 / 3.0))
}

/// Offsets `k * step` while `start + offset <= stop`.
fn ladder(start: f64, stop: f64, step: f64) -> Vec<f64> {
    let mut values = Vec::new();
    let mut offset = 0.0;
    while start + offset <= stop {
        values.push(offset);
        offset += step;
    }
    values
}

/// Every second rung starting at `first`. The last rung is skipped unless it
/// is the only one.
fn stagger(rungs: &[f64], first: usize) -> impl Iterator<Item = &f64> {
    let usable = if rungs.len() > 1 {
        rungs.len() - 1
    } else {
        rungs.len()
    };
    rungs[..usable].iter().skip(first).step_by(2)
}

/// Fill `extent` with face-centered cubic knots of the given radius.
///
/// Knots are spaced by `√2 · radius` along each axis. Along y only every
/// second rung is used, shifted by one rung between neighbouring x columns and
/// between neighbouring z layers. Output order is z layer, then x column, then y.
///
/// Fails if the extent is too small to hold a single knot.
pub fn build_lattice(extent: &Extent, radius: f64) -> Result<Vec<Knot>, ModelError> {
    if !(radius.is_finite() && radius > 0.0) {
        return Err(ModelError::InvalidParameter(format!(
            "knot radius must be positive and finite, got {radius}"
        )));
    }
    let step = std::f64::consts::SQRT_2 * radius;
    let (min, max) = (extent.min, extent.max);

    let zs = ladder(min.z, max.z, step);
    let ys = ladder(min.y, max.y, step);
    let xs = ladder(min.x, max.x, step);

    let mut knots = Vec::new();
    for (i, z) in zs.iter().enumerate() {
        for (j, x) in xs.iter().enumerate() {
            for y in stagger(&ys, (i + j) % 2) {
                knots.push(Knot::new(Point3::new(min.x + x, min.y + y, min.z + z)));
            }
        }
    }
    if knots.is_empty() {
        return Err(ModelError::InvalidParameter(format!(
            "no knot of radius {radius} fits in the extent"
        )));
    }
    Ok(knots)
}

/// Lattice covering all input models.
#[derive(Clone, Debug)]
pub struct Grid {
    /// Box spanned by the lattice
    pub extent: Extent,
    /// Radius of the close-packed spheres centred on the knots
    pub radius: f64,
    /// Knots in lattice order
    pub knots: Vec<Knot>,
}

impl Grid {
    /// Span `models`, size the knots for about `nbknots` of them and build the lattice.
    pub fn new(models: &[SasModel], nbknots: usize) -> Result<Self, ModelError> {
        let extent = spatial_extent(models)?;
        Self::from_extent(extent, nbknots)
    }

    /// Lattice of about `nbknots` knots filling `extent`.
    pub fn from_extent(extent: Extent, nbknots: usize) -> Result<Self, ModelError> {
        let radius = knot_radius(&extent, nbknots)?;
        let knots = build_lattice(&extent, radius)?;
        debug!(
            "Built lattice of {} knots with radius {radius:.4} (requested {nbknots})",
            knots.len()
        );
        Ok(Self {
            extent,
            radius,
            knots,
        })
    }

    /// Number of knots.
    pub fn len(&self) -> usize {
        self.knots.len()
    }

    /// Whether the lattice has no knots.
    pub fn is_empty(&self) -> bool {
        self.knots.is_empty()
    }

    /// Knot positions in lattice order.
    pub fn positions(&self) -> Vec<Point3<f64>> {
        self.knots.iter().map(|k| k.position).collect()
    }
}

impl fmt::Display for Grid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Grid with {} knots", self.knots.len())
    }
}
