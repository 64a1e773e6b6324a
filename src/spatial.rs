//! R*-tree entries for atom coordinates.

use nalgebra::Point3;
use rstar::{PointDistance, RTree, RTreeObject, AABB};

/// A point tagged with its position in the originating atom list.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct IndexedPoint {
    pub index: usize,
    pub coor: [f64; 3],
}

impl IndexedPoint {
    pub fn new(index: usize, p: &Point3<f64>) -> Self {
        Self {
            index,
            coor: [p.x, p.y, p.z],
        }
    }
}

impl RTreeObject for IndexedPoint {
    type Envelope = AABB<[f64; 3]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.coor)
    }
}

impl PointDistance for IndexedPoint {
    fn distance_2(&self, point: &[f64; 3]) -> f64 {
        let dx = self.coor[0] - point[0];
        let dy = self.coor[1] - point[1];
        let dz = self.coor[2] - point[2];
        dx * dx + dy * dy + dz * dz
    }
}

/// Bulk load an R*-tree over `atoms`, keeping their indices.
pub fn build_tree(atoms: &[Point3<f64>]) -> RTree<IndexedPoint> {
    RTree::bulk_load(
        atoms
            .iter()
            .enumerate()
            .map(|(i, p)| IndexedPoint::new(i, p))
            .collect(),
    )
}
