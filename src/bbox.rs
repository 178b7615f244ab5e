//! 3D axis-aligned bounding boxes
//!
//! A small value type used throughout the pipeline: octree node volumes,
//! aggregate source extents and the running quantization volume are all plain
//! min/max corner pairs.

use nalgebra::Vector3;

/// Axis-aligned bounding box in 3D
///
/// A freshly created box is "inverted" (min = +INF, max = -INF) so that the
/// first `add_point` sets both corners. An inverted box reports itself as
/// not valid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    min: Vector3<f64>,
    max: Vector3<f64>,
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::new()
    }
}

impl BoundingBox {
    /// Create an empty (inverted) bounding box
    pub fn new() -> Self {
        Self {
            min: Vector3::repeat(f64::INFINITY),
            max: Vector3::repeat(f64::NEG_INFINITY),
        }
    }

    /// Create a bounding box from explicit corners
    pub fn from_corners(min: Vector3<f64>, max: Vector3<f64>) -> Self {
        Self { min, max }
    }

    /// Expand the box to contain `point`
    #[inline]
    pub fn add_point(&mut self, point: Vector3<f64>) {
        self.min.x = self.min.x.min(point.x);
        self.min.y = self.min.y.min(point.y);
        self.min.z = self.min.z.min(point.z);
        self.max.x = self.max.x.max(point.x);
        self.max.y = self.max.y.max(point.y);
        self.max.z = self.max.z.max(point.z);
    }

    /// Expand the box to contain another box
    #[inline]
    pub fn add_box(&mut self, other: &BoundingBox) {
        self.add_point(other.min);
        self.add_point(other.max);
    }

    /// Minimum corner
    #[inline]
    pub fn min(&self) -> Vector3<f64> {
        self.min
    }

    /// Maximum corner
    #[inline]
    pub fn max(&self) -> Vector3<f64> {
        self.max
    }

    /// Center of the box
    #[inline]
    pub fn center(&self) -> Vector3<f64> {
        (self.min + self.max) * 0.5
    }

    /// Component-wise extent (max - min)
    #[inline]
    pub fn size(&self) -> Vector3<f64> {
        self.max - self.min
    }

    /// Whether at least one point has been added (corners are ordered)
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.min.x <= self.max.x && self.min.y <= self.max.y && self.min.z <= self.max.z
    }
}
