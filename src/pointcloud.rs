//! Source point-cloud capabilities and tile content units
//!
//! Source providers expose their vertices behind an explicit load/release
//! lifecycle so the encoder can stream one cloud at a time and keep peak
//! memory bounded to roughly a single source's footprint.

use crate::BoundingBox;
use nalgebra::Vector3;

/// One vertex of a source point cloud
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointVertex {
    /// Position in the source CRS
    pub position: Vector3<f64>,
    /// RGB color
    pub color: [u8; 3],
    /// Per-vertex batch id as carried by some source formats. Exposed for
    /// source fidelity; the binary tile body does not include it.
    pub batch_id: f32,
}

impl PointVertex {
    /// Create a vertex with the given position and color and batch id 0
    pub fn new(position: Vector3<f64>, color: [u8; 3]) -> Self {
        Self {
            position,
            color,
            batch_id: 0.0,
        }
    }
}

/// A mesh face reduced to what spatial assignment needs: an id back into the
/// source mesh and the face's barycenter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceRef {
    pub face_id: usize,
    pub barycenter: Vector3<f64>,
}

/// Capability trait for a source point-cloud chunk
///
/// Vertex count and bounding box must be available without loading; vertex
/// data is only guaranteed to be resident between `load` and `release`.
/// Implementations may be backed by files, network blobs or memory.
pub trait PointCloudSource: Send {
    /// Number of vertices in this chunk (available without loading)
    fn vertex_count(&self) -> usize;

    /// Bounding box in the source CRS (available without loading)
    fn bounding_box(&self) -> BoundingBox;

    /// Make vertex data resident
    fn load(&mut self) -> crate::Result<()>;

    /// Release resident vertex data
    fn release(&mut self);

    /// Access the resident vertices; empty before `load` or after `release`
    fn vertices(&self) -> &[PointVertex];
}

/// A point cloud held entirely in memory
///
/// The simplest [`PointCloudSource`]: load/release are no-ops apart from the
/// contract bookkeeping. The bounding box is computed once at construction.
#[derive(Debug, Clone)]
pub struct InMemoryPointCloud {
    vertices: Vec<PointVertex>,
    bounding_box: BoundingBox,
}

impl InMemoryPointCloud {
    /// Create a cloud from vertices, computing its bounding box
    pub fn new(vertices: Vec<PointVertex>) -> Self {
        let mut bounding_box = BoundingBox::new();
        for vertex in &vertices {
            bounding_box.add_point(vertex.position);
        }
        Self {
            vertices,
            bounding_box,
        }
    }
}

impl PointCloudSource for InMemoryPointCloud {
    #[inline]
    fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    #[inline]
    fn bounding_box(&self) -> BoundingBox {
        self.bounding_box
    }

    fn load(&mut self) -> crate::Result<()> {
        Ok(())
    }

    fn release(&mut self) {}

    #[inline]
    fn vertices(&self) -> &[PointVertex] {
        &self.vertices
    }
}

/// One tile unit: a hierarchical node code plus the source point clouds
/// whose content falls inside that node's volume.
pub struct TileContent {
    /// Hierarchical tile key ("R" plus octant digits along the root path)
    pub node_code: String,
    /// Source clouds contributing to this tile, in visitation order
    pub sources: Vec<Box<dyn PointCloudSource>>,
}

impl TileContent {
    /// Create a tile unit
    pub fn new(node_code: String, sources: Vec<Box<dyn PointCloudSource>>) -> Self {
        Self { node_code, sources }
    }

    /// Total vertex count across all source clouds
    pub fn total_vertex_count(&self) -> usize {
        self.sources.iter().map(|s| s.vertex_count()).sum()
    }

    /// Aggregate bounding box across all source clouds, in the source CRS
    pub fn bounding_box(&self) -> BoundingBox {
        let mut bbox = BoundingBox::new();
        for source in &self.sources {
            bbox.add_box(&source.bounding_box());
        }
        bbox
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_cloud(n: usize) -> InMemoryPointCloud {
        let vertices = (0..n)
            .map(|i| {
                PointVertex::new(
                    Vector3::new(i as f64, i as f64 * 2.0, -(i as f64)),
                    [i as u8, 0, 255],
                )
            })
            .collect();
        InMemoryPointCloud::new(vertices)
    }

    #[test]
    fn test_in_memory_cloud() {
        let mut cloud = create_test_cloud(10);
        assert_eq!(cloud.vertex_count(), 10);

        cloud.load().unwrap();
        assert_eq!(cloud.vertices().len(), 10);
        cloud.release();

        let bbox = cloud.bounding_box();
        assert_eq!(bbox.min(), Vector3::new(0.0, 0.0, -9.0));
        assert_eq!(bbox.max(), Vector3::new(9.0, 18.0, 0.0));
    }

    #[test]
    fn test_tile_content_aggregates() {
        let content = TileContent::new(
            "R03".to_string(),
            vec![
                Box::new(create_test_cloud(4)),
                Box::new(create_test_cloud(6)),
            ],
        );

        assert_eq!(content.total_vertex_count(), 10);
        let bbox = content.bounding_box();
        assert_eq!(bbox.min(), Vector3::new(0.0, 0.0, -5.0));
        assert_eq!(bbox.max(), Vector3::new(5.0, 10.0, 0.0));
    }

    #[test]
    fn test_empty_cloud_bbox_invalid() {
        let cloud = InMemoryPointCloud::new(Vec::new());
        assert!(!cloud.bounding_box().is_valid());
    }
}
