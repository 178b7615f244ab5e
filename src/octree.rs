//! Arena-based octree for spatial partitioning of geometric content
//!
//! Each node's volume subdivides into exactly eight children at the axis
//! midpoints. The tree is built once by one of three stopping policies and is
//! treated as immutable afterwards; there is no merge or delete. Nodes live
//! in a flat arena and reference each other by index, so parent links cannot
//! form ownership cycles.
//!
//! The subdivision pass is driven by vertices; faces can be pushed down to
//! the already-built structure in a separate pass, so both content types
//! share one partition geometry.

use crate::bbox::BoundingBox;
use crate::pointcloud::{FaceRef, PointVertex};
use nalgebra::Vector3;

/// Octant table: child index to (x, y, z) bit per axis.
///
/// Tile addressing depends on this exact ordering; it must not change.
const OCTANT_BITS: [(u64, u64, u64); 8] = [
    (0, 0, 0),
    (1, 0, 0),
    (1, 1, 0),
    (0, 1, 0),
    (0, 0, 1),
    (1, 0, 1),
    (1, 1, 1),
    (0, 1, 1),
];

/// Inverse of [`OCTANT_BITS`]: bit pattern `x + 2y + 4z` to child index.
const CHILD_FOR_BITS: [usize; 8] = [0, 1, 3, 2, 4, 5, 7, 6];

/// Addressable coordinate of a node: depth level plus integer grid position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NodeCoordinate {
    pub depth: u32,
    pub x: u64,
    pub y: u64,
    pub z: u64,
}

/// A single node in the octree arena
#[derive(Debug, Clone)]
pub struct OctreeNode {
    /// Axis-aligned bounding volume
    bounds: BoundingBox,
    /// Position among siblings, `None` for the root
    octant: Option<u8>,
    /// Addressable (depth, x, y, z) coordinate
    coordinate: NodeCoordinate,
    /// Depth limit inherited from the parent at creation
    max_depth: u32,
    /// Box-size limit inherited from the parent at creation
    min_box_size: f64,
    /// Arena index of the parent, `None` for the root
    parent: Option<usize>,
    /// Arena indices of the eight children, `None` for leaves
    children: Option<[usize; 8]>,
    /// Vertices currently assigned to this node
    vertices: Vec<PointVertex>,
    /// Faces currently assigned to this node
    faces: Vec<FaceRef>,
}

impl OctreeNode {
    /// Bounding volume of this node
    #[inline]
    pub fn bounds(&self) -> &BoundingBox {
        &self.bounds
    }

    /// Octant index among siblings, `None` for the root
    #[inline]
    pub fn octant(&self) -> Option<u8> {
        self.octant
    }

    /// Addressable coordinate
    #[inline]
    pub fn coordinate(&self) -> NodeCoordinate {
        self.coordinate
    }

    /// Arena index of the parent node
    #[inline]
    pub fn parent(&self) -> Option<usize> {
        self.parent
    }

    /// Arena indices of the children, if subdivided
    #[inline]
    pub fn children(&self) -> Option<&[usize; 8]> {
        self.children.as_ref()
    }

    /// Vertices currently held by this node
    #[inline]
    pub fn vertices(&self) -> &[PointVertex] {
        &self.vertices
    }

    /// Faces currently held by this node
    #[inline]
    pub fn faces(&self) -> &[FaceRef] {
        &self.faces
    }

    /// Whether this node has no children
    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.children.is_none()
    }
}

/// Recursive 8-way spatial subdivision over a flat node arena
///
/// The root is created by the caller with explicit limits; one of the three
/// `build_by_*` policies grows the tree. Content (vertices, then optionally
/// faces) is always pushed down to children during distribution, never
/// duplicated.
pub struct Octree {
    nodes: Vec<OctreeNode>,
}

impl Octree {
    /// Arena index of the root node
    pub const ROOT: usize = 0;

    /// Create an octree with an explicit root volume and limits
    pub fn new(bounds: BoundingBox, max_depth: u32, min_box_size: f64) -> Self {
        Self {
            nodes: vec![OctreeNode {
                bounds,
                octant: None,
                coordinate: NodeCoordinate::default(),
                max_depth,
                min_box_size,
                parent: None,
                children: None,
                vertices: Vec::new(),
                faces: Vec::new(),
            }],
        }
    }

    /// Access a node by arena index
    #[inline]
    pub fn node(&self, index: usize) -> &OctreeNode {
        &self.nodes[index]
    }

    /// The root node
    #[inline]
    pub fn root(&self) -> &OctreeNode {
        &self.nodes[Self::ROOT]
    }

    /// Total number of nodes in the arena
    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the arena holds only the root
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    /// Assign vertices to the root prior to building
    pub fn set_vertices(&mut self, vertices: Vec<PointVertex>) {
        self.nodes[Self::ROOT].vertices = vertices;
    }

    /// Move a node's vertices out of the arena, leaving it empty. Used when
    /// extracted content is handed off to the encoding stage.
    pub(crate) fn take_vertices(&mut self, index: usize) -> Vec<PointVertex> {
        std::mem::take(&mut self.nodes[index].vertices)
    }

    /// Assign faces to the root prior to the face distribution pass
    pub fn set_faces(&mut self, faces: Vec<FaceRef>) {
        self.nodes[Self::ROOT].faces = faces;
    }

    /// Expand the root box along its two shorter axes so all three side
    /// lengths equal the longest one. Only the max corner moves.
    pub fn set_as_cube(&mut self) {
        let root = &mut self.nodes[Self::ROOT];
        let size = root.bounds.size();
        let longest = size.x.max(size.y).max(size.z);
        let min = root.bounds.min();
        root.bounds = BoundingBox::from_corners(min, min + Vector3::repeat(longest));
    }

    /// Recompute the root box as the tight envelope of its current vertices.
    /// No-op when the root holds no vertices: the box is left unchanged, so
    /// callers must not rely on default box values for empty trees.
    pub fn calculate_size(&mut self) {
        let root = &mut self.nodes[Self::ROOT];
        if root.vertices.is_empty() {
            return;
        }

        let mut bounds = BoundingBox::new();
        for vertex in &root.vertices {
            bounds.add_point(vertex.position);
        }
        root.bounds = bounds;
    }

    /// Instantiate exactly eight children of `index`, splitting the box at
    /// the midpoint of each axis per the octant table. Limits are copied
    /// down. No-op if the node is already subdivided.
    pub fn create_children(&mut self, index: usize) {
        if self.nodes[index].children.is_some() {
            return;
        }

        let bounds = self.nodes[index].bounds;
        let coordinate = self.nodes[index].coordinate;
        let max_depth = self.nodes[index].max_depth;
        let min_box_size = self.nodes[index].min_box_size;

        let min = bounds.min();
        let max = bounds.max();
        let mid = bounds.center();

        let mut children = [0usize; 8];
        for (octant, &(bx, by, bz)) in OCTANT_BITS.iter().enumerate() {
            let child_min = Vector3::new(
                if bx == 0 { min.x } else { mid.x },
                if by == 0 { min.y } else { mid.y },
                if bz == 0 { min.z } else { mid.z },
            );
            let child_max = Vector3::new(
                if bx == 0 { mid.x } else { max.x },
                if by == 0 { mid.y } else { max.y },
                if bz == 0 { mid.z } else { max.z },
            );

            children[octant] = self.nodes.len();
            self.nodes.push(OctreeNode {
                bounds: BoundingBox::from_corners(child_min, child_max),
                octant: Some(octant as u8),
                coordinate: NodeCoordinate {
                    depth: coordinate.depth + 1,
                    x: coordinate.x * 2 + bx,
                    y: coordinate.y * 2 + by,
                    z: coordinate.z * 2 + bz,
                },
                max_depth,
                min_box_size,
                parent: Some(index),
                children: None,
                vertices: Vec::new(),
                faces: Vec::new(),
            });
        }

        self.nodes[index].children = Some(children);
    }

    /// Subdivide unconditionally until every path reaches `target_depth`,
    /// ignoring content.
    pub fn build_by_max_depth(&mut self, target_depth: u32) {
        self.build_by_max_depth_at(Self::ROOT, target_depth);
    }

    fn build_by_max_depth_at(&mut self, index: usize, target_depth: u32) {
        if self.nodes[index].coordinate.depth >= target_depth {
            return;
        }

        self.create_children(index);
        self.distribute_contents(index);

        let children = self.nodes[index].children.expect("children just created");
        for child in children {
            self.build_by_max_depth_at(child, target_depth);
        }
    }

    /// Subdivide while the node's box is at least `min_box_size` on every
    /// axis, its depth is below the inherited limit and it holds vertices.
    pub fn build_by_min_box_size(&mut self, min_box_size: f64) {
        self.build_by_min_box_size_at(Self::ROOT, min_box_size);
    }

    fn build_by_min_box_size_at(&mut self, index: usize, min_box_size: f64) {
        let node = &self.nodes[index];
        let size = node.bounds.size();
        if size.x < min_box_size || size.y < min_box_size || size.z < min_box_size {
            return;
        }
        if node.coordinate.depth >= node.max_depth {
            return;
        }
        if node.vertices.is_empty() {
            return;
        }

        self.create_children(index);
        self.distribute_contents(index);

        let children = self.nodes[index].children.expect("children just created");
        for child in children {
            self.build_by_min_box_size_at(child, min_box_size);
        }
    }

    /// Subdivide while the node holds at least `min_vertex_count` vertices,
    /// its depth is below the inherited limit and its box is at least the
    /// inherited minimum size.
    pub fn build_by_min_vertex_count(&mut self, min_vertex_count: usize) {
        self.build_by_min_vertex_count_at(Self::ROOT, min_vertex_count);
    }

    fn build_by_min_vertex_count_at(&mut self, index: usize, min_vertex_count: usize) {
        let node = &self.nodes[index];
        if node.coordinate.depth >= node.max_depth {
            return;
        }
        if node.vertices.is_empty() {
            return;
        }
        if node.vertices.len() < min_vertex_count {
            return;
        }
        let size = node.bounds.size();
        if size.x < node.min_box_size || size.y < node.min_box_size || size.z < node.min_box_size {
            return;
        }

        self.create_children(index);
        self.distribute_contents(index);

        let children = self.nodes[index].children.expect("children just created");
        for child in children {
            self.build_by_min_vertex_count_at(child, min_vertex_count);
        }
    }

    /// Classify every vertex of `index` against the node's axis midpoints
    /// and move it to the matching child, then clear the node's own list.
    /// No-op when the node holds no vertices. Children must already exist.
    pub fn distribute_contents(&mut self, index: usize) {
        if self.nodes[index].vertices.is_empty() {
            return;
        }

        let mid = self.nodes[index].bounds.center();
        let children = self.nodes[index]
            .children
            .expect("distribute_contents requires children");

        let vertices = std::mem::take(&mut self.nodes[index].vertices);
        for vertex in vertices {
            let child = children[classify(vertex.position, mid)];
            self.nodes[child].vertices.push(vertex);
        }
    }

    /// Push every node's face list down to the already-built child structure
    /// using the face's barycenter and the same midpoint classification as
    /// vertices. Faces stop at leaves.
    pub fn distribute_faces_to_leaf(&mut self) {
        self.distribute_faces_at(Self::ROOT);
    }

    fn distribute_faces_at(&mut self, index: usize) {
        let Some(children) = self.nodes[index].children else {
            return;
        };

        if !self.nodes[index].faces.is_empty() {
            let mid = self.nodes[index].bounds.center();
            let faces = std::mem::take(&mut self.nodes[index].faces);
            for face in faces {
                let child = children[classify(face.barycenter, mid)];
                self.nodes[child].faces.push(face);
            }
        }

        for child in children {
            self.distribute_faces_at(child);
        }
    }

    /// Arena indices of all nodes currently holding vertices, in pre-order
    /// (a node before its children). Meaningful after the vertex
    /// distribution pass, which empties interior nodes.
    pub fn extract_nodes_with_content(&self) -> Vec<usize> {
        let mut result = Vec::new();
        self.extract_preorder(Self::ROOT, &mut result, |node| !node.vertices.is_empty());
        result
    }

    /// Arena indices of all nodes currently holding faces, in pre-order.
    pub fn extract_nodes_with_faces(&self) -> Vec<usize> {
        let mut result = Vec::new();
        self.extract_preorder(Self::ROOT, &mut result, |node| !node.faces.is_empty());
        result
    }

    fn extract_preorder<F>(&self, index: usize, out: &mut Vec<usize>, keep: F)
    where
        F: Fn(&OctreeNode) -> bool + Copy,
    {
        if keep(&self.nodes[index]) {
            out.push(index);
        }
        if let Some(children) = self.nodes[index].children {
            for child in children {
                self.extract_preorder(child, out, keep);
            }
        }
    }

    /// Hierarchical tile key for a node: `"R"` followed by the octant digit
    /// of every ancestor step from the root down to the node.
    pub fn node_code(&self, index: usize) -> String {
        let mut digits = Vec::new();
        let mut current = index;
        while let Some(octant) = self.nodes[current].octant {
            digits.push(octant);
            current = self.nodes[current].parent.expect("non-root has a parent");
        }

        let mut code = String::with_capacity(digits.len() + 1);
        code.push('R');
        for octant in digits.iter().rev() {
            code.push(char::from(b'0' + octant));
        }
        code
    }
}

/// Map a point to the child octant of a node with midpoint `mid`:
/// `< mid` is bit 0, `>= mid` is bit 1, per axis.
#[inline]
fn classify(point: Vector3<f64>, mid: Vector3<f64>) -> usize {
    let bits = (point.x >= mid.x) as usize
        | (((point.y >= mid.y) as usize) << 1)
        | (((point.z >= mid.z) as usize) << 2);
    CHILD_FOR_BITS[bits]
}
