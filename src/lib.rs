//! Cloud Tiler - Octree Partitioning and Binary Tile Encoding for Point Clouds
//!
//! This library converts large point-cloud datasets into a hierarchical,
//! streamable tile layout for web rendering of massive geospatial scenes. The
//! core is a recursive 8-way spatial subdivision of geometric content plus a
//! per-tile numeric pipeline: reprojection into WGS84, transformation into a
//! tile-local tangent frame, 16-bit quantization of positions and a padded
//! binary artifact with its JSON metadata tables.
//!
//! # Architecture
//!
//! - **[`Octree`]**: arena-based recursive 8-way subdivision with three
//!   alternative stopping policies
//! - **[`PointCloudSource`]**: capability trait for streamed source point
//!   clouds with an explicit load/release lifecycle
//! - **[`TileEncoder`]**: per-tile coordinate transform, quantization and
//!   binary/JSON packing
//! - **[`Tiler`]**: high-level driver that partitions sources into tiles and
//!   encodes them, optionally in parallel
//!
//! # Performance Characteristics
//!
//! - **Octree build**: O(N log N) over source vertices, single-threaded and
//!   depth-first; sibling subtrees share no state after distribution
//! - **Tile encode**: one sequential pass per tile; peak memory is bounded by
//!   one loaded source cloud plus the accumulating output arrays
//! - **Batch**: tiles are independent and encode in parallel

mod bbox;
mod config;
mod crs;
mod encoder;
mod octree;
mod pointcloud;
mod tiler;
mod writer;

// Public API exports
pub use bbox::BoundingBox;
pub use config::Config;
pub use crs::{
    CrsTransform, LocalFrame, Wgs84Crs, cartesian_to_geographic, geographic_to_cartesian,
    local_frame_at,
};
pub use encoder::{EncodeOutcome, TileEncoder};
pub use octree::{NodeCoordinate, Octree, OctreeNode};
pub use pointcloud::{FaceRef, InMemoryPointCloud, PointCloudSource, PointVertex, TileContent};
pub use tiler::{BatchSummary, Tiler};
pub use writer::TileWriter;

/// Error types for the tiling pipeline
#[derive(Debug, thiserror::Error)]
pub enum TilerError {
    #[error("Coordinate projection error: {0}")]
    Projection(String),

    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("Quantization volume is degenerate (non-finite scale or offset): {reason}")]
    DegenerateQuantization { reason: String },

    #[error("Metadata serialization error: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TilerError>;
