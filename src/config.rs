//! Pipeline configuration
//!
//! One explicit configuration struct constructed by the caller and passed by
//! reference into every component that needs it. Nothing in this crate reads
//! process-wide state.

use std::path::PathBuf;

/// Configuration for the tiling pipeline
///
/// The octree limits bound the shape of the spatial partition; the encoder
/// flags control the metadata emitted for each tile. All components receive
/// this struct by reference.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root output directory. Tile artifacts land in a `data/` subdirectory
    /// created on first write.
    pub output_path: PathBuf,
    /// When set, tiles omit `RTC_CENTER` from the feature table and a full
    /// transform matrix is expected to be supplied by the surrounding
    /// tileset instead.
    pub classic_transform_matrix: bool,
    /// Hard depth limit for octree subdivision.
    pub max_node_depth: u32,
    /// Nodes with any side shorter than this stop subdividing.
    pub min_box_size: f64,
    /// Target maximum number of points carried by one tile; used as the
    /// vertex-count stopping threshold when partitioning by content.
    pub points_per_tile: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_path: PathBuf::from("output"),
            classic_transform_matrix: false,
            max_node_depth: 32,
            min_box_size: 0.1,
            points_per_tile: 300_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.max_node_depth, 32);
        assert_eq!(config.points_per_tile, 300_000);
        assert!(!config.classic_transform_matrix);
        assert_eq!(config.min_box_size, 0.1);
    }
}
