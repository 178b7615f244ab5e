//! Batch tiling driver
//!
//! The [`Tiler`] ties the stages together: gather vertices from the input
//! sources, partition them with a cube-rooted octree, then encode every
//! content-bearing node into its own artifact. Encoding is embarrassingly
//! parallel across tiles, so the batch runs on the rayon thread pool by
//! default; a sequential variant exists for debugging and small inputs.
//!
//! Per-tile failures are contained: a tile that cannot be encoded is logged
//! and counted, and the batch moves on to the next one.

use crate::bbox::BoundingBox;
use crate::config::Config;
use crate::crs::CrsTransform;
use crate::encoder::{EncodeOutcome, TileEncoder};
use crate::octree::Octree;
use crate::pointcloud::{InMemoryPointCloud, PointCloudSource, PointVertex, TileContent};
use crate::Result;
use rayon::prelude::*;
use std::sync::Arc;
use tracing::{error, info};

/// Outcome counts of one encoding batch
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchSummary {
    /// Tiles whose artifact was written
    pub written: usize,
    /// Degenerate tiles skipped without an artifact
    pub skipped: usize,
    /// Tiles that failed to encode
    pub failed: usize,
}

impl BatchSummary {
    fn merge(self, other: Self) -> Self {
        Self {
            written: self.written + other.written,
            skipped: self.skipped + other.skipped,
            failed: self.failed + other.failed,
        }
    }

    fn from_result(result: &Result<EncodeOutcome>) -> Self {
        match result {
            Ok(EncodeOutcome::Written { .. }) => Self {
                written: 1,
                ..Self::default()
            },
            Ok(EncodeOutcome::SkippedDegenerate) => Self {
                skipped: 1,
                ..Self::default()
            },
            Err(_) => Self {
                failed: 1,
                ..Self::default()
            },
        }
    }
}

/// Spatial partitioning and encoding pipeline over point-cloud inputs
pub struct Tiler {
    config: Config,
    crs: Arc<dyn CrsTransform>,
}

impl Tiler {
    /// Create a tiler over a configuration and a source coordinate transform
    pub fn new(config: Config, crs: Arc<dyn CrsTransform>) -> Self {
        Self { config, crs }
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Partition the input sources into tile units
    ///
    /// All vertices are gathered (sources are loaded and released one at a
    /// time), a tight root box is computed and expanded to a cube so octant
    /// cells stay metrically comparable across axes, and the tree is built
    /// until every leaf holds fewer than `points_per_tile` vertices or a
    /// depth or box-size limit is hit. Each content-bearing node becomes one
    /// [`TileContent`] keyed by its node code.
    pub fn partition(
        &self,
        mut sources: Vec<Box<dyn PointCloudSource>>,
    ) -> Result<Vec<TileContent>> {
        let mut vertices: Vec<PointVertex> = Vec::new();
        for source in &mut sources {
            source.load()?;
            vertices.extend_from_slice(source.vertices());
            source.release();
        }
        info!(
            sources = sources.len(),
            vertices = vertices.len(),
            "gathered input vertices"
        );

        let mut octree = Octree::new(
            BoundingBox::new(),
            self.config.max_node_depth,
            self.config.min_box_size,
        );
        octree.set_vertices(vertices);
        octree.calculate_size();
        octree.set_as_cube();
        octree.build_by_min_vertex_count(self.config.points_per_tile);

        let content_nodes = octree.extract_nodes_with_content();
        info!(
            nodes = octree.len(),
            tiles = content_nodes.len(),
            "partitioned input into tile units"
        );

        let tiles = content_nodes
            .into_iter()
            .map(|index| {
                let node_code = octree.node_code(index);
                let vertices = octree.take_vertices(index);
                TileContent::new(
                    node_code,
                    vec![Box::new(InMemoryPointCloud::new(vertices)) as Box<dyn PointCloudSource>],
                )
            })
            .collect();
        Ok(tiles)
    }

    /// Encode every tile on the rayon thread pool
    ///
    /// Tiles are independent, so this scales with the physical core count.
    pub fn encode_all_parallel(&self, tiles: &mut [TileContent]) -> BatchSummary {
        let encoder = TileEncoder::new(&self.config, self.crs.as_ref());
        let summary = tiles
            .par_iter_mut()
            .map(|tile| self.encode_one(&encoder, tile))
            .reduce(BatchSummary::default, BatchSummary::merge);
        info!(?summary, "finished parallel encoding batch");
        summary
    }

    /// Encode every tile sequentially, in partition order
    pub fn encode_all(&self, tiles: &mut [TileContent]) -> BatchSummary {
        let encoder = TileEncoder::new(&self.config, self.crs.as_ref());
        let summary = tiles
            .iter_mut()
            .map(|tile| self.encode_one(&encoder, tile))
            .fold(BatchSummary::default(), BatchSummary::merge);
        info!(?summary, "finished encoding batch");
        summary
    }

    /// Run the full pipeline: partition, then encode in parallel
    pub fn run(&self, sources: Vec<Box<dyn PointCloudSource>>) -> Result<BatchSummary> {
        let mut tiles = self.partition(sources)?;
        Ok(self.encode_all_parallel(&mut tiles))
    }

    fn encode_one(&self, encoder: &TileEncoder<'_>, tile: &mut TileContent) -> BatchSummary {
        let result = encoder.encode(tile);
        if let Err(err) = &result {
            error!(node_code = %tile.node_code, "tile failed to encode: {err}");
        }
        BatchSummary::from_result(&result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crs::Wgs84Crs;
    use nalgebra::Vector3;
    use std::path::PathBuf;

    fn temp_output(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("cloud_tiler_tiler_{}_{name}", std::process::id()))
    }

    fn create_test_tiler(name: &str, points_per_tile: usize) -> Tiler {
        let config = Config {
            output_path: temp_output(name),
            points_per_tile,
            ..Config::default()
        };
        Tiler::new(config, Arc::new(Wgs84Crs))
    }

    /// A grid of geographic points spread over a small area near Seoul
    fn create_test_source(n_per_side: usize) -> Box<dyn PointCloudSource> {
        let mut vertices = Vec::new();
        for i in 0..n_per_side {
            for j in 0..n_per_side {
                let u = i as f64 / n_per_side as f64;
                let v = j as f64 / n_per_side as f64;
                vertices.push(PointVertex::new(
                    Vector3::new(127.0 + u * 0.001, 37.5 + v * 0.001, 10.0 + u * 20.0),
                    [(i % 256) as u8, (j % 256) as u8, 200],
                ));
            }
        }
        Box::new(InMemoryPointCloud::new(vertices))
    }

    #[test]
    fn test_partition_preserves_every_vertex() {
        let tiler = create_test_tiler("partition", 16);
        let tiles = tiler.partition(vec![create_test_source(10)]).unwrap();

        assert!(tiles.len() > 1, "100 points at 16 per tile must subdivide");
        let total: usize = tiles.iter().map(|t| t.total_vertex_count()).sum();
        assert_eq!(total, 100);

        // Node codes are unique tile keys
        let mut codes: Vec<&str> = tiles.iter().map(|t| t.node_code.as_str()).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), tiles.len());
        assert!(codes.iter().all(|c| c.starts_with('R')));
    }

    #[test]
    fn test_partition_small_input_single_tile() {
        let tiler = create_test_tiler("single_tile", 1000);
        let tiles = tiler.partition(vec![create_test_source(5)]).unwrap();

        assert_eq!(tiles.len(), 1);
        assert_eq!(tiles[0].node_code, "R");
        assert_eq!(tiles[0].total_vertex_count(), 25);
    }

    #[test]
    fn test_run_writes_artifact_per_tile() {
        let tiler = create_test_tiler("run", 16);
        let summary = tiler.run(vec![create_test_source(10)]).unwrap();

        assert!(summary.written > 1);
        assert_eq!(summary.failed, 0);

        let data_dir = tiler.config().output_path.join("data");
        let artifacts = std::fs::read_dir(&data_dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "bin"))
            .count();
        assert!(artifacts >= summary.written);
    }

    #[test]
    fn test_sequential_and_parallel_agree() {
        let tiler_seq = create_test_tiler("seq", 16);
        let tiler_par = create_test_tiler("par", 16);

        let mut tiles_seq = tiler_seq.partition(vec![create_test_source(8)]).unwrap();
        let mut tiles_par = tiler_par.partition(vec![create_test_source(8)]).unwrap();

        let seq = tiler_seq.encode_all(&mut tiles_seq);
        let par = tiler_par.encode_all_parallel(&mut tiles_par);
        assert_eq!(seq, par);
    }

    #[test]
    fn test_empty_input() {
        let tiler = create_test_tiler("empty", 16);
        let tiles = tiler
            .partition(vec![Box::new(InMemoryPointCloud::new(Vec::new()))])
            .unwrap();
        assert!(tiles.is_empty());
    }
}
