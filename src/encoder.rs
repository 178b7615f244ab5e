//! Point-cloud tile encoding
//!
//! One [`TileEncoder::encode`] call turns one tile unit (a node code plus its
//! source point clouds) into a binary artifact: positions are reprojected to
//! WGS84, moved into a tile-local tangent frame, quantized to 16-bit unsigned
//! triples and packed together with colors behind two 8-byte-padded JSON
//! metadata tables.
//!
//! Failure semantics follow the batch contract: degenerate single-point
//! tiles are skipped, per-point reprojection failures drop only that point,
//! and a non-finite quantization volume is fatal for the tile alone.

use crate::bbox::BoundingBox;
use crate::config::Config;
use crate::crs::{self, CrsTransform, LocalFrame};
use crate::pointcloud::TileContent;
use crate::writer::TileWriter;
use crate::{Result, TilerError};
use nalgebra::{Matrix3, Rotation3, Vector3};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{debug, error, warn};

/// Full range of a 16-bit quantized component
const QUANTIZED_MAX: f64 = 65535.0;

/// Result of encoding one tile
#[derive(Debug, Clone, PartialEq)]
pub enum EncodeOutcome {
    /// The artifact was written
    Written {
        /// Hierarchical tile key the artifact is stored under
        node_code: String,
        /// Path of the written artifact
        path: PathBuf,
        /// Number of points in the artifact (after any drops)
        points_written: usize,
    },
    /// The tile was degenerate (a single point cannot define a quantization
    /// volume) and nothing was written
    SkippedDegenerate,
}

/// Byte-offset descriptor into the binary body
#[derive(Debug, Serialize)]
struct ByteOffset {
    #[serde(rename = "byteOffset")]
    byte_offset: usize,
}

/// Feature table of one point-cloud tile
///
/// Field names are part of the external tile format and must not change.
#[derive(Debug, Serialize)]
struct FeatureTable {
    #[serde(rename = "POINTS_LENGTH")]
    points_length: usize,
    #[serde(rename = "QUANTIZED_VOLUME_OFFSET")]
    quantized_volume_offset: [f32; 3],
    #[serde(rename = "QUANTIZED_VOLUME_SCALE")]
    quantized_volume_scale: [f32; 3],
    #[serde(rename = "POSITION_QUANTIZED")]
    position_quantized: ByteOffset,
    #[serde(rename = "RGB")]
    rgb: ByteOffset,
    #[serde(rename = "RTC_CENTER", skip_serializing_if = "Option::is_none")]
    rtc_center: Option<[f64; 3]>,
}

/// Batch table of one tile; reserved extension point for per-point
/// attributes, currently always empty
#[derive(Debug, Serialize)]
struct BatchTable {}

/// Encodes tile units into binary point-cloud artifacts
///
/// The encoder owns no mutable state: one instance can encode many tiles,
/// concurrently, as long as the coordinate transform it borrows is shared
/// safely (the [`CrsTransform`] contract requires that).
pub struct TileEncoder<'a> {
    config: &'a Config,
    crs: &'a dyn CrsTransform,
}

impl<'a> TileEncoder<'a> {
    /// Create an encoder over a configuration and a coordinate transform
    pub fn new(config: &'a Config, crs: &'a dyn CrsTransform) -> Self {
        Self { config, crs }
    }

    /// Encode one tile unit and write its artifact
    ///
    /// Sources are loaded and released one at a time, bounding peak memory
    /// to roughly one source cloud plus the accumulated output arrays.
    pub fn encode(&self, content: &mut TileContent) -> Result<EncodeOutcome> {
        let total_vertex_count = content.total_vertex_count();
        if total_vertex_count == 1 {
            error!(
                node_code = %content.node_code,
                "tile holds exactly one point; skipping (no quantization volume)"
            );
            return Ok(EncodeOutcome::SkippedDegenerate);
        }

        // Tile-local tangent frame anchored at the center of the aggregate
        // WGS84 bounding box, with the geodetic Z-up frame rotated into the
        // tile's Y-up output frame.
        let source_bbox = content.bounding_box();
        let frame = self.tile_frame(&source_bbox)?;
        let rotation = output_rotation(&frame);

        let mut positions: Vec<Vector3<f32>> = Vec::with_capacity(total_vertex_count);
        let mut colors: Vec<[u8; 3]> = Vec::with_capacity(total_vertex_count);
        let mut quantized_volume = BoundingBox::new();

        for source in &mut content.sources {
            source.load()?;
            for vertex in source.vertices() {
                // Per-point reprojection failures drop only that point.
                let projected = match self.crs.project(vertex.position) {
                    Ok(projected) => projected,
                    Err(err) => {
                        warn!(
                            node_code = %content.node_code,
                            position = ?vertex.position,
                            "dropping point with failed reprojection: {err}"
                        );
                        continue;
                    }
                };

                // Elevation passes through the projection unchanged.
                let wgs84 = Vector3::new(projected.x, projected.y, vertex.position.z);
                let cartesian = crs::geographic_to_cartesian(wgs84);
                let local = rotation * frame.to_local(cartesian);

                // Right-handed convention swap into the output frame.
                let output = Vector3::new(local.x as f32, -local.z as f32, local.y as f32);
                quantized_volume.add_point(output.cast::<f64>());
                positions.push(output);
                colors.push(vertex.color);
            }
            source.release();
        }

        let offset = quantized_volume.min();
        let scale = quantized_volume.size();
        validate_quantization_volume(&content.node_code, offset, scale)?;

        let quantized = quantize_positions(&content.node_code, &positions, offset, scale);

        let position_bytes = quantized.len() * 2;
        let feature_table = FeatureTable {
            points_length: positions.len(),
            quantized_volume_offset: [offset.x as f32, offset.y as f32, offset.z as f32],
            quantized_volume_scale: [scale.x as f32, scale.y as f32, scale.z as f32],
            position_quantized: ByteOffset { byte_offset: 0 },
            rgb: ByteOffset {
                byte_offset: position_bytes,
            },
            // With a classic transform matrix the full transform is supplied
            // by the surrounding tileset; otherwise downstream renderers get
            // the relative-to-center translation.
            rtc_center: (!self.config.classic_transform_matrix).then(|| {
                let translation = frame.translation();
                [translation.x, translation.y, translation.z]
            }),
        };
        let batch_table = BatchTable {};

        let feature_table_json = pad_to_multiple_of_8(escape_non_ascii(&serde_json::to_string(
            &feature_table,
        )?));
        let batch_table_json =
            pad_to_multiple_of_8(escape_non_ascii(&serde_json::to_string(&batch_table)?));

        let mut artifact = Vec::with_capacity(
            feature_table_json.len() + batch_table_json.len() + position_bytes + colors.len() * 3,
        );
        artifact.extend_from_slice(feature_table_json.as_bytes());
        artifact.extend_from_slice(batch_table_json.as_bytes());
        for component in &quantized {
            artifact.extend_from_slice(&component.to_le_bytes());
        }
        for color in &colors {
            artifact.extend_from_slice(color);
        }

        let writer = TileWriter::new(&self.config.output_path)?;
        let path = writer.write(&content.node_code, &artifact)?;
        debug!(
            node_code = %content.node_code,
            points = positions.len(),
            bytes = artifact.len(),
            "encoded point-cloud tile"
        );

        Ok(EncodeOutcome::Written {
            node_code: content.node_code.clone(),
            path,
            points_written: positions.len(),
        })
    }

    /// Derive the tile-local tangent frame from the aggregate source-CRS
    /// bounding box: reproject its corners to WGS84, take the center, anchor
    /// an east-north-up frame at the corresponding cartesian point.
    fn tile_frame(&self, source_bbox: &BoundingBox) -> Result<LocalFrame> {
        let min = source_bbox.min();
        let max = source_bbox.max();

        let projected_min = self.crs.project(min)?;
        let projected_max = self.crs.project(max)?;

        let mut wgs84_bbox = BoundingBox::new();
        wgs84_bbox.add_point(Vector3::new(projected_min.x, projected_min.y, min.z));
        wgs84_bbox.add_point(Vector3::new(projected_max.x, projected_max.y, max.z));

        let center_cartesian = crs::geographic_to_cartesian(wgs84_bbox.center());
        crs::local_frame_at(center_cartesian)
    }
}

/// The fixed axis-convention correction composed onto the tangent frame's
/// rotational block: `Rx(-90°) · frame3x3`.
fn output_rotation(frame: &LocalFrame) -> Matrix3<f64> {
    let frame3x3: Matrix3<f64> = frame.matrix.fixed_view::<3, 3>(0, 0).into();
    let x_rotation = Rotation3::from_axis_angle(&Vector3::x_axis(), -std::f64::consts::FRAC_PI_2);
    x_rotation.matrix() * frame3x3
}

/// Reject non-finite quantization parameters before any position is divided
/// by them; writing through them would corrupt the artifact's geometry.
fn validate_quantization_volume(
    node_code: &str,
    offset: Vector3<f64>,
    scale: Vector3<f64>,
) -> Result<()> {
    let finite = offset.iter().all(|c| c.is_finite()) && scale.iter().all(|c| c.is_finite());
    if finite {
        return Ok(());
    }

    error!(
        node_code,
        ?offset,
        ?scale,
        "quantization volume is not finite; tile not written"
    );
    Err(TilerError::DegenerateQuantization {
        reason: format!("offset {offset:?}, scale {scale:?}"),
    })
}

/// Quantize positions into flat little-endian-ready u16 triples
///
/// A zero scale component (all points identical on that axis) maps every
/// point to 0 on that axis; out-of-range components are clamped and logged.
fn quantize_positions(
    node_code: &str,
    positions: &[Vector3<f32>],
    offset: Vector3<f64>,
    scale: Vector3<f64>,
) -> Vec<u16> {
    let mut quantized = Vec::with_capacity(positions.len() * 3);
    for position in positions {
        for axis in 0..3 {
            quantized.push(quantize_component(
                node_code,
                position[axis] as f64,
                offset[axis],
                scale[axis],
            ));
        }
    }
    quantized
}

#[inline]
fn quantize_component(node_code: &str, value: f64, offset: f64, scale: f64) -> u16 {
    if scale <= 0.0 {
        return 0;
    }

    let scaled = ((value - offset) / scale * QUANTIZED_MAX).round();
    if scaled < 0.0 {
        error!(node_code, value, "quantized component below 0; clamping");
        0
    } else if scaled > QUANTIZED_MAX {
        error!(node_code, value, "quantized component above 65535; clamping");
        u16::MAX
    } else {
        scaled as u16
    }
}

/// Escape every non-ASCII character of a JSON string as `\uXXXX` units
fn escape_non_ascii(input: &str) -> String {
    if input.is_ascii() {
        return input.to_string();
    }

    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if c.is_ascii() {
            out.push(c);
        } else {
            let mut units = [0u16; 2];
            for unit in c.encode_utf16(&mut units) {
                out.push_str(&format!("\\u{unit:04X}"));
            }
        }
    }
    out
}

/// Right-pad a serialized table with spaces to an 8-byte boundary, the
/// binary-alignment requirement of the tile format
fn pad_to_multiple_of_8(mut json: String) -> String {
    while json.len() % 8 != 0 {
        json.push(' ');
    }
    json
}
