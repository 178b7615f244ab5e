//! Coordinate reference system seam and WGS84 geodesy helpers
//!
//! The pipeline consumes a ready-made coordinate transform as a capability:
//! implementations of [`CrsTransform`] project a source-CRS position into
//! geographic WGS84. The conversions that are fixed by the output format
//! (geographic to earth-centered cartesian, local tangent frames) live here
//! as free functions.

use crate::{Result, TilerError};
use nalgebra::{Matrix4, Vector3};

/// WGS84 ellipsoid constants
pub mod wgs84 {
    /// Semi-major axis (equatorial radius) in meters.
    pub const A: f64 = 6_378_137.0;

    /// Flattening factor (1 / 298.257223563).
    pub const F: f64 = 1.0 / 298.257_223_563;

    /// First eccentricity squared.
    pub const E2: f64 = F * (2.0 - F);

    /// Semi-minor axis (polar radius) in meters.
    pub const B: f64 = A * (1.0 - F);

    /// Second eccentricity squared.
    pub const E2P: f64 = (A * A - B * B) / (B * B);
}

/// Projects positions from a source CRS into geographic WGS84
///
/// Implementations are stateless services, safe to share across tile
/// encoders running in parallel. A failed projection for one point is a
/// recoverable condition: the caller decides how to proceed.
///
/// Positions are `(x, y, elevation)`; the projected result is
/// `(longitude, latitude, elevation)` in degrees/meters with the elevation
/// passed through unchanged.
pub trait CrsTransform: Send + Sync {
    /// Project a single source-CRS position to WGS84
    fn project(&self, position: Vector3<f64>) -> Result<Vector3<f64>>;
}

/// Identity transform for sources already in geographic WGS84
#[derive(Debug, Clone, Copy, Default)]
pub struct Wgs84Crs;

impl CrsTransform for Wgs84Crs {
    fn project(&self, position: Vector3<f64>) -> Result<Vector3<f64>> {
        if !position.x.is_finite() || !position.y.is_finite() {
            return Err(TilerError::Projection(format!(
                "non-finite geographic position ({}, {})",
                position.x, position.y
            )));
        }
        Ok(position)
    }
}

/// Convert a geographic WGS84 position `(lon, lat, height)` in degrees and
/// meters to earth-centered, earth-fixed cartesian coordinates in meters.
#[inline]
pub fn geographic_to_cartesian(position: Vector3<f64>) -> Vector3<f64> {
    let lon = position.x.to_radians();
    let lat = position.y.to_radians();
    let height = position.z;

    let (sin_lat, cos_lat) = lat.sin_cos();
    let (sin_lon, cos_lon) = lon.sin_cos();
    let n = wgs84::A / (1.0 - wgs84::E2 * sin_lat * sin_lat).sqrt();

    Vector3::new(
        (n + height) * cos_lat * cos_lon,
        (n + height) * cos_lat * sin_lon,
        (n * (1.0 - wgs84::E2) + height) * sin_lat,
    )
}

/// Convert an earth-centered cartesian position to geographic WGS84,
/// returning `(lon, lat, height)` in degrees and meters.
#[inline]
pub fn cartesian_to_geographic(position: Vector3<f64>) -> Vector3<f64> {
    use wgs84::*;

    let (x, y, z) = (position.x, position.y, position.z);
    let p = (x * x + y * y).sqrt();
    let lon = y.atan2(x);
    let theta = (z * A).atan2(p * B);
    let (sin_t, cos_t) = theta.sin_cos();
    let lat = (z + E2P * B * sin_t * sin_t * sin_t).atan2(p - E2 * A * cos_t * cos_t * cos_t);
    let sin_lat = lat.sin();
    let n = A / (1.0 - E2 * sin_lat * sin_lat).sqrt();
    let height = p / lat.cos() - n;

    Vector3::new(lon.to_degrees(), lat.to_degrees(), height)
}

/// A local east-north-up tangent frame anchored at a cartesian point
///
/// `matrix` maps local coordinates to earth-centered cartesian; `inverse`
/// maps the other way. The translation column of `matrix` is the anchor
/// point itself.
#[derive(Debug, Clone, Copy)]
pub struct LocalFrame {
    pub matrix: Matrix4<f64>,
    pub inverse: Matrix4<f64>,
}

impl LocalFrame {
    /// The frame's anchor point in earth-centered cartesian coordinates
    #[inline]
    pub fn translation(&self) -> Vector3<f64> {
        Vector3::new(self.matrix[(0, 3)], self.matrix[(1, 3)], self.matrix[(2, 3)])
    }

    /// Map an earth-centered cartesian position into local coordinates
    #[inline]
    pub fn to_local(&self, cartesian: Vector3<f64>) -> Vector3<f64> {
        self.inverse.transform_point(&cartesian.into()).coords
    }
}

/// Derive the local east-north-up tangent frame at an earth-centered
/// cartesian point on (or near) the WGS84 ellipsoid.
pub fn local_frame_at(cartesian: Vector3<f64>) -> Result<LocalFrame> {
    let geographic = cartesian_to_geographic(cartesian);
    let lon = geographic.x.to_radians();
    let lat = geographic.y.to_radians();

    let (sin_lat, cos_lat) = lat.sin_cos();
    let (sin_lon, cos_lon) = lon.sin_cos();

    let east = Vector3::new(-sin_lon, cos_lon, 0.0);
    let north = Vector3::new(-sin_lat * cos_lon, -sin_lat * sin_lon, cos_lat);
    let up = Vector3::new(cos_lat * cos_lon, cos_lat * sin_lon, sin_lat);

    let mut matrix = Matrix4::identity();
    matrix.fixed_view_mut::<3, 1>(0, 0).copy_from(&east);
    matrix.fixed_view_mut::<3, 1>(0, 1).copy_from(&north);
    matrix.fixed_view_mut::<3, 1>(0, 2).copy_from(&up);
    matrix.fixed_view_mut::<3, 1>(0, 3).copy_from(&cartesian);

    let inverse = matrix.try_inverse().ok_or_else(|| {
        TilerError::Projection(format!("tangent frame at {cartesian:?} is singular"))
    })?;

    Ok(LocalFrame { matrix, inverse })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geographic_to_cartesian_equator() {
        // (0, 0, 0) sits on the equator at the prime meridian: x = semi-major axis
        let ecef = geographic_to_cartesian(Vector3::new(0.0, 0.0, 0.0));
        assert!((ecef.x - wgs84::A).abs() < 1e-6);
        assert!(ecef.y.abs() < 1e-6);
        assert!(ecef.z.abs() < 1e-6);
    }

    #[test]
    fn test_geographic_to_cartesian_pole() {
        let ecef = geographic_to_cartesian(Vector3::new(0.0, 90.0, 0.0));
        assert!(ecef.x.abs() < 1e-6);
        assert!(ecef.y.abs() < 1e-6);
        assert!((ecef.z - wgs84::B).abs() < 1e-6);
    }

    #[test]
    fn test_cartesian_geographic_roundtrip() {
        let geographic = Vector3::new(127.1, 37.5, 53.2);
        let ecef = geographic_to_cartesian(geographic);
        let back = cartesian_to_geographic(ecef);

        assert!((back.x - geographic.x).abs() < 1e-9);
        assert!((back.y - geographic.y).abs() < 1e-9);
        assert!((back.z - geographic.z).abs() < 1e-6);
    }

    #[test]
    fn test_local_frame_roundtrip() {
        let anchor = geographic_to_cartesian(Vector3::new(127.0, 37.0, 0.0));
        let frame = local_frame_at(anchor).unwrap();

        // The anchor maps to the local origin
        let local = frame.to_local(anchor);
        assert!(local.norm() < 1e-6);

        // A nearby point survives the local/global roundtrip
        let nearby = geographic_to_cartesian(Vector3::new(127.001, 37.001, 10.0));
        let local = frame.to_local(nearby);
        let back = frame.matrix.transform_point(&local.into()).coords;
        assert!((back - nearby).norm() < 1e-6);
    }

    #[test]
    fn test_local_frame_up_axis() {
        // Moving straight up in height moves along the local +z axis
        let anchor = geographic_to_cartesian(Vector3::new(10.0, 45.0, 0.0));
        let above = geographic_to_cartesian(Vector3::new(10.0, 45.0, 100.0));
        let frame = local_frame_at(anchor).unwrap();

        let local = frame.to_local(above);
        assert!(local.x.abs() < 1e-3);
        assert!(local.y.abs() < 1e-3);
        assert!((local.z - 100.0).abs() < 1e-3);
    }

    #[test]
    fn test_wgs84_identity_crs() {
        let crs = Wgs84Crs;
        let p = Vector3::new(127.0, 37.0, 12.0);
        assert_eq!(crs.project(p).unwrap(), p);

        assert!(crs.project(Vector3::new(f64::NAN, 37.0, 0.0)).is_err());
    }
}
