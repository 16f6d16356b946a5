//! Scene-local East-North-Up frames.
//!
//! Every scene is anchored at a geographic origin. Persisted instance locations
//! are meters in the ENU tangent frame at that origin (X = East, Y = North,
//! Z = Up); the viewer works in earth-fixed world coordinates on the WGS84
//! ellipsoid. This module converts between the two.

use glam::{DMat4, DVec3};

const WGS84_SEMI_MAJOR_AXIS: f64 = 6_378_137.0;
const WGS84_FLATTENING: f64 = 1.0 / 298.257_223_563;

/// Geographic anchor of a scene's local frame.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SceneOrigin {
    /// Degrees.
    pub longitude: f64,
    /// Degrees.
    pub latitude: f64,
    /// Meters above the ellipsoid.
    #[serde(default)]
    pub height: f64,
}

impl SceneOrigin {
    pub fn new(longitude: f64, latitude: f64, height: f64) -> Self {
        Self {
            longitude,
            latitude,
            height,
        }
    }

    /// Earth-fixed position of the origin.
    pub fn world_position(&self) -> DVec3 {
        cartographic_to_world(self.longitude, self.latitude, self.height)
    }
}

/// Geodetic coordinates (degrees, meters) to earth-fixed cartesian meters.
pub fn cartographic_to_world(longitude_deg: f64, latitude_deg: f64, height: f64) -> DVec3 {
    let e2 = WGS84_FLATTENING * (2.0 - WGS84_FLATTENING);
    let (sin_lat, cos_lat) = latitude_deg.to_radians().sin_cos();
    let (sin_lon, cos_lon) = longitude_deg.to_radians().sin_cos();
    let n = WGS84_SEMI_MAJOR_AXIS / (1.0 - e2 * sin_lat * sin_lat).sqrt();
    DVec3::new(
        (n + height) * cos_lat * cos_lon,
        (n + height) * cos_lat * sin_lon,
        (n * (1.0 - e2) + height) * sin_lat,
    )
}

/// ENU-to-world matrix anchored at `origin`.
///
/// Columns are the east, north and up unit vectors followed by the origin's
/// earth-fixed position, so `enu_frame(o) * local` yields a world point.
pub fn enu_frame(origin: &SceneOrigin) -> DMat4 {
    let (sin_lat, cos_lat) = origin.latitude.to_radians().sin_cos();
    let (sin_lon, cos_lon) = origin.longitude.to_radians().sin_cos();

    let east = DVec3::new(-sin_lon, cos_lon, 0.0);
    let north = DVec3::new(-sin_lat * cos_lon, -sin_lat * sin_lon, cos_lat);
    let up = DVec3::new(cos_lat * cos_lon, cos_lat * sin_lon, sin_lat);

    DMat4::from_cols(
        east.extend(0.0),
        north.extend(0.0),
        up.extend(0.0),
        origin.world_position().extend(1.0),
    )
}

/// World point to scene-local meters.
///
/// Without an origin the raw world coordinates are returned unchanged.
pub fn to_local(origin: Option<&SceneOrigin>, world: DVec3) -> DVec3 {
    match origin {
        Some(origin) => enu_frame(origin).inverse().transform_point3(world),
        None => {
            log::warn!("No scene origin configured; using raw world coordinates as local");
            world
        }
    }
}

/// Scene-local meters to a world point.
pub fn to_world(origin: Option<&SceneOrigin>, local: DVec3) -> DVec3 {
    match origin {
        Some(origin) => enu_frame(origin).transform_point3(local),
        None => {
            log::warn!("No scene origin configured; using local coordinates as world");
            local
        }
    }
}

/// World-space displacement for a local offset applied at `world`.
///
/// ENU axes are direction vectors, so the result does not depend on where
/// along the frame the offset is applied.
pub fn local_offset_to_world(origin: Option<&SceneOrigin>, offset: DVec3) -> DVec3 {
    match origin {
        Some(origin) => enu_frame(origin).transform_vector3(offset),
        None => offset,
    }
}
