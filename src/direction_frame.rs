//! Conversions between the ranging sensor frame, camera-relative angles and the AR world frame.
//!
//! Camera-relative yaw is 0 along the camera's forward axis (-z at yaw 0) and positive to
//! the right; pitch is positive upward. The vertical component of a range is resolved
//! before the horizontal one, which assumes pitch stays well away from ±90°.

use std::f64::consts::{FRAC_PI_2, PI};

use serde::{Deserialize, Serialize};

use crate::types::{CameraPose, SensorDirection, WorldVec};

/// Sensor-frame angles in radians
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AzEl {
    pub azimuth: f64,
    pub elevation: f64,
}

impl AzEl {
    pub fn new(azimuth: f64, elevation: f64) -> Self {
        Self { azimuth, elevation }
    }

    pub fn azimuth_deg(&self) -> f64 {
        self.azimuth.to_degrees()
    }

    pub fn elevation_deg(&self) -> f64 {
        self.elevation.to_degrees()
    }

    /// Validity gate: both angles strictly inside their limits (degrees)
    pub fn within(&self, azimuth_limit_deg: f64, elevation_limit_deg: f64) -> bool {
        self.azimuth_deg().abs() < azimuth_limit_deg && self.elevation_deg().abs() < elevation_limit_deg
    }
}

/// Wrap an angle in radians into (-π, π]
pub fn normalize_radians(angle: f64) -> f64 {
    let mut wrapped = angle % (2.0 * PI);
    if wrapped > PI {
        wrapped -= 2.0 * PI;
    } else if wrapped <= -PI {
        wrapped += 2.0 * PI;
    }
    wrapped
}

/// Unit direction from the ranging sensor → (azimuth, elevation).
///
/// `azimuth = asin(x)`, `elevation = atan2(z, y) + π/2`; a target straight out of the
/// back of the phone (0, 0, -1) sits at (0, 0).
pub fn to_azimuth_elevation(direction: &SensorDirection) -> AzEl {
    let azimuth = direction.x.clamp(-1.0, 1.0).asin();
    let elevation = normalize_radians(direction.z.atan2(direction.y) + FRAC_PI_2);
    AzEl { azimuth, elevation }
}

/// Decompose a range at sensor angles into a world-frame offset from the camera.
pub fn to_world_offset(angles: AzEl, distance: f64, camera_pitch: f64, camera_yaw: f64) -> WorldVec {
    let pitch = camera_pitch + angles.elevation;
    let yaw = -camera_yaw + angles.azimuth;

    let y = distance * pitch.sin();
    let horizontal = (distance * distance - y * y).max(0.0).sqrt();
    let x = horizontal * yaw.sin();
    let z = -horizontal * yaw.cos();
    WorldVec::new(x, y, z)
}

/// Absolute world point for a range observed from `camera`
pub fn to_world_point(angles: AzEl, distance: f64, camera: &CameraPose) -> WorldVec {
    camera.position + to_world_offset(angles, distance, camera.pitch(), camera.yaw())
}

/// World-frame yaw of a horizontal offset, 0 along -z, positive toward +x.
///
/// Written out per quadrant so the axis-aligned cases never divide by zero.
pub fn planar_bearing(dx: f64, dz: f64) -> f64 {
    if dz == 0.0 {
        if dx > 0.0 {
            FRAC_PI_2
        } else if dx < 0.0 {
            -FRAC_PI_2
        } else {
            0.0
        }
    } else if dz < 0.0 {
        // ahead
        (dx / -dz).atan()
    } else if dx >= 0.0 {
        // behind, right half
        PI - (dx / dz).atan()
    } else {
        // behind, left half
        -PI - (dx / dz).atan()
    }
}

/// Camera-relative angles toward a stored world point (dead reckoning).
///
/// Returns `None` when the camera sits exactly on the point.
pub fn relative_angles(camera: &CameraPose, point: &WorldVec) -> Option<AzEl> {
    let offset = point - camera.position;
    let distance = offset.norm();
    if distance == 0.0 {
        return None;
    }

    let pitch = (offset.y / distance).clamp(-1.0, 1.0).asin();
    let yaw = planar_bearing(offset.x, offset.z);

    Some(AzEl {
        azimuth: normalize_radians(yaw + camera.yaw()),
        elevation: normalize_radians(pitch - camera.pitch()),
    })
}
