//! Linear algebra aliases for the AR world frame
//!
//! World frame follows the AR session convention: +x right, +y up,
//! -z forward from the camera at session start. All lengths in meters.

use nalgebra::{Rotation3, Vector3};

// ===== World-space types =====
pub type WorldVec = Vector3<f64>;
pub type WorldRotation = Rotation3<f64>;

// ===== Sensor-frame types =====
/// Unit direction reported by the ranging sensor (+x right, +y up, +z out of the screen)
pub type SensorDirection = Vector3<f64>;

/// Origin of the AR world frame
pub fn world_origin() -> WorldVec {
    WorldVec::zeros()
}
