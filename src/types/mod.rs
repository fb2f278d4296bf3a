pub mod linalg;

pub use linalg::*;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }
}

/// Location callback payload
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GpsFix {
    pub timestamp: f64,
    pub location: GeoPoint,
    /// Compass true heading in degrees, absent on devices without a magnetometer
    pub true_heading: Option<f64>,
}

/// One ranging discovery tick. Either field may be missing independently.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RangingSample {
    pub timestamp: f64,
    pub distance: Option<f64>,
    pub direction: Option<SensorDirection>,
}

impl RangingSample {
    pub fn new(timestamp: f64, distance: Option<f64>, direction: Option<SensorDirection>) -> Self {
        Self { timestamp, distance, direction }
    }

    pub fn distance_only(timestamp: f64, distance: f64) -> Self {
        Self::new(timestamp, Some(distance), None)
    }
}

/// Camera euler angles in radians, AR convention (roll about z, then pitch about x, then yaw about y)
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EulerAngles {
    pub pitch: f64,
    pub yaw: f64,
    pub roll: f64,
}

/// Camera transform at the most recent rendered frame
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraPose {
    pub position: WorldVec,
    pub euler: EulerAngles,
}

impl CameraPose {
    pub fn new(position: WorldVec, pitch: f64, yaw: f64) -> Self {
        Self { position, euler: EulerAngles { pitch, yaw, roll: 0.0 } }
    }

    /// Camera at the world origin looking down -z
    pub fn identity() -> Self {
        Self::new(world_origin(), 0.0, 0.0)
    }

    /// Build from a rotation composed as `R = Ry(yaw) * Rx(pitch) * Rz(roll)`
    pub fn from_rotation(position: WorldVec, rotation: &WorldRotation) -> Self {
        let m = rotation.matrix();
        let pitch = (-m[(1, 2)]).clamp(-1.0, 1.0).asin();
        let yaw = m[(0, 2)].atan2(m[(2, 2)]);
        let roll = m[(1, 0)].atan2(m[(1, 1)]);
        Self { position, euler: EulerAngles { pitch, yaw, roll } }
    }

    /// Rotation from camera frame to world frame
    pub fn rotation(&self) -> WorldRotation {
        WorldRotation::from_axis_angle(&WorldVec::y_axis(), self.euler.yaw)
            * WorldRotation::from_axis_angle(&WorldVec::x_axis(), self.euler.pitch)
            * WorldRotation::from_axis_angle(&WorldVec::z_axis(), self.euler.roll)
    }

    /// Express a world point in a frame whose origin is this pose
    pub fn to_local(&self, point: &WorldVec) -> WorldVec {
        self.rotation().inverse() * (point - self.position)
    }

    pub fn pitch(&self) -> f64 {
        self.euler.pitch
    }

    pub fn yaw(&self) -> f64 {
        self.euler.yaw
    }
}

impl Default for CameraPose {
    fn default() -> Self {
        Self::identity()
    }
}

/// AR frame callback payload
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FrameSample {
    pub timestamp: f64,
    pub pose: CameraPose,
    /// Light estimate in lumens (~1000 for a well lit scene)
    pub ambient_intensity: Option<f64>,
}
