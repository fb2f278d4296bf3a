//! Car finder: guides a pedestrian back to a parked car by fusing GPS, UWB ranging and
//! AR camera pose into a distance, a spoken direction and a haptic rhythm.

pub mod calibration;
pub mod config;
pub mod direction_frame;
pub mod error;
pub mod estimator;
pub mod geo_bearing;
pub mod guidance;
pub mod haptics;
pub mod live_status;
pub mod plausibility;
pub mod providers;
pub mod session;
pub mod tracker;
pub mod types;

pub use config::TrackerConfig;
pub use error::{Result, TrackerError};
pub use tracker::{ProviderEvent, Tracker, TrackerEvent};
