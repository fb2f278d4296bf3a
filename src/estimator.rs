//! Target estimator: the fused belief about where the parked car is.
//!
//! Runs once per ranging tick and once per AR frame. Distance and direction are
//! resolved independently, each through a fixed priority chain:
//!
//! - distance: ranging > arrival (zero after already being close) > held-over prior
//!   (isolated zero) > dead-reckoned from the stored world point > stale prior
//! - direction: ranging > dead-reckoned from the stored world point > GPS bearing
//!
//! The world point is only (re)anchored while the calibration gate is locked. It is
//! re-derived from the *current* camera pose on every accepted ranging direction so
//! pose drift never accumulates into the stored offset.

use serde::{Deserialize, Serialize};

use crate::calibration::CalibrationGate;
use crate::config::TrackerConfig;
use crate::direction_frame::{relative_angles, to_azimuth_elevation, to_world_point, AzEl};
use crate::plausibility::{PlausibilityFilter, Verdict};
use crate::types::{CameraPose, RangingSample, WorldVec};

// ─── Resolution results ──────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum DistanceResolution {
    /// Fresh nonzero ranging distance
    Ranging(f64),
    /// Zero reading after the estimate was already within the arrival epsilon
    Arrival,
    /// Zero reading while still far: treated as a dropout, prior distance kept
    HeldOver(f64),
    /// No ranging distance; camera-to-world-point distance
    DeadReckoned(f64),
    /// No ranging distance and nothing to dead-reckon from; prior distance kept
    Stale(f64),
    Unavailable,
}

impl DistanceResolution {
    pub fn value(&self) -> Option<f64> {
        match *self {
            DistanceResolution::Ranging(d)
            | DistanceResolution::HeldOver(d)
            | DistanceResolution::DeadReckoned(d)
            | DistanceResolution::Stale(d) => Some(d),
            DistanceResolution::Arrival => Some(0.0),
            DistanceResolution::Unavailable => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum DirectionResolution {
    /// Ranging direction inside the validity gate and plausible
    Ranging(AzEl),
    /// Bearing from the camera to the stored world point
    DeadReckoned(AzEl),
    /// Compass-corrected GPS bearing, degrees
    Gps { yaw_deg: f64 },
    /// Flip detected; estimate cleared
    Rejected { previous_deg: f64, rejected_deg: f64 },
    Unavailable,
}

impl DirectionResolution {
    pub fn yaw_deg(&self) -> Option<f64> {
        match self {
            DirectionResolution::Ranging(a) | DirectionResolution::DeadReckoned(a) => Some(a.azimuth_deg()),
            DirectionResolution::Gps { yaw_deg } => Some(*yaw_deg),
            _ => None,
        }
    }
}

// ─── Estimate ────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TargetEstimate {
    /// Target in the AR world frame, once it has been placed
    pub world_position: Option<WorldVec>,
    pub distance: Option<f64>,
    pub yaw_deg: Option<f64>,
    pub pitch_deg: Option<f64>,
}

impl TargetEstimate {
    /// Fused distance equals the sensor's zero sentinel
    pub fn arrived(&self) -> bool {
        self.distance == Some(0.0)
    }
}

/// Inputs for one update. Frame-only ticks pass `ranging: None`.
#[derive(Clone, Copy, Debug, Default)]
pub struct EstimatorInput<'a> {
    pub ranging: Option<&'a RangingSample>,
    pub camera: Option<&'a CameraPose>,
    pub gps_yaw_deg: Option<f64>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EstimatorUpdate {
    pub distance: DistanceResolution,
    pub direction: DirectionResolution,
    /// Swept onto the target axis this tick
    pub pointing: bool,
    /// Became arrived on this tick
    pub arrived: bool,
}

impl EstimatorUpdate {
    fn no_data() -> Self {
        Self {
            distance: DistanceResolution::Unavailable,
            direction: DirectionResolution::Unavailable,
            pointing: false,
            arrived: false,
        }
    }

    pub fn is_fault(&self) -> bool {
        matches!(self.direction, DirectionResolution::Rejected { .. })
    }
}

// ─── Estimator ───────────────────────────────────────────────────────────────

pub struct TargetEstimator {
    estimate: TargetEstimate,
    filter: PlausibilityFilter,
    arrival_epsilon_m: f64,
}

impl TargetEstimator {
    pub fn new(config: &TrackerConfig) -> Self {
        Self {
            estimate: TargetEstimate::default(),
            filter: PlausibilityFilter::new(config),
            arrival_epsilon_m: config.arrival_epsilon_m,
        }
    }

    pub fn estimate(&self) -> &TargetEstimate {
        &self.estimate
    }

    /// Discard everything; used on session teardown and plausibility faults
    pub fn reset(&mut self) {
        self.estimate = TargetEstimate::default();
        self.filter.clear();
    }

    /// AR origin moved to `new_origin` (expressed in the old frame): re-express the stored point
    pub fn rebase(&mut self, new_origin: &CameraPose) {
        if let Some(point) = self.estimate.world_position {
            self.estimate.world_position = Some(new_origin.to_local(&point));
        }
    }

    pub fn update(&mut self, gate: &CalibrationGate, input: EstimatorInput<'_>) -> EstimatorUpdate {
        let was_arrived = self.estimate.arrived();
        let ranging_distance = input
            .ranging
            .and_then(|r| r.distance)
            .filter(|d| d.is_finite() && *d >= 0.0);

        let mut update = if gate.is_locked() {
            self.update_locked(gate, ranging_distance, input)
        } else {
            self.update_unlocked(ranging_distance)
        };

        update.arrived = !was_arrived && self.estimate.arrived();
        if update.arrived {
            log::info!("Arrived: zero distance accepted");
        }
        update
    }

    /// Before lock only the zero-distance arrival override and the raw distance are recorded
    fn update_unlocked(&mut self, ranging_distance: Option<f64>) -> EstimatorUpdate {
        let mut update = EstimatorUpdate::no_data();
        if let Some(d) = ranging_distance {
            self.estimate.distance = Some(d);
            update.distance = if d == 0.0 { DistanceResolution::Arrival } else { DistanceResolution::Ranging(d) };
        }
        update
    }

    fn update_locked(
        &mut self,
        gate: &CalibrationGate,
        ranging_distance: Option<f64>,
        input: EstimatorInput<'_>,
    ) -> EstimatorUpdate {
        let distance = self.resolve_distance(ranging_distance, input.camera);
        if distance == DistanceResolution::Unavailable {
            log::debug!("No distance available this tick");
            return EstimatorUpdate::no_data();
        }
        self.estimate.distance = distance.value();
        if distance == DistanceResolution::Arrival {
            // Target is where the phone is; frames keep reporting zero until the camera moves away
            if let Some(camera) = input.camera {
                self.estimate.world_position = Some(camera.position);
            }
        }

        let (direction, pointing) = self.resolve_direction(gate, distance, input);
        log::debug!("Resolved distance {:?} direction {:?}", distance, direction);

        EstimatorUpdate { distance, direction, pointing, arrived: false }
    }

    fn resolve_distance(&self, ranging_distance: Option<f64>, camera: Option<&CameraPose>) -> DistanceResolution {
        match ranging_distance {
            Some(d) if d != 0.0 => DistanceResolution::Ranging(d),
            Some(_) => match self.estimate.distance {
                Some(prior) if prior < self.arrival_epsilon_m => DistanceResolution::Arrival,
                Some(prior) => DistanceResolution::HeldOver(prior),
                None => DistanceResolution::Unavailable,
            },
            None => match (self.estimate.world_position, camera) {
                (Some(point), Some(camera)) => DistanceResolution::DeadReckoned((point - camera.position).norm()),
                _ => self.estimate.distance.map_or(DistanceResolution::Unavailable, DistanceResolution::Stale),
            },
        }
    }

    fn resolve_direction(
        &mut self,
        gate: &CalibrationGate,
        distance: DistanceResolution,
        input: EstimatorInput<'_>,
    ) -> (DirectionResolution, bool) {
        let d = distance.value();

        // a. ranging direction
        if let Some(direction) = input.ranging.and_then(|r| r.direction) {
            let angles = to_azimuth_elevation(&direction);
            if gate.accepts(&angles) {
                return match self.filter.check(angles.azimuth_deg(), d) {
                    Verdict::Accepted { pointing } => {
                        if let (Some(camera), Some(d)) = (input.camera, d) {
                            self.estimate.world_position = Some(to_world_point(angles, d, camera));
                        }
                        self.set_angles(&angles);
                        (DirectionResolution::Ranging(angles), pointing)
                    }
                    Verdict::Rejected { previous_deg } => (self.fault(previous_deg, angles.azimuth_deg()), false),
                };
            }
            log::debug!(
                "Ranging direction outside gate: az {:.1}° el {:.1}°",
                angles.azimuth_deg(),
                angles.elevation_deg()
            );
        }

        // b. dead reckoning from the stored world point
        if let (Some(point), Some(camera)) = (self.estimate.world_position, input.camera) {
            if let Some(angles) = relative_angles(camera, &point) {
                return match self.filter.check(angles.azimuth_deg(), d) {
                    Verdict::Accepted { pointing } => {
                        // A fresh range slides the stored point along the dead-reckoned ray
                        if let DistanceResolution::Ranging(d) = distance {
                            self.estimate.world_position = Some(to_world_point(angles, d, camera));
                        }
                        self.set_angles(&angles);
                        (DirectionResolution::DeadReckoned(angles), pointing)
                    }
                    Verdict::Rejected { previous_deg } => (self.fault(previous_deg, angles.azimuth_deg()), false),
                };
            }
        }

        // c. GPS bearing
        if let Some(yaw_deg) = input.gps_yaw_deg {
            let pointing = self.filter.observe_pointing(yaw_deg, d);
            self.estimate.yaw_deg = Some(yaw_deg);
            self.estimate.pitch_deg = None;
            return (DirectionResolution::Gps { yaw_deg }, pointing);
        }

        self.estimate.yaw_deg = None;
        self.estimate.pitch_deg = None;
        (DirectionResolution::Unavailable, false)
    }

    fn set_angles(&mut self, angles: &AzEl) {
        self.estimate.yaw_deg = Some(angles.azimuth_deg());
        self.estimate.pitch_deg = Some(angles.elevation_deg());
    }

    fn fault(&mut self, previous_deg: f64, rejected_deg: f64) -> DirectionResolution {
        self.reset();
        DirectionResolution::Rejected { previous_deg, rejected_deg }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SensorDirection;
    use approx::assert_abs_diff_eq;

    fn locked_gate(config: &TrackerConfig) -> CalibrationGate {
        let mut gate = CalibrationGate::new(config);
        gate.connect();
        let ahead = to_azimuth_elevation(&SensorDirection::new(0.0, 0.0, -1.0));
        while !gate.is_locked() {
            gate.observe(Some(&ahead));
        }
        gate
    }

    /// Unit direction at the given sensor azimuth (degrees), zero elevation
    fn direction_at(azimuth_deg: f64) -> SensorDirection {
        let a = azimuth_deg.to_radians();
        SensorDirection::new(a.sin(), 0.0, -a.cos())
    }

    fn ranging(distance: Option<f64>, direction: Option<SensorDirection>) -> RangingSample {
        RangingSample::new(0.0, distance, direction)
    }

    fn feed(
        estimator: &mut TargetEstimator,
        gate: &CalibrationGate,
        sample: &RangingSample,
        camera: Option<&CameraPose>,
    ) -> EstimatorUpdate {
        estimator.update(gate, EstimatorInput { ranging: Some(sample), camera, gps_yaw_deg: None })
    }

    #[test]
    fn test_ranging_places_target_in_world() {
        let config = TrackerConfig::default();
        let gate = locked_gate(&config);
        let mut estimator = TargetEstimator::new(&config);
        let camera = CameraPose::identity();

        let update = feed(&mut estimator, &gate, &ranging(Some(2.0), Some(direction_at(0.0))), Some(&camera));
        assert_eq!(update.distance, DistanceResolution::Ranging(2.0));
        assert!(matches!(update.direction, DirectionResolution::Ranging(_)));

        let point = estimator.estimate().world_position.unwrap();
        assert_abs_diff_eq!(point, WorldVec::new(0.0, 0.0, -2.0), epsilon = 1e-9);
    }

    #[test]
    fn test_isolated_zero_is_dropout_not_arrival() {
        let config = TrackerConfig::default();
        let gate = locked_gate(&config);
        let mut estimator = TargetEstimator::new(&config);

        feed(&mut estimator, &gate, &ranging(Some(0.5), None), None);
        let update = feed(&mut estimator, &gate, &ranging(Some(0.0), None), None);

        assert_eq!(update.distance, DistanceResolution::HeldOver(0.5));
        assert!(!update.arrived);
        assert!(!estimator.estimate().arrived());
        assert_eq!(estimator.estimate().distance, Some(0.5));
    }

    #[test]
    fn test_zero_after_close_is_arrival() {
        let config = TrackerConfig::default();
        let gate = locked_gate(&config);
        let mut estimator = TargetEstimator::new(&config);

        feed(&mut estimator, &gate, &ranging(Some(0.02), None), None);
        let update = feed(&mut estimator, &gate, &ranging(Some(0.0), None), None);

        assert_eq!(update.distance, DistanceResolution::Arrival);
        assert!(update.arrived);
        assert!(estimator.estimate().arrived());

        // Cleared the moment distance is nonzero again
        feed(&mut estimator, &gate, &ranging(Some(0.1), None), None);
        assert!(!estimator.estimate().arrived());
    }

    #[test]
    fn test_arrival_survives_frame_ticks() {
        let config = TrackerConfig::default();
        let gate = locked_gate(&config);
        let mut estimator = TargetEstimator::new(&config);
        let camera = CameraPose::new(WorldVec::new(0.0, 0.0, -3.0), 0.0, 0.0);

        feed(&mut estimator, &gate, &ranging(Some(0.02), Some(direction_at(0.0))), Some(&camera));
        feed(&mut estimator, &gate, &ranging(Some(0.0), None), Some(&camera));
        assert!(estimator.estimate().arrived());

        let frame = EstimatorInput { ranging: None, camera: Some(&camera), gps_yaw_deg: None };
        let update = estimator.update(&gate, frame);
        assert_eq!(update.distance, DistanceResolution::DeadReckoned(0.0));
        assert!(estimator.estimate().arrived());

        let moved = CameraPose::new(WorldVec::new(0.5, 0.0, -3.0), 0.0, 0.0);
        estimator.update(&gate, EstimatorInput { ranging: None, camera: Some(&moved), gps_yaw_deg: None });
        assert!(!estimator.estimate().arrived());
    }

    #[test]
    fn test_unlocked_zero_is_verbatim_arrival() {
        let config = TrackerConfig::default();
        let mut gate = CalibrationGate::new(&config);
        gate.connect();
        let mut estimator = TargetEstimator::new(&config);

        feed(&mut estimator, &gate, &ranging(Some(0.5), None), None);
        let update = feed(&mut estimator, &gate, &ranging(Some(0.0), None), None);
        assert!(update.arrived);
    }

    #[test]
    fn test_unlocked_never_places_world_point() {
        let config = TrackerConfig::default();
        let mut gate = CalibrationGate::new(&config);
        gate.connect();
        let mut estimator = TargetEstimator::new(&config);
        let camera = CameraPose::identity();

        let update = feed(&mut estimator, &gate, &ranging(Some(3.0), Some(direction_at(0.0))), Some(&camera));
        assert_eq!(update.direction, DirectionResolution::Unavailable);
        assert!(estimator.estimate().world_position.is_none());
        assert_eq!(estimator.estimate().distance, Some(3.0));
    }

    #[test]
    fn test_frame_only_tick_dead_reckons() {
        let config = TrackerConfig::default();
        let gate = locked_gate(&config);
        let mut estimator = TargetEstimator::new(&config);

        let start = CameraPose::identity();
        feed(&mut estimator, &gate, &ranging(Some(4.0), Some(direction_at(0.0))), Some(&start));
        let placed = estimator.estimate().world_position;

        // Walk 1 m forward and turn slightly right (negative yaw)
        let moved = CameraPose::new(WorldVec::new(0.0, 0.0, -1.0), 0.0, -0.1);
        let update = estimator.update(&gate, EstimatorInput { ranging: None, camera: Some(&moved), gps_yaw_deg: None });

        match update.distance {
            DistanceResolution::DeadReckoned(d) => assert_abs_diff_eq!(d, 3.0, epsilon = 1e-9),
            other => panic!("expected dead reckoning, got {other:?}"),
        }
        match update.direction {
            DirectionResolution::DeadReckoned(angles) => {
                // Target straight down world -z, camera turned right: target sits to the left
                assert_abs_diff_eq!(angles.azimuth, -0.1, epsilon = 1e-9);
            }
            other => panic!("expected dead reckoning, got {other:?}"),
        }
        assert_eq!(estimator.estimate().world_position, placed);
    }

    #[test]
    fn test_direction_outside_gate_falls_through() {
        let config = TrackerConfig::default();
        let gate = locked_gate(&config);
        let mut estimator = TargetEstimator::new(&config);
        let camera = CameraPose::identity();

        feed(&mut estimator, &gate, &ranging(Some(4.0), Some(direction_at(5.0))), Some(&camera));
        let update = feed(&mut estimator, &gate, &ranging(Some(4.0), Some(direction_at(80.0))), Some(&camera));
        assert!(matches!(update.direction, DirectionResolution::DeadReckoned(_)));
    }

    #[test]
    fn test_gps_fallback_when_nothing_else() {
        let config = TrackerConfig::default();
        let gate = locked_gate(&config);
        let mut estimator = TargetEstimator::new(&config);

        let sample = ranging(Some(12.0), None);
        let update = estimator.update(&gate, EstimatorInput { ranging: Some(&sample), camera: None, gps_yaw_deg: Some(-35.0) });
        assert_eq!(update.direction, DirectionResolution::Gps { yaw_deg: -35.0 });
        assert_eq!(estimator.estimate().yaw_deg, Some(-35.0));
    }

    #[test]
    fn test_no_data_at_all() {
        let config = TrackerConfig::default();
        let gate = locked_gate(&config);
        let mut estimator = TargetEstimator::new(&config);
        let camera = CameraPose::identity();

        let update = estimator.update(&gate, EstimatorInput { ranging: None, camera: Some(&camera), gps_yaw_deg: None });
        assert_eq!(update, EstimatorUpdate::no_data());
        assert_eq!(estimator.estimate(), &TargetEstimate::default());
    }

    #[test]
    fn test_direction_only_tick_uses_prior_distance() {
        let config = TrackerConfig::default();
        let gate = locked_gate(&config);
        let mut estimator = TargetEstimator::new(&config);

        feed(&mut estimator, &gate, &ranging(Some(5.0), None), None);
        let update = feed(&mut estimator, &gate, &ranging(None, Some(direction_at(20.0))), None);
        assert_eq!(update.distance, DistanceResolution::Stale(5.0));
        assert!(matches!(update.direction, DirectionResolution::Ranging(_)));
        assert_abs_diff_eq!(estimator.estimate().yaw_deg.unwrap(), 20.0, epsilon = 1e-9);
    }

    #[test]
    fn test_flip_clears_estimate() {
        let config = TrackerConfig::default();
        let gate = locked_gate(&config);
        let mut estimator = TargetEstimator::new(&config);
        let camera = CameraPose::identity();

        feed(&mut estimator, &gate, &ranging(Some(5.0), Some(direction_at(40.0))), Some(&camera));
        let update = feed(&mut estimator, &gate, &ranging(Some(5.0), Some(direction_at(-5.0))), Some(&camera));

        assert!(update.is_fault());
        assert_eq!(estimator.estimate(), &TargetEstimate::default());
    }

    #[test]
    fn test_rebase_moves_stored_point() {
        let config = TrackerConfig::default();
        let gate = locked_gate(&config);
        let mut estimator = TargetEstimator::new(&config);
        let camera = CameraPose::identity();

        feed(&mut estimator, &gate, &ranging(Some(3.0), Some(direction_at(0.0))), Some(&camera));
        estimator.rebase(&CameraPose::new(WorldVec::new(0.0, 0.0, -1.0), 0.0, 0.0));
        let point = estimator.estimate().world_position.unwrap();
        assert_abs_diff_eq!(point, WorldVec::new(0.0, 0.0, -2.0), epsilon = 1e-9);
    }
}
