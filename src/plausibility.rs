//! Direction-flip rejection and "now pointing at the target" edge detection.

use serde::{Deserialize, Serialize};

use crate::config::TrackerConfig;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum Verdict {
    /// Angle stored; `pointing` is set on the sample that crossed onto the target axis
    Accepted { pointing: bool },
    /// Abrupt flip while far away; caller must recalibrate and restart the ranging session
    Rejected { previous_deg: f64 },
}

#[derive(Clone, Debug)]
pub struct PlausibilityFilter {
    /// Last sensor-derived angle; the only history flips are judged against
    prev_angle_deg: Option<f64>,
    /// Last GPS bearing, kept apart so compass bearings never enter the flip test
    prev_bearing_deg: Option<f64>,
    close_range_m: f64,
    flip_threshold_deg: f64,
    pointing_threshold_deg: f64,
}

impl PlausibilityFilter {
    pub fn new(config: &TrackerConfig) -> Self {
        Self {
            prev_angle_deg: None,
            prev_bearing_deg: None,
            close_range_m: config.close_range_m,
            flip_threshold_deg: config.flip_threshold_deg,
            pointing_threshold_deg: config.pointing_threshold_deg,
        }
    }

    pub fn prev_angle_deg(&self) -> Option<f64> {
        self.prev_angle_deg
    }

    pub fn clear(&mut self) {
        self.prev_angle_deg = None;
        self.prev_bearing_deg = None;
    }

    fn is_far(&self, distance: Option<f64>) -> bool {
        distance.is_some_and(|d| d > self.close_range_m)
    }

    fn crossed_on_axis(&self, prev: f64, new: f64) -> bool {
        prev.abs() >= self.pointing_threshold_deg && new.abs() < self.pointing_threshold_deg
    }

    /// Check a new camera-relative angle (degrees) against the previous one.
    ///
    /// Directions are never compared inside close range.
    pub fn check(&mut self, angle_deg: f64, distance: Option<f64>) -> Verdict {
        let far = self.is_far(distance);
        let mut pointing = false;

        if let Some(prev) = self.prev_angle_deg {
            if far && (angle_deg.abs() - prev.abs()).abs() > self.flip_threshold_deg {
                log::warn!(
                    "Direction flip rejected: {:.1}° -> {:.1}° at {:.2} m",
                    prev,
                    angle_deg,
                    distance.unwrap_or_default()
                );
                self.prev_angle_deg = None;
                return Verdict::Rejected { previous_deg: prev };
            }
            pointing = far && self.crossed_on_axis(prev, angle_deg);
        }

        self.prev_angle_deg = Some(angle_deg);
        Verdict::Accepted { pointing }
    }

    /// Pointing edge-trigger only, for bearings that are allowed to jump (GPS).
    ///
    /// Leaves the sensor history used by `check` untouched.
    pub fn observe_pointing(&mut self, bearing_deg: f64, distance: Option<f64>) -> bool {
        let pointing = match self.prev_bearing_deg {
            Some(prev) => self.is_far(distance) && self.crossed_on_axis(prev, bearing_deg),
            None => false,
        };
        self.prev_bearing_deg = Some(bearing_deg);
        pointing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter() -> PlausibilityFilter {
        PlausibilityFilter::new(&TrackerConfig::default())
    }

    #[test]
    fn test_rejects_flip_when_far() {
        let mut f = filter();
        assert!(matches!(f.check(30.0, Some(5.0)), Verdict::Accepted { .. }));
        assert_eq!(f.check(-170.0, Some(5.0)), Verdict::Rejected { previous_deg: 30.0 });
        assert!(f.prev_angle_deg().is_none());
    }

    #[test]
    fn test_accepts_smooth_progression() {
        let mut f = filter();
        for angle in [30.0, 20.0, 10.0] {
            assert_eq!(f.check(angle, Some(5.0)), Verdict::Accepted { pointing: false });
        }
    }

    #[test]
    fn test_no_comparison_inside_close_range() {
        let mut f = filter();
        f.check(30.0, Some(0.5));
        assert!(matches!(f.check(-170.0, Some(0.5)), Verdict::Accepted { .. }));
    }

    #[test]
    fn test_unknown_distance_is_not_far() {
        let mut f = filter();
        f.check(30.0, None);
        assert!(matches!(f.check(-170.0, None), Verdict::Accepted { .. }));
    }

    #[test]
    fn test_pointing_is_edge_triggered() {
        let mut f = filter();
        f.check(18.0, Some(4.0));
        f.check(12.0, Some(4.0));
        assert_eq!(f.check(6.0, Some(4.0)), Verdict::Accepted { pointing: true });
        // Staying on axis does not fire again
        assert_eq!(f.check(3.0, Some(4.0)), Verdict::Accepted { pointing: false });
        // Leave and come back
        f.check(14.0, Some(4.0));
        assert_eq!(f.check(-4.0, Some(4.0)), Verdict::Accepted { pointing: true });
    }

    #[test]
    fn test_first_sample_after_rejection_is_accepted() {
        let mut f = filter();
        f.check(30.0, Some(5.0));
        f.check(-170.0, Some(5.0));
        assert!(matches!(f.check(-170.0, Some(5.0)), Verdict::Accepted { .. }));
    }

    #[test]
    fn test_gps_pointing_ignores_jumps() {
        let mut f = filter();
        assert!(!f.observe_pointing(120.0, Some(40.0)));
        assert!(f.observe_pointing(2.0, Some(40.0)));
        assert!(!f.observe_pointing(2.0, Some(0.3)));
    }

    #[test]
    fn test_gps_bearing_does_not_feed_flip_history() {
        let mut f = filter();
        f.check(0.0, Some(10.0));
        f.observe_pointing(-90.0, Some(10.0));
        assert_eq!(f.prev_angle_deg(), Some(0.0));
        assert_eq!(f.check(0.0, Some(10.0)), Verdict::Accepted { pointing: false });
    }
}
