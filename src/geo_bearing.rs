//! Great-circle bearing and distance between geographic coordinates.
//!
//! Used as the direction of last resort when neither the ranging sensor nor
//! AR dead-reckoning can supply one, and as the whole guidance source in
//! GPS-only mode.

use geo::{HaversineDistance, Point};

use crate::types::GeoPoint;

/// Wrap an angle in degrees into (-180, 180]
pub fn normalize_degrees(degrees: f64) -> f64 {
    let mut wrapped = degrees % 360.0;
    if wrapped > 180.0 {
        wrapped -= 360.0;
    } else if wrapped <= -180.0 {
        wrapped += 360.0;
    }
    wrapped
}

/// Initial bearing from `from` to `to` in degrees, in (-180, 180], 0 = north, clockwise positive.
///
/// Identical points yield 0 (atan2(0, 0)).
pub fn bearing(from: &GeoPoint, to: &GeoPoint) -> f64 {
    let phi1 = from.latitude.to_radians();
    let phi2 = to.latitude.to_radians();
    let delta_lon = (to.longitude - from.longitude).to_radians();

    let y = delta_lon.sin() * phi2.cos();
    let x = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * delta_lon.cos();
    normalize_degrees(y.atan2(x).to_degrees())
}

/// Great-circle distance in meters
pub fn distance(from: &GeoPoint, to: &GeoPoint) -> f64 {
    let a = Point::new(from.longitude, from.latitude);
    let b = Point::new(to.longitude, to.latitude);
    a.haversine_distance(&b)
}

/// Direction to the destination relative to where the user is facing, in degrees.
///
/// Takes the bearing from the destination back to the user, flips it by 180 degrees
/// and subtracts the compass heading. Negative is to the user's left.
pub fn relative_bearing(user: &GeoPoint, destination: &GeoPoint, true_heading: f64) -> f64 {
    let back_bearing = bearing(destination, user);
    let flipped = if back_bearing < 0.0 {
        back_bearing + 180.0
    } else {
        back_bearing - 180.0
    };
    normalize_degrees(flipped - true_heading)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_bearing_identical_points_is_zero() {
        let p = GeoPoint::new(44.5632, -69.66136);
        assert_eq!(bearing(&p, &p), 0.0);
        assert_eq!(distance(&p, &p), 0.0);
    }

    #[test]
    fn test_bearing_cardinal_directions() {
        let origin = GeoPoint::new(0.0, 0.0);
        assert_abs_diff_eq!(bearing(&origin, &GeoPoint::new(1.0, 0.0)), 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(bearing(&origin, &GeoPoint::new(0.0, 1.0)), 90.0, epsilon = 1e-9);
        assert_abs_diff_eq!(bearing(&origin, &GeoPoint::new(0.0, -1.0)), -90.0, epsilon = 1e-9);
        assert_abs_diff_eq!(bearing(&origin, &GeoPoint::new(-1.0, 0.0)), 180.0, epsilon = 1e-9);
    }

    #[test]
    fn test_bearing_range_over_grid() {
        let from = GeoPoint::new(44.5632, -69.66136);
        for dlat in [-2.0, -0.5, -1e-6, 0.0, 1e-6, 0.5, 2.0] {
            for dlon in [-3.0, -0.25, -1e-6, 0.0, 1e-6, 0.25, 3.0] {
                let to = GeoPoint::new(from.latitude + dlat, from.longitude + dlon);
                let b = bearing(&from, &to);
                assert!(b > -180.0 && b <= 180.0, "bearing {b} out of range");
            }
        }
    }

    #[test]
    fn test_distance_one_degree_latitude() {
        let d = distance(&GeoPoint::new(44.0, -69.0), &GeoPoint::new(45.0, -69.0));
        assert!((d - 111_195.0).abs() < 200.0, "got {d}");
    }

    #[test]
    fn test_relative_bearing_target_ahead_and_left() {
        let user = GeoPoint::new(44.5630, -69.6613);
        let car = GeoPoint::new(44.5640, -69.6613); // due north

        assert_abs_diff_eq!(relative_bearing(&user, &car, 0.0), 0.0, epsilon = 1e-6);
        // Facing east, a northern target sits on the left
        assert_abs_diff_eq!(relative_bearing(&user, &car, 90.0), -90.0, epsilon = 1e-6);
        // Facing south, target directly behind
        assert_abs_diff_eq!(relative_bearing(&user, &car, 180.0).abs(), 180.0, epsilon = 1e-6);
    }

    #[test]
    fn test_normalize_degrees() {
        assert_eq!(normalize_degrees(190.0), -170.0);
        assert_eq!(normalize_degrees(-180.0), 180.0);
        assert_eq!(normalize_degrees(540.0), 180.0);
        assert_eq!(normalize_degrees(-45.0), -45.0);
    }
}
