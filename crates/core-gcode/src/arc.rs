//! Circular-arc geometry for G2/G3 moves in the XY plane.
//!
//! Two specification styles: center offset (`I`/`J`, relative to the start
//! point) and chord-radius (`R`). Both resolve to a center, a signed swept
//! angle (negative clockwise), and an arc length used by the subdivision
//! threshold check.

use crate::state::{ArcMode, GcodeState, MoveMode};
use core_geom::Vec3;
use std::f64::consts::PI;
use tracing::{debug, warn};

/// Resolve the pending arc on `next`, storing `arc_center` and `arc_angle`
/// and returning the arc length, or `None` when the geometry is unusable
/// (R-mode chord longer than the diameter, or a zero-length chord).
pub fn arc_geometry(current: &GcodeState, next: &mut GcodeState) -> Option<f64> {
    if next.arc_mode == ArcMode::CenterOffset {
        // Center from the start-relative offset; its Z is the midpoint of
        // the two endpoint heights.
        next.arc_center = Vec3::new(
            current.abs_pos.x + next.i,
            current.abs_pos.y + next.j,
            (current.abs_pos.z + next.abs_pos.z) / 2.0,
        );

        let radius = Vec3::new(-next.i, -next.j, 0.0);
        let arm = Vec3::new(
            next.abs_pos.x - next.arc_center.x,
            next.abs_pos.y - next.arc_center.y,
            0.0,
        );

        // Short-way sweep between the two radii; the cross product tells us
        // which side the short way lies on.
        let alpha = radius.cross(arm).z;
        let dir = alpha >= 0.0;
        let mut beta = (radius.dot(arm) / radius.magnitude() / arm.magnitude()).acos();

        // The commanded direction takes the long way around when it
        // disagrees with the short-way side.
        if dir ^ (next.move_mode == MoveMode::ArcCcw) {
            beta = 2.0 * PI - beta;
        }
        if next.move_mode == MoveMode::ArcCw {
            beta = -beta;
        }

        next.arc_angle = beta;
        Some(beta.abs() * radius.magnitude())
    } else {
        let chord = next.abs_pos - current.abs_pos;

        if chord.magnitude() > 2.0 * next.r {
            warn!(
                target: "level.arc",
                radius = next.r,
                chord = chord.magnitude(),
                "excessive_radius"
            );
            None
        } else if chord.magnitude() == 0.0 {
            debug!(target: "level.arc", "zero_chord");
            None
        } else {
            let rot = if next.move_mode == MoveMode::ArcCw {
                -1.0
            } else {
                1.0
            };

            // Perpendicular bisector offset selects the center on the side
            // matching the commanded direction.
            let q = (chord * rot).perp_xy().normalized()
                * (next.r * next.r - chord.mag_sqr() / 4.0).sqrt();
            next.arc_center = current.abs_pos + chord * 0.5 + q;

            let radius = current.abs_pos - next.arc_center;
            let arm = next.abs_pos - next.arc_center;
            next.arc_angle =
                (radius.dot(arm) / radius.magnitude() / arm.magnitude()).acos() * rot;
            Some(next.arc_angle.abs() * radius.magnitude())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_PI_2;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn states(start: Vec3, end: Vec3, mode: MoveMode) -> (GcodeState, GcodeState) {
        let mut current = GcodeState::new();
        current.abs_pos = start;
        let mut next = GcodeState::new();
        next.abs_pos = end;
        next.move_mode = mode;
        (current, next)
    }

    #[test]
    fn ij_quarter_turn_clockwise() {
        // Start (0,0), center (1,0), end (1,1): clockwise is the short way.
        let (current, mut next) = states(
            Vec3::ZERO,
            Vec3::new(1.0, 1.0, 0.0),
            MoveMode::ArcCw,
        );
        next.arc_mode = ArcMode::CenterOffset;
        next.i = 1.0;
        let len = arc_geometry(&current, &mut next).unwrap();
        assert!(close(next.arc_angle, -FRAC_PI_2));
        assert!(close(len, FRAC_PI_2));
        assert!(close(next.arc_center.x, 1.0) && close(next.arc_center.y, 0.0));
    }

    #[test]
    fn ij_counterclockwise_takes_long_way() {
        // Same endpoints counter-clockwise: 3/4 of the circle.
        let (current, mut next) = states(
            Vec3::ZERO,
            Vec3::new(1.0, 1.0, 0.0),
            MoveMode::ArcCcw,
        );
        next.arc_mode = ArcMode::CenterOffset;
        next.i = 1.0;
        let len = arc_geometry(&current, &mut next).unwrap();
        assert!(close(next.arc_angle, 3.0 * FRAC_PI_2));
        assert!(close(len, 3.0 * FRAC_PI_2));
    }

    #[test]
    fn ij_center_z_is_endpoint_mean() {
        let (current, mut next) = states(
            Vec3::new(0.0, 0.0, 2.0),
            Vec3::new(2.0, 0.0, 4.0),
            MoveMode::ArcCcw,
        );
        next.arc_mode = ArcMode::CenterOffset;
        next.i = 1.0;
        arc_geometry(&current, &mut next);
        assert!(close(next.arc_center.z, 3.0));
    }

    #[test]
    fn r_mode_semicircle() {
        // Chord equals the diameter: center at the midpoint, sweep of pi.
        let (current, mut next) = states(
            Vec3::ZERO,
            Vec3::new(10.0, 0.0, 0.0),
            MoveMode::ArcCw,
        );
        next.arc_mode = ArcMode::Radius;
        next.r = 5.0;
        let len = arc_geometry(&current, &mut next).unwrap();
        assert!(close(next.arc_center.x, 5.0) && close(next.arc_center.y, 0.0));
        assert!(close(next.arc_angle, -std::f64::consts::PI));
        assert!(close(len, 5.0 * std::f64::consts::PI));
    }

    #[test]
    fn r_mode_direction_selects_center_side() {
        let (current, mut next) = states(
            Vec3::ZERO,
            Vec3::new(2.0, 0.0, 0.0),
            MoveMode::ArcCcw,
        );
        next.arc_mode = ArcMode::Radius;
        next.r = 2.0;
        arc_geometry(&current, &mut next).unwrap();
        let ccw_center_y = next.arc_center.y;

        let (current, mut next) = states(
            Vec3::ZERO,
            Vec3::new(2.0, 0.0, 0.0),
            MoveMode::ArcCw,
        );
        next.arc_mode = ArcMode::Radius;
        next.r = 2.0;
        arc_geometry(&current, &mut next).unwrap();
        assert!(close(ccw_center_y, -next.arc_center.y));
        assert!(next.arc_angle < 0.0);
    }

    #[test]
    fn r_mode_rejects_impossible_geometry() {
        // Chord longer than the diameter.
        let (current, mut next) = states(
            Vec3::ZERO,
            Vec3::new(20.0, 0.0, 0.0),
            MoveMode::ArcCw,
        );
        next.arc_mode = ArcMode::Radius;
        next.r = 5.0;
        assert!(arc_geometry(&current, &mut next).is_none());

        // Zero chord.
        let (current, mut next) = states(Vec3::ZERO, Vec3::ZERO, MoveMode::ArcCw);
        next.arc_mode = ArcMode::Radius;
        next.r = 5.0;
        assert!(arc_geometry(&current, &mut next).is_none());
    }
}
