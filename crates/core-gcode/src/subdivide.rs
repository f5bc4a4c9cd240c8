//! Locating the worst surface deviation along a move.
//!
//! A long move is split where the surface height diverges most from the
//! straight-line Z interpolation between the endpoint heights. The squared
//! deviation D(t) is seeded with a coarse probe sweep and then refined by
//! gradient ascent on its analytic derivative. A split is only accepted when
//! the refined point sits clear of both endpoints and deviates enough to be
//! worth an extra move.

use crate::arc::arc_geometry;
use crate::state::{ArcMode, ExtruderMode, GcodeState, MoveMode};
use core_surface::Coeffs;
use std::f64::consts::FRAC_PI_4;
use tracing::trace;

/// Derivative magnitude treated as converged.
const MIN_DER: f64 = 0.0001;
/// Minimum squared deviation that justifies a split.
const MIN_DEV: f64 = 0.25;
/// Margin keeping accepted splits away from the endpoints.
const TELO: f64 = 0.01;
/// Hard cap on ascent steps per move.
const STEP_BAIL: usize = 1000;
/// Ascent step size.
const STEP_SCALER: f64 = 0.1;
/// Coarse probes seeding the ascent.
const NUM_PROBES: usize = 10;

/// Squared deviation for the straight move at progress `t`.
fn line_sqr_distance(t: f64, current: &GcodeState, next: &GcodeState, coeffs: &Coeffs) -> f64 {
    let mut heading = next.abs_pos - current.abs_pos;
    heading.z = 0.0;
    let mut pos = current.abs_pos;
    pos.z = 0.0;
    pos += heading * t;

    let dev = coeffs.eval(pos.x, pos.y)
        - current.model_height
        - (next.model_height - current.model_height) * t;
    dev * dev
}

fn line_sqr_derivative(t: f64, current: &GcodeState, next: &GcodeState, coeffs: &Coeffs) -> f64 {
    let delta_height = next.model_height - current.model_height;

    let mut heading = next.abs_pos - current.abs_pos;
    heading.z = 0.0;
    let mut pos = current.abs_pos;
    pos.z = 0.0;
    pos += heading * t;

    let dev = coeffs.eval(pos.x, pos.y) - current.model_height - delta_height * t;
    2.0 * dev * (coeffs.gradient(pos.x, pos.y).dot(heading) - delta_height)
}

/// Squared deviation for the arc at progress `t`, sampling the point reached
/// after sweeping `t` of the arc angle.
fn arc_sqr_distance(t: f64, current: &GcodeState, next: &GcodeState, coeffs: &Coeffs) -> f64 {
    let radius = (current.abs_pos - next.arc_center).rotated_z(next.arc_angle * t);
    let pos = next.arc_center + radius;

    let dev = coeffs.eval(pos.x, pos.y)
        - current.model_height
        - (next.model_height - current.model_height) * t;
    dev * dev
}

fn arc_sqr_derivative(t: f64, current: &GcodeState, next: &GcodeState, coeffs: &Coeffs) -> f64 {
    let delta_height = next.model_height - current.model_height;

    let radius = (current.abs_pos - next.arc_center).rotated_z(next.arc_angle * t);
    let pos = next.arc_center + radius;

    // Travel direction approximated by rotating the radius a further
    // eighth-turn toward the commanded direction.
    let heading = if next.move_mode == MoveMode::ArcCcw {
        radius.rotated_z(FRAC_PI_4)
    } else {
        radius.rotated_z(-FRAC_PI_4)
    };

    let dev = coeffs.eval(pos.x, pos.y) - current.model_height - delta_height * t;
    2.0 * dev * (coeffs.gradient(pos.x, pos.y).dot(heading) - delta_height)
}

/// Probe D(t) coarsely, then ascend D'(t) from the best probe. Returns the
/// final progress, wherever the ascent stopped.
fn ascend(dist: impl Fn(f64) -> f64, deriv: impl Fn(f64) -> f64) -> f64 {
    let mut max_dev = 0.0;
    let mut max_t = 0.0;
    for probe in 0..NUM_PROBES {
        let t = probe as f64 / 10.0;
        let dev = dist(t);
        if dev > max_dev {
            max_dev = dev;
            max_t = t;
        }
    }

    let mut t = max_t;
    let mut steps = 0;
    loop {
        let der = deriv(t);
        t += der * STEP_SCALER;
        steps += 1;
        if der.abs() < MIN_DER || steps >= STEP_BAIL || t <= TELO || t >= 1.0 - TELO {
            break;
        }
    }
    trace!(target: "level.subdivide", progress = t, steps, "ascent_stop");
    t
}

/// Split the extrusion coordinate between `worst` and `next` at `t`.
fn split_extrusion(t: f64, current: &GcodeState, next: &mut GcodeState, worst: &mut GcodeState) {
    match next.extruder_mode {
        ExtruderMode::Relative => {
            worst.e = next.e * t;
            next.e *= 1.0 - t;
        }
        ExtruderMode::Absolute if next.e != current.e => {
            worst.e = current.e + (next.e - current.e) * t;
        }
        _ => {}
    }
}

/// Find the worst deviation along the straight move `current -> next`.
///
/// On acceptance returns the intermediate state at the split and adjusts
/// `next` to describe the remaining second half (`extra_args` move to the
/// first half). Returns `None` when the move is fine as a single segment.
pub fn worst_line_offender(
    current: &GcodeState,
    next: &mut GcodeState,
    coeffs: &Coeffs,
) -> Option<GcodeState> {
    let t = ascend(
        |t| line_sqr_distance(t, current, next, coeffs),
        |t| line_sqr_derivative(t, current, next, coeffs),
    );

    if !(t > TELO && t < 1.0 - TELO && line_sqr_distance(t, current, next, coeffs) > MIN_DEV) {
        return None;
    }

    let mut worst = next.clone();
    split_extrusion(t, current, next, &mut worst);

    worst.abs_pos = current.abs_pos + (next.abs_pos - current.abs_pos) * t;
    if next.move_mode == MoveMode::Rapid {
        worst.pos = next.pos * t;
        next.pos = next.pos * (1.0 - t);
    } else {
        worst.pos = worst.abs_pos - worst.pos_offset;
    }

    next.extra_args.clear();
    Some(worst)
}

/// Arc counterpart of [`worst_line_offender`]. `next` keeps the same center
/// but has its sweep, and in center-offset mode its I/J words, re-aimed from
/// the split point.
pub fn worst_arc_offender(
    current: &GcodeState,
    next: &mut GcodeState,
    coeffs: &Coeffs,
) -> Option<GcodeState> {
    let t = ascend(
        |t| arc_sqr_distance(t, current, next, coeffs),
        |t| arc_sqr_derivative(t, current, next, coeffs),
    );

    if !(t > TELO && t < 1.0 - TELO && arc_sqr_distance(t, current, next, coeffs) > MIN_DEV) {
        return None;
    }

    let mut worst = next.clone();
    split_extrusion(t, current, next, &mut worst);

    let radius = (current.abs_pos - next.arc_center).rotated_z(next.arc_angle * t);
    let pos = next.arc_center + radius;

    worst.abs_pos = pos;
    if next.move_mode == MoveMode::Rapid {
        worst.pos = pos - current.abs_pos;
        next.pos = next.abs_pos - pos;
    } else {
        worst.pos = worst.abs_pos - worst.pos_offset;
    }

    if next.arc_mode == ArcMode::CenterOffset {
        next.i = next.arc_center.x - worst.abs_pos.x;
        next.j = next.arc_center.y - worst.abs_pos.y;
    }

    worst.arc_angle = t * next.arc_angle;
    next.arc_angle *= 1.0 - t;

    next.extra_args.clear();
    Some(worst)
}

/// Re-resolve arc geometry for threshold checks (kept here so the emitter
/// does not need the arc module directly).
pub fn arc_length(current: &GcodeState, next: &mut GcodeState) -> Option<f64> {
    arc_geometry(current, next)
}
