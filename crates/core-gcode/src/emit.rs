//! Writing corrected motion lines.
//!
//! Axis words are only emitted when they changed from the previous state;
//! the corrected Z goes out only once all three axes have been absolutely
//! committed. Extrusion follows the extruder mode: relative extrusion always
//! re-emits E, absolute extrusion only on change.

use crate::state::{ArcMode, AxisMask, ExtruderMode, GcodeState, PositioningMode};
use core_surface::Coeffs;
use std::io::{self, Write};

/// Surface-corrected Z for `next`, expressed in the program's frame.
///
/// The absolute corrected height (`surface + commanded Z`, or `surface -
/// commanded Z` when inverted) is cached on `next` so a later relative move
/// can be emitted as a delta from it.
pub(crate) fn eval_point(
    current: &GcodeState,
    next: &mut GcodeState,
    coeffs: &Coeffs,
    invert_z: bool,
) -> f64 {
    let mut abs_z = coeffs.eval(next.abs_pos.x, next.abs_pos.y);
    if invert_z {
        abs_z -= next.abs_pos.z;
    } else {
        abs_z += next.abs_pos.z;
    }
    next.abs_z = abs_z;

    match next.positioning_mode {
        PositioningMode::Absolute => abs_z - next.pos_offset.z,
        PositioningMode::Relative => abs_z - current.abs_z,
    }
}

fn write_common_words<W: Write>(
    out: &mut W,
    current: &GcodeState,
    next: &mut GcodeState,
    coeffs: &Coeffs,
    invert_z: bool,
) -> io::Result<()> {
    write!(out, "G{}", next.move_mode.gcode_digit())?;
    if next.pos.x != current.pos.x {
        write!(out, " X{}", next.pos.x)?;
    }
    if next.pos.y != current.pos.y {
        write!(out, " Y{}", next.pos.y)?;
    }
    // Only send an adjusted Z once we know where we are absolutely.
    if next.abs_lock == AxisMask::all() {
        let z = eval_point(current, next, coeffs, invert_z);
        write!(out, " Z{z}")?;
    }
    Ok(())
}

fn write_extrusion<W: Write>(
    out: &mut W,
    current: &GcodeState,
    next: &GcodeState,
) -> io::Result<()> {
    match next.extruder_mode {
        ExtruderMode::Relative => write!(out, " E{}", next.e),
        ExtruderMode::Absolute if next.e != current.e => write!(out, " E{}", next.e),
        _ => Ok(()),
    }
}

/// Emit a straight move (G0/G1).
pub(crate) fn construct_line<W: Write>(
    out: &mut W,
    line_end: &str,
    current: &GcodeState,
    next: &mut GcodeState,
    coeffs: &Coeffs,
    invert_z: bool,
) -> io::Result<()> {
    write_common_words(out, current, next, coeffs, invert_z)?;
    write_extrusion(out, current, next)?;
    write!(out, "{}{}", next.extra_args, line_end)
}

/// Emit an arc-shaped move (G2/G3, and anything else that is not straight),
/// re-issuing the arc words it was specified with.
pub(crate) fn construct_arc<W: Write>(
    out: &mut W,
    line_end: &str,
    current: &GcodeState,
    next: &mut GcodeState,
    coeffs: &Coeffs,
    invert_z: bool,
) -> io::Result<()> {
    write_common_words(out, current, next, coeffs, invert_z)?;
    match next.arc_mode {
        ArcMode::Radius => write!(out, " R{}", next.r)?,
        ArcMode::CenterOffset => write!(out, " I{} J{}", next.i, next.j)?,
        ArcMode::Disabled => {}
    }
    write_extrusion(out, current, next)?;
    write!(out, "{}{}", next.extra_args, line_end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::MoveMode;
    use core_geom::Vec3;

    fn flat_one() -> Coeffs {
        // Constant surface z = 1.
        Coeffs::from_rows(&[vec![1.0]])
    }

    fn locked(x: f64, y: f64, z: f64) -> GcodeState {
        let mut s = GcodeState::new();
        s.abs_lock = AxisMask::all();
        s.pos = Vec3::new(x, y, z);
        s.abs_pos = s.pos;
        s
    }

    fn emitted(current: &GcodeState, next: &mut GcodeState, coeffs: &Coeffs) -> String {
        let mut out = Vec::new();
        construct_line(&mut out, "\n", current, next, coeffs, false).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn constant_surface_offsets_z() {
        let current = GcodeState::new();
        let mut next = locked(10.0, 10.0, 0.0);
        next.move_mode = MoveMode::Linear;
        let line = emitted(&current, &mut next, &flat_one());
        assert_eq!(line, "G1 X10 Y10 Z1\n");
        assert_eq!(next.abs_z, 1.0);
    }

    #[test]
    fn unchanged_axes_are_suppressed() {
        let current = locked(10.0, 5.0, 0.0);
        let mut next = locked(12.0, 5.0, 0.0);
        next.move_mode = MoveMode::Linear;
        let line = emitted(&current, &mut next, &flat_one());
        assert_eq!(line, "G1 X12 Z1\n");
    }

    #[test]
    fn no_z_without_full_axis_lock() {
        let current = GcodeState::new();
        let mut next = GcodeState::new();
        next.move_mode = MoveMode::Rapid;
        next.pos = Vec3::new(3.0, 0.0, 0.0);
        next.abs_lock = AxisMask::X;
        let line = emitted(&current, &mut next, &flat_one());
        assert_eq!(line, "G0 X3\n");
    }

    #[test]
    fn inverted_surface_subtracts_commanded_z() {
        // Surface z = 0.01 * x.
        let coeffs = Coeffs::from_rows(&[vec![0.0], vec![0.01]]);
        let current = GcodeState::new();
        let mut next = locked(100.0, 0.0, 5.0);
        next.move_mode = MoveMode::Linear;

        let z = eval_point(&current, &mut next, &coeffs, false);
        assert!((z - 6.0).abs() < 1e-9);

        let z = eval_point(&current, &mut next, &coeffs, true);
        assert!((z + 4.0).abs() < 1e-9);
    }

    #[test]
    fn relative_z_is_delta_from_last_corrected() {
        let coeffs = Coeffs::from_rows(&[vec![0.0], vec![0.01]]);
        let mut current = locked(10.0, 0.0, 0.0);
        current.abs_z = 0.1;
        let mut next = locked(20.0, 0.0, 0.0);
        next.positioning_mode = PositioningMode::Relative;
        let z = eval_point(&current, &mut next, &coeffs, false);
        assert!((z - 0.1).abs() < 1e-9);
    }

    #[test]
    fn extrusion_rules() {
        let mut current = locked(0.0, 0.0, 0.0);
        let mut next = locked(4.0, 0.0, 0.0);
        next.move_mode = MoveMode::Linear;
        next.extruder_mode = ExtruderMode::Absolute;
        next.e = 2.5;
        current.e = 2.5;
        // Absolute and unchanged: no E word.
        let line = emitted(&current, &mut next, &flat_one());
        assert!(!line.contains('E'));

        next.e = 3.0;
        let line = emitted(&current, &mut next, &flat_one());
        assert!(line.contains(" E3"));

        next.extruder_mode = ExtruderMode::Relative;
        next.e = 0.0;
        let line = emitted(&current, &mut next, &flat_one());
        assert!(line.contains(" E0"));
    }

    #[test]
    fn arc_words_reemitted() {
        let current = locked(0.0, 0.0, 0.0);
        let mut next = locked(10.0, 10.0, 0.0);
        next.move_mode = MoveMode::ArcCw;
        next.arc_mode = ArcMode::CenterOffset;
        next.i = 5.0;
        next.j = 0.0;
        let mut out = Vec::new();
        construct_arc(&mut out, "\n", &current, &mut next, &flat_one(), false).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "G2 X10 Y10 Z1 I5 J0\n");

        let mut next = locked(10.0, 10.0, 0.0);
        next.move_mode = MoveMode::ArcCcw;
        next.arc_mode = ArcMode::Radius;
        next.r = 7.5;
        let mut out = Vec::new();
        construct_arc(&mut out, "\n", &current, &mut next, &flat_one(), false).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "G3 X10 Y10 Z1 R7.5\n");
    }

    #[test]
    fn extra_args_appended_verbatim() {
        let current = GcodeState::new();
        let mut next = locked(1.0, 2.0, 3.0);
        next.move_mode = MoveMode::Linear;
        next.extra_args.push_str(" F1500; perimeter");
        let line = emitted(&current, &mut next, &flat_one());
        assert_eq!(line, "G1 X1 Y2 Z4 F1500; perimeter\n");
    }
}
