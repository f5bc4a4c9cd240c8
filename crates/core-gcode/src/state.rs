//! Machine motion state carried across a stream of commands.
//!
//! Two [`GcodeState`] holders exist per job: `current` (the last emitted
//! endpoint) and `next` (the endpoint being parsed). After each line the
//! pair rolls forward: `current` takes `next`'s value and `next` is reset
//! for the following line. Modal settings (positioning mode, extruder mode,
//! workspace plane, move mode, the absolute-axis lock, frame offset and
//! absolute position) carry forward through the reset; per-line data
//! (trailing args, arc words, the interpolation flag) does not.

use bitflags::bitflags;
use core_geom::Vec3;
use core_surface::Coeffs;

bitflags! {
    /// Axes that have been committed in absolute terms at least once.
    /// Corrected Z values are only emitted once all three are known.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct AxisMask: u8 {
        const X = 1;
        const Y = 2;
        const Z = 4;
    }
}

/// Whether coordinates name the world frame or a delta from the current
/// position. Programs start absolute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PositioningMode {
    Relative,
    #[default]
    Absolute,
}

/// Extruder-axis addressing. Disabled until the first E-bearing word, which
/// switches it to absolute unless M83 said otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExtruderMode {
    #[default]
    Disabled,
    Relative,
    Absolute,
}

/// How the pending arc was specified, if at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArcMode {
    #[default]
    Disabled,
    /// `R` word: chord plus radius.
    Radius,
    /// `I`/`J` words: offset from start point to center.
    CenterOffset,
}

/// Workspace plane selected by G17/G18/G19. Parsed and tracked; motion
/// generation only supports XY.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkspacePlane {
    #[default]
    Xy,
    Zx,
    Yz,
}

/// Motion mode of the pending move, mirroring the G-word digit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MoveMode {
    #[default]
    Rapid,
    Linear,
    ArcCw,
    ArcCcw,
    Dwell,
}

impl MoveMode {
    pub fn from_word(num: i64) -> Option<Self> {
        match num {
            0 => Some(Self::Rapid),
            1 => Some(Self::Linear),
            2 => Some(Self::ArcCw),
            3 => Some(Self::ArcCcw),
            4 => Some(Self::Dwell),
            _ => None,
        }
    }

    /// Digit re-emitted as the `G` word.
    pub fn gcode_digit(self) -> u8 {
        match self {
            Self::Rapid => 0,
            Self::Linear => 1,
            Self::ArcCw => 2,
            Self::ArcCcw => 3,
            Self::Dwell => 4,
        }
    }

    /// Rapid and linear feed share the straight-line emission path;
    /// everything else goes through the arc-shaped path.
    pub fn is_linear(self) -> bool {
        matches!(self, Self::Rapid | Self::Linear)
    }
}

/// One endpoint of the motion stream plus the modal context it was parsed in.
#[derive(Debug, Clone, Default)]
pub struct GcodeState {
    /// The pending line describes motion that needs Z rewriting.
    pub interp_needed: bool,
    pub abs_lock: AxisMask,
    /// Last commanded position in the program's frame (absolute or delta).
    pub pos: Vec3,
    /// Last known absolute position; meaningful once `abs_lock` is full.
    pub abs_pos: Vec3,
    /// Offset between program frame and absolute frame (set by G92).
    pub pos_offset: Vec3,
    pub arc_center: Vec3,
    /// Last emitted absolute, surface-corrected Z.
    pub abs_z: f64,
    pub i: f64,
    pub j: f64,
    pub r: f64,
    /// Extrusion coordinate.
    pub e: f64,
    pub arc_mode: ArcMode,
    /// Signed swept angle; negative is clockwise.
    pub arc_angle: f64,
    /// Verbatim trailing tokens (comments, unrecognized words).
    pub extra_args: String,
    pub move_mode: MoveMode,
    pub workspace_plane: WorkspacePlane,
    pub positioning_mode: PositioningMode,
    pub extruder_mode: ExtruderMode,
    /// Cached surface height at `abs_pos`, refreshed once per endpoint.
    pub model_height: f64,
}

impl GcodeState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Roll over for the next line: clear per-line data, keep modal context.
    /// Relative positioning zeroes the pending delta; a relative extruder
    /// zeroes the pending extrusion.
    pub fn reset(&mut self) {
        self.extra_args.clear();
        self.arc_mode = ArcMode::Disabled;
        if self.positioning_mode == PositioningMode::Relative {
            self.pos.reset();
        }
        self.i = 0.0;
        self.j = 0.0;
        self.r = 0.0;
        self.arc_angle = 0.0;
        self.arc_center.reset();
        if self.extruder_mode == ExtruderMode::Relative {
            self.e = 0.0;
        }
        self.interp_needed = false;
    }

    /// Refresh the cached surface height at the current absolute position.
    pub fn compute_model_height(&mut self, coeffs: &Coeffs) {
        self.model_height = coeffs.eval(self.abs_pos.x, self.abs_pos.y);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_job_start() {
        let s = GcodeState::new();
        assert_eq!(s.positioning_mode, PositioningMode::Absolute);
        assert_eq!(s.extruder_mode, ExtruderMode::Disabled);
        assert_eq!(s.arc_mode, ArcMode::Disabled);
        assert!(s.abs_lock.is_empty());
        assert!(!s.interp_needed);
    }

    #[test]
    fn reset_clears_per_line_data_only() {
        let mut s = GcodeState::new();
        s.pos = Vec3::new(1.0, 2.0, 3.0);
        s.abs_pos = Vec3::new(1.0, 2.0, 3.0);
        s.pos_offset = Vec3::new(0.5, 0.0, 0.0);
        s.abs_lock = AxisMask::all();
        s.i = 4.0;
        s.r = 2.0;
        s.arc_mode = ArcMode::CenterOffset;
        s.arc_angle = 1.5;
        s.extra_args.push_str(" F1500");
        s.interp_needed = true;
        s.move_mode = MoveMode::Linear;

        s.reset();
        assert_eq!(s.arc_mode, ArcMode::Disabled);
        assert_eq!((s.i, s.j, s.r, s.arc_angle), (0.0, 0.0, 0.0, 0.0));
        assert!(s.extra_args.is_empty());
        assert!(!s.interp_needed);
        // Modal context and position survive in absolute mode.
        assert_eq!(s.pos, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(s.abs_pos, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(s.pos_offset, Vec3::new(0.5, 0.0, 0.0));
        assert_eq!(s.abs_lock, AxisMask::all());
        assert_eq!(s.move_mode, MoveMode::Linear);
    }

    #[test]
    fn reset_zeroes_relative_deltas() {
        let mut s = GcodeState::new();
        s.positioning_mode = PositioningMode::Relative;
        s.extruder_mode = ExtruderMode::Relative;
        s.pos = Vec3::new(5.0, 5.0, 5.0);
        s.e = 1.25;
        s.reset();
        assert_eq!(s.pos, Vec3::ZERO);
        assert_eq!(s.e, 0.0);
    }
}
