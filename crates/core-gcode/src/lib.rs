//! Streaming G-code rewriter that bends motion onto a measured surface.
//!
//! Input G-code assumes a flat work surface; a fitted polynomial model
//! (from `core-surface`) says where the surface actually is. This crate
//! parses motion commands one line at a time, tracks machine state across
//! the stream, rewrites every motion Z so the tool follows the commanded
//! shape relative to the measured surface, and splits long straight or
//! circular moves where the surface curves significantly between their
//! endpoints.
//!
//! Processing is single-threaded per job and strictly line-ordered. The
//! coefficient matrix is read-only and may be shared between jobs;
//! everything mutable lives in the per-job [`Rewriter`].
//!
//! Malformed motion is preferred over aborted jobs: unparseable words are
//! ignored or passed through, impossible arc geometry is logged and left
//! unsplit, and the job reports its output path even when individual moves
//! could not be rewritten.

mod arc;
mod emit;
mod job;
mod parse;
mod state;
mod subdivide;

pub use job::{LevelError, Rewriter, level_file, output_path};
pub use state::{
    ArcMode, AxisMask, ExtruderMode, GcodeState, MoveMode, PositioningMode, WorkspacePlane,
};

/// Job parameters delivered by the host.
///
/// `min_z`/`max_z` describe the machine's Z window; they are carried for the
/// host's benefit but no clamp is applied yet.
/// TODO: clamp emitted Z into [min_z, max_z] once out-of-window handling
/// (skip vs. pin) is settled.
#[derive(Debug, Clone)]
pub struct LevelOptions {
    pub min_z: f64,
    pub max_z: f64,
    /// Subtract the commanded Z from the surface height instead of adding.
    pub invert_z: bool,
    /// Straight moves longer than this are candidates for subdivision;
    /// zero or negative disables.
    pub max_line: f64,
    /// Arc counterpart of `max_line`, measured along the arc.
    pub max_arc: f64,
    /// Version string stamped into the output header.
    pub version: String,
}

impl Default for LevelOptions {
    fn default() -> Self {
        Self {
            min_z: 0.0,
            max_z: 100.0,
            invert_z: false,
            max_line: 0.0,
            max_arc: 0.0,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
