//! File-level rewrite job: output-path derivation, line-ending detection,
//! the current/next state loop, and recursive subdivision of long moves.

use crate::LevelOptions;
use crate::emit::{construct_arc, construct_line};
use crate::parse::{Disposition, parse_line};
use crate::state::GcodeState;
use crate::subdivide::{arc_length, worst_arc_offender, worst_line_offender};
use core_surface::Coeffs;
use regex::Regex;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use thiserror::Error;
use tracing::{debug, info};

/// Job-level failures. Per-line problems never abort a job; only the file
/// boundary can fail it.
#[derive(Debug, Error)]
pub enum LevelError {
    #[error("cannot open input file {path:?}: {source}")]
    OpenInput {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot create output file {path:?}: {source}")]
    CreateOutput {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("write to output file {path:?} failed: {source}")]
    WriteOutput {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

static GCODE_EXT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\.g(co)*(de)*").expect("static pattern"));

/// Derive the output path: the first `.g`/`.gco`/`.gcode`-style extension
/// occurrence becomes `-GCL.gcode`.
pub fn output_path(input: &Path) -> PathBuf {
    let s = input.to_string_lossy();
    PathBuf::from(GCODE_EXT.replace(&s, "-GCL.gcode").into_owned())
}

/// Streaming rewriter over one input. Holds the read-only coefficient matrix
/// and job parameters; owns the output sink for the duration of the job.
pub struct Rewriter<'a, W: Write> {
    coeffs: &'a Coeffs,
    opts: &'a LevelOptions,
    out: W,
    line_end: &'static str,
}

impl<'a, W: Write> Rewriter<'a, W> {
    pub fn new(coeffs: &'a Coeffs, opts: &'a LevelOptions, out: W) -> Self {
        Self {
            coeffs,
            opts,
            out,
            line_end: "\n",
        }
    }

    /// Process the whole input stream: detect the line ending from the first
    /// line, emit the header, then rewrite line by line.
    pub fn rewrite<R: BufRead>(&mut self, mut input: R) -> io::Result<()> {
        let mut current = GcodeState::new();
        let mut next = GcodeState::new();

        let mut line = String::new();
        let mut got = read_trimmed(&mut input, &mut line)?;

        // CRLF input drives CRLF output; detection looks at the first line.
        if line.ends_with('\r') {
            self.line_end = "\r\n";
        }

        write!(
            self.out,
            "; Processed by OctoPrint-GcodeLeveling {}{}{}",
            self.opts.version, self.line_end, self.line_end
        )?;

        while got {
            let stripped = line.strip_suffix('\r').unwrap_or(&line);
            self.process_line(stripped, &mut current, &mut next)?;
            line.clear();
            got = read_trimmed(&mut input, &mut line)?;
        }
        self.out.flush()
    }

    fn process_line(
        &mut self,
        line: &str,
        current: &mut GcodeState,
        next: &mut GcodeState,
    ) -> io::Result<()> {
        if parse_line(line, current, next) == Disposition::PassThrough {
            write!(self.out, "{}{}", line, self.line_end)?;
        }
        next.compute_model_height(self.coeffs);
        self.interpolate_state(current, next)?;

        *current = next.clone();
        next.reset();
        Ok(())
    }

    /// Emit the motion described by `next`, subdividing recursively while a
    /// long segment still hides a worthwhile split.
    fn interpolate_state(&mut self, current: &GcodeState, next: &mut GcodeState) -> io::Result<()> {
        if !next.interp_needed {
            return Ok(());
        }

        let both_locked = current.abs_lock.is_all() && next.abs_lock.is_all();

        if next.move_mode.is_linear() {
            if both_locked
                && self.opts.max_line > 0.0
                && current.abs_pos.distance(next.abs_pos) > self.opts.max_line
            {
                if let Some(mut worst) = worst_line_offender(current, next, self.coeffs) {
                    debug!(
                        target: "level.subdivide",
                        x = worst.abs_pos.x,
                        y = worst.abs_pos.y,
                        "line_split"
                    );
                    worst.compute_model_height(self.coeffs);
                    self.interpolate_state(current, &mut worst)?;
                    self.interpolate_state(&worst, next)?;
                    return Ok(());
                }
            }
            construct_line(
                &mut self.out,
                self.line_end,
                current,
                next,
                self.coeffs,
                self.opts.invert_z,
            )
        } else {
            if both_locked && self.opts.max_arc > 0.0 {
                let len = arc_length(current, next);
                if matches!(len, Some(len) if len > self.opts.max_arc) {
                    if let Some(mut worst) = worst_arc_offender(current, next, self.coeffs) {
                        debug!(
                            target: "level.subdivide",
                            x = worst.abs_pos.x,
                            y = worst.abs_pos.y,
                            sweep = worst.arc_angle,
                            "arc_split"
                        );
                        worst.compute_model_height(self.coeffs);
                        self.interpolate_state(current, &mut worst)?;
                        self.interpolate_state(&worst, next)?;
                        return Ok(());
                    }
                }
            }
            construct_arc(
                &mut self.out,
                self.line_end,
                current,
                next,
                self.coeffs,
                self.opts.invert_z,
            )
        }
    }
}

/// Read one line without its trailing newline (the carriage return, if any,
/// is left for the caller). Returns false at end of input.
fn read_trimmed<R: BufRead>(input: &mut R, line: &mut String) -> io::Result<bool> {
    let n = input.read_line(line)?;
    if n == 0 {
        return Ok(false);
    }
    if line.ends_with('\n') {
        line.pop();
    }
    Ok(true)
}

/// Rewrite `input` into its derived sibling output file and return that path.
pub fn level_file(
    input: &Path,
    coeffs: &Coeffs,
    opts: &LevelOptions,
) -> Result<PathBuf, LevelError> {
    let infile = File::open(input).map_err(|source| LevelError::OpenInput {
        path: input.to_path_buf(),
        source,
    })?;

    let opath = output_path(input);
    let outfile = File::create(&opath).map_err(|source| LevelError::CreateOutput {
        path: opath.clone(),
        source,
    })?;

    info!(target: "level", path = %opath.display(), "output_file");

    let mut rewriter = Rewriter::new(coeffs, opts, BufWriter::new(outfile));
    rewriter
        .rewrite(BufReader::new(infile))
        .map_err(|source| LevelError::WriteOutput {
            path: opath.clone(),
            source,
        })?;

    debug!(target: "level", "job_done");
    Ok(opath)
}
