//! gcleveler entrypoint: fit a surface model from probe samples, then
//! rewrite a G-code file against it.

use anyhow::{Context, Result, bail};
use clap::Parser;
use core_gcode::{LevelOptions, level_file};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Once;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;

/// CLI arguments.
#[derive(Parser, Debug)]
#[command(name = "gcleveler", version, about = "Bed-surface G-code leveling")]
struct Args {
    /// G-code file to rewrite. The output lands next to it with a
    /// `-GCL.gcode` suffix.
    pub path: PathBuf,
    /// Probe sample file (`x y z` per line) overriding the configured
    /// `probe_file`.
    #[arg(long)]
    pub probe: Option<PathBuf>,
    /// Optional configuration file path (overrides discovery of
    /// `gcleveler.toml`).
    #[arg(long = "config")]
    pub config: Option<PathBuf>,
    /// Fit degree along X (overrides configuration).
    #[arg(long)]
    pub x_degree: Option<usize>,
    /// Fit degree along Y (overrides configuration).
    #[arg(long)]
    pub y_degree: Option<usize>,
}

fn configure_logging() -> Option<WorkerGuard> {
    let log_dir = Path::new(".");
    let log_path = log_dir.join("gcleveler.log");
    if log_path.exists() {
        let _ = fs::remove_file(&log_path);
    }

    let file_appender = tracing_appender::rolling::never(log_dir, "gcleveler.log");
    let (nb_writer, guard) = tracing_appender::non_blocking(file_appender);
    match tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(nb_writer)
        .with_ansi(false)
        .try_init()
    {
        Ok(_) => Some(guard),
        Err(_err) => {
            // Global subscriber already installed; drop the guard so the
            // writer shuts down.
            None
        }
    }
}

fn install_panic_hook() {
    static HOOK: Once = Once::new();
    HOOK.call_once(|| {
        let default_panic = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            tracing::error!(target: "runtime.panic", ?info, "panic");
            default_panic(info);
        }));
    });
}

/// Read probe samples: one `x y z` triple per line, whitespace separated.
/// Blank lines and `#` comments are skipped.
fn read_probe_samples(path: &Path) -> Result<Vec<[f64; 3]>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("cannot read probe file {}", path.display()))?;

    let mut samples = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        let line = line.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() != 3 {
            bail!(
                "probe file {}:{}: expected 3 values, found {}",
                path.display(),
                idx + 1,
                fields.len()
            );
        }
        let mut sample = [0.0; 3];
        for (slot, field) in sample.iter_mut().zip(&fields) {
            *slot = field.parse().with_context(|| {
                format!("probe file {}:{}: bad number {field:?}", path.display(), idx + 1)
            })?;
        }
        samples.push(sample);
    }
    Ok(samples)
}

fn main() -> Result<()> {
    let _log_guard = configure_logging();
    install_panic_hook();

    let args = Args::parse();
    info!(target: "runtime", path = %args.path.display(), "startup");

    let config = core_config::load_from(args.config.clone())?;
    let surface = &config.file.surface;
    let x_degree = args.x_degree.unwrap_or(surface.x_degree);
    let y_degree = args.y_degree.unwrap_or(surface.y_degree);

    let probe_path = args
        .probe
        .clone()
        .or_else(|| surface.probe_file.clone());
    let Some(probe_path) = probe_path else {
        bail!("no probe samples: pass --probe or set surface.probe_file in gcleveler.toml");
    };

    let samples = read_probe_samples(&probe_path)?;
    let required = (x_degree + 1) * (y_degree + 1);
    if samples.len() < required {
        warn!(
            target: "runtime",
            samples = samples.len(),
            required,
            "underdetermined_fit"
        );
    }

    let coeffs = core_surface::fit(&samples, x_degree, y_degree);
    info!(
        target: "runtime",
        samples = samples.len(),
        x_degree,
        y_degree,
        "surface_fitted"
    );

    let leveling = &config.file.leveling;
    let opts = LevelOptions {
        min_z: leveling.min_z,
        max_z: leveling.max_z,
        invert_z: leveling.invert_z,
        max_line: leveling.max_line,
        max_arc: leveling.max_arc,
        version: env!("CARGO_PKG_VERSION").to_string(),
    };

    let opath = level_file(&args.path, &coeffs, &opts)
        .with_context(|| format!("leveling {} failed", args.path.display()))?;
    info!(target: "runtime", path = %opath.display(), "job_complete");
    println!("{}", opath.display());
    Ok(())
}
