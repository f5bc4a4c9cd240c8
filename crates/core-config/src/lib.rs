//! Job configuration loading and parsing (`gcleveler.toml`).
//!
//! Two sections: `[surface]` describes the polynomial fit (per-axis degrees
//! and where probe samples live), `[leveling]` carries the rewrite
//! parameters handed to the G-code pass (Z window, inversion, subdivision
//! thresholds). Every field has a default so a missing or partial file still
//! yields a usable configuration; a file that fails to parse falls back to
//! defaults with a warning rather than failing the run. Unknown fields are
//! ignored to allow forward evolution.

use anyhow::Result;
use serde::Deserialize;
use std::{fs, path::PathBuf};
use tracing::{info, warn};

#[derive(Debug, Deserialize, Clone)]
pub struct SurfaceConfig {
    /// Polynomial degree along X.
    #[serde(default = "SurfaceConfig::default_degree")]
    pub x_degree: usize,
    /// Polynomial degree along Y.
    #[serde(default = "SurfaceConfig::default_degree")]
    pub y_degree: usize,
    /// Probe sample file: whitespace-separated `x y z` triples, one per
    /// line, `#` comments allowed.
    #[serde(default)]
    pub probe_file: Option<PathBuf>,
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            x_degree: Self::default_degree(),
            y_degree: Self::default_degree(),
            probe_file: None,
        }
    }
}

impl SurfaceConfig {
    const fn default_degree() -> usize {
        2
    }

    /// Minimum probe count for a well-posed fit at these degrees.
    pub fn required_samples(&self) -> usize {
        (self.x_degree + 1) * (self.y_degree + 1)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LevelingConfig {
    #[serde(default)]
    pub min_z: f64,
    #[serde(default = "LevelingConfig::default_max_z")]
    pub max_z: f64,
    #[serde(default)]
    pub invert_z: bool,
    /// Straight moves longer than this get subdivided; 0 disables.
    #[serde(default)]
    pub max_line: f64,
    /// Arcs longer than this (along the arc) get subdivided; 0 disables.
    #[serde(default)]
    pub max_arc: f64,
}

impl Default for LevelingConfig {
    fn default() -> Self {
        Self {
            min_z: 0.0,
            max_z: Self::default_max_z(),
            invert_z: false,
            max_line: 0.0,
            max_arc: 0.0,
        }
    }
}

impl LevelingConfig {
    const fn default_max_z() -> f64 {
        100.0
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct ConfigFile {
    #[serde(default)]
    pub surface: SurfaceConfig,
    #[serde(default)]
    pub leveling: LevelingConfig,
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Original file string, when one was read.
    pub raw: Option<String>,
    /// Parsed (or default) data.
    pub file: ConfigFile,
}

/// Best-effort config path: working directory first, then the platform
/// config dir.
pub fn discover() -> PathBuf {
    let local = PathBuf::from("gcleveler.toml");
    if local.exists() {
        return local;
    }
    if let Some(dir) = dirs::config_dir() {
        return dir.join("gcleveler").join("gcleveler.toml");
    }
    PathBuf::from("gcleveler.toml")
}

pub fn load_from(path: Option<PathBuf>) -> Result<Config> {
    let path = path.unwrap_or_else(discover);
    if let Ok(content) = fs::read_to_string(&path) {
        match toml::from_str::<ConfigFile>(&content) {
            Ok(file) => {
                info!(
                    target: "config",
                    path = %path.display(),
                    x_degree = file.surface.x_degree,
                    y_degree = file.surface.y_degree,
                    "config_loaded"
                );
                Ok(Config {
                    raw: Some(content),
                    file,
                })
            }
            Err(e) => {
                warn!(
                    target: "config",
                    path = %path.display(),
                    error = %e,
                    "config_parse_failed_using_defaults"
                );
                Ok(Config::default())
            }
        }
    } else {
        Ok(Config::default())
    }
}
