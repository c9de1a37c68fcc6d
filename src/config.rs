//! Pipeline configuration management.
//!
//! A single `PrepConfig` enumerates every recognized parameter with its
//! default, replacing the loose parameter bags of the original collector
//! tooling. The configuration is validated exactly once, at entry, before any
//! run is processed; components never re-validate ad hoc.
//!
//! # Example
//!
//! ```ignore
//! use enose_dataprep::config::PrepConfig;
//!
//! let config = PrepConfig::default()
//!     .with_window(600, 60)
//!     .with_resample_hz(1.0);
//! config.validate()?;
//! config.save_toml("configs/experiment1.toml")?;
//! ```

use crate::error::{PrepError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Complete configuration for one pipeline invocation.
///
/// Serializable to TOML or JSON for experiment reproducibility; the exact
/// values used are also written into every output's provenance record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PrepConfig {
    /// Sliding-window duration in seconds (tabular path).
    pub window_sec: u32,

    /// Window advance in seconds (tabular path).
    pub stride_sec: u32,

    /// Duration of the baseline reference window in seconds, measured from
    /// the first resampled point after warm-up trim.
    pub baseline_sec: u32,

    /// Uniform output grid frequency in Hz.
    pub resample_hz: f64,

    /// Largest bracketing-observation distance, in seconds, that still
    /// permits interpolation. A distance exactly equal to this bound is not
    /// a gap.
    pub max_gap_sec: f64,

    /// Heater steps per cycle (tensor path). 0 means infer from the first
    /// structurally valid cycle.
    pub expected_steps: usize,

    /// Drop rows where `heater_heat_stable` is false or absent.
    pub drop_unstable: bool,

    /// Treat runs with an empty hierarchical label as errors instead of
    /// labeling them `"unlabeled"`.
    pub strict_labels: bool,
}

impl Default for PrepConfig {
    fn default() -> Self {
        Self {
            window_sec: 60,
            stride_sec: 10,
            baseline_sec: 30,
            resample_hz: 1.0,
            max_gap_sec: 3.0,
            expected_steps: 0,
            drop_unstable: false,
            strict_labels: false,
        }
    }
}

impl PrepConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set window duration and stride, both in seconds.
    pub fn with_window(mut self, window_sec: u32, stride_sec: u32) -> Self {
        self.window_sec = window_sec;
        self.stride_sec = stride_sec;
        self
    }

    /// Set baseline reference window duration in seconds.
    pub fn with_baseline_sec(mut self, baseline_sec: u32) -> Self {
        self.baseline_sec = baseline_sec;
        self
    }

    /// Set the uniform grid frequency in Hz.
    pub fn with_resample_hz(mut self, hz: f64) -> Self {
        self.resample_hz = hz;
        self
    }

    /// Set the maximum interpolatable gap in seconds.
    pub fn with_max_gap_sec(mut self, max_gap_sec: f64) -> Self {
        self.max_gap_sec = max_gap_sec;
        self
    }

    /// Set an authoritative step count for the tensor path (0 = infer).
    pub fn with_expected_steps(mut self, steps: usize) -> Self {
        self.expected_steps = steps;
        self
    }

    /// Drop rows recorded before the heater reached a stable temperature.
    pub fn with_drop_unstable(mut self, drop: bool) -> Self {
        self.drop_unstable = drop;
        self
    }

    /// Fail runs whose hierarchical label is empty.
    pub fn with_strict_labels(mut self, strict: bool) -> Self {
        self.strict_labels = strict;
        self
    }

    /// Resampled-grid spacing in milliseconds.
    pub fn grid_step_ms(&self) -> i64 {
        (1000.0 / self.resample_hz).round() as i64
    }

    /// Window length in resampled samples.
    pub fn window_samples(&self) -> usize {
        (f64::from(self.window_sec) * self.resample_hz).round() as usize
    }

    /// Window advance in resampled samples.
    pub fn stride_samples(&self) -> usize {
        (f64::from(self.stride_sec) * self.resample_hz).round() as usize
    }

    /// Validate the configuration.
    ///
    /// Misconfiguration is fatal: callers must reject the whole invocation
    /// before touching any run.
    pub fn validate(&self) -> Result<()> {
        if self.window_sec == 0 {
            return Err(PrepError::InvalidConfig("window_sec must be > 0".into()));
        }
        if self.stride_sec == 0 {
            return Err(PrepError::InvalidConfig("stride_sec must be > 0".into()));
        }
        if self.baseline_sec == 0 {
            return Err(PrepError::InvalidConfig("baseline_sec must be > 0".into()));
        }
        if !self.resample_hz.is_finite() || self.resample_hz <= 0.0 {
            return Err(PrepError::InvalidConfig("resample_hz must be > 0".into()));
        }
        if !self.max_gap_sec.is_finite() || self.max_gap_sec <= 0.0 {
            return Err(PrepError::InvalidConfig("max_gap_sec must be > 0".into()));
        }
        if self.window_samples() == 0 {
            return Err(PrepError::InvalidConfig(
                "window_sec * resample_hz rounds to zero samples".into(),
            ));
        }
        if self.stride_samples() == 0 {
            return Err(PrepError::InvalidConfig(
                "stride_sec * resample_hz rounds to zero samples".into(),
            ));
        }
        Ok(())
    }

    /// Save configuration to a TOML file.
    pub fn save_toml<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let toml_string = toml::to_string_pretty(self)?;
        fs::write(path, toml_string)?;
        Ok(())
    }

    /// Load and validate configuration from a TOML file.
    pub fn load_toml<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: PrepConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a JSON file.
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = fs::File::create(path)?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }

    /// Load and validate configuration from a JSON file.
    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: PrepConfig = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }
}
