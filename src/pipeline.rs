//! Per-run orchestration of the preparation stages.
//!
//! `Pipeline` wires the stages together for a single run:
//!
//! ```text
//! load_run -> drop_warmup -+-> resample_uniform -> baseline_correct -> extract_windows
//!                          |
//!                          +-> build_cycles
//! ```
//!
//! The tabular path (windows) works on the uniform grid; the tensor path
//! (cycles) groups the raw rows directly, since heater steps are identified
//! by index rather than by wall-clock position. Both paths share warm-up
//! trimming and label resolution.
//!
//! A `Pipeline` is immutable after construction and holds no per-run state,
//! so one instance serves any number of runs concurrently.

use crate::baseline::baseline_correct;
use crate::config::PrepConfig;
use crate::cycles::{build_cycles, CycleExtraction};
use crate::error::{PrepError, Result};
use crate::features::{extract_windows, WindowFeatures};
use crate::ingest::{load_run, RunData, RunMetadata};
use crate::label::LabelPath;
use crate::resample::{drop_warmup, resample_uniform};
use std::path::Path;

/// Fallback label for runs with no usable label in non-strict mode.
pub const UNLABELED: &str = "unlabeled";

/// Resolved labeling of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunLabel {
    /// Parsed `sample_name` hierarchy (possibly empty).
    pub path: LabelPath,
    /// The training target: `freshness_label` override when present, else
    /// the hierarchy's last component, else `"unlabeled"`.
    pub target: String,
}

/// Windowed features of one run, with provenance.
#[derive(Debug, Clone)]
pub struct RunWindows {
    pub run_id: String,
    pub specimen_id: String,
    pub label: RunLabel,
    /// Baseline value subtracted from the gas channel.
    pub baseline: f64,
    pub windows: Vec<WindowFeatures>,
}

/// Cycle tensors of one run, labels filled.
#[derive(Debug, Clone)]
pub struct RunCycles {
    pub run_id: String,
    pub specimen_id: String,
    pub label: RunLabel,
    /// The run's metadata, carried for per-cycle provenance in `index.csv`.
    pub metadata: RunMetadata,
    pub extraction: CycleExtraction,
}

/// Stage orchestrator for one configuration.
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PrepConfig,
}

impl Pipeline {
    /// Create a pipeline. The configuration is validated here, once.
    pub fn new(config: PrepConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PrepConfig {
        &self.config
    }

    /// Load a run directory and produce its windowed features.
    pub fn process_windows(&self, run_dir: &Path) -> Result<RunWindows> {
        let run = load_run(run_dir, &self.config)?;
        self.windows_from(&run)
    }

    /// Windowed features from an already-loaded run.
    pub fn windows_from(&self, run: &RunData) -> Result<RunWindows> {
        let label = self.resolve_label(&run.run_id, &run.metadata)?;
        let retained = drop_warmup(&run.samples, run.metadata.warmup_sec);

        let mut grid = resample_uniform(retained, self.config.resample_hz, self.config.max_gap_sec);
        let baseline = baseline_correct(&mut grid, self.config.baseline_sec, &run.run_id)?;
        let windows = extract_windows(&grid, &self.config);

        log::info!(
            "run {}: {} grid points, {} windows, label '{}'",
            run.run_id,
            grid.len(),
            windows.len(),
            label.target
        );

        Ok(RunWindows {
            run_id: run.run_id.clone(),
            specimen_id: run.metadata.specimen_id.clone(),
            label,
            baseline,
            windows,
        })
    }

    /// Load a run directory and produce its cycle tensors.
    ///
    /// `expected_steps` overrides the configured value so batch callers can
    /// thread a globally established step count through; pass
    /// `config.expected_steps` for standalone use.
    pub fn process_cycles(&self, run_dir: &Path, expected_steps: usize) -> Result<RunCycles> {
        let run = load_run(run_dir, &self.config)?;
        self.cycles_from(&run, expected_steps)
    }

    /// Cycle tensors from an already-loaded run.
    pub fn cycles_from(&self, run: &RunData, expected_steps: usize) -> Result<RunCycles> {
        let label = self.resolve_label(&run.run_id, &run.metadata)?;
        let retained = drop_warmup(&run.samples, run.metadata.warmup_sec);

        let mut extraction = build_cycles(retained, expected_steps, &run.run_id)?;
        for cycle in &mut extraction.cycles {
            cycle.label = label.target.clone();
        }

        log::info!(
            "run {}: {} of {} cycles kept, label '{}'",
            run.run_id,
            extraction.report.kept,
            extraction.report.total,
            label.target
        );

        Ok(RunCycles {
            run_id: run.run_id.clone(),
            specimen_id: run.metadata.specimen_id.clone(),
            label,
            metadata: run.metadata.clone(),
            extraction,
        })
    }

    /// Resolve a run's label from its metadata.
    ///
    /// Precedence: `freshness_label` override, then the last component of
    /// the parsed `sample_name` hierarchy. A run with neither is labeled
    /// `"unlabeled"`, or rejected with `AmbiguousLabel` in strict mode.
    pub fn resolve_label(&self, run_id: &str, metadata: &RunMetadata) -> Result<RunLabel> {
        let path = LabelPath::parse(&metadata.sample_name);

        let override_label = metadata
            .freshness_label
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());

        let target = match override_label {
            Some(label) => label.to_string(),
            None if !path.is_empty() => path.target_label().to_string(),
            None => {
                if self.config.strict_labels {
                    return Err(PrepError::AmbiguousLabel {
                        run: run_id.to_string(),
                    });
                }
                log::warn!("run {run_id}: no usable label, using '{UNLABELED}'");
                UNLABELED.to_string()
            }
        };

        Ok(RunLabel { path, target })
    }
}
