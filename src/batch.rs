//! Parallel batch processing of run directories.
//!
//! Runs are independent until the final artifact, so the batch layer maps
//! them over Rayon's work-stealing pool with no shared mutable state: each
//! worker clones the `Pipeline` and produces a per-run result. Everything
//! order-sensitive happens afterwards, in a sequential post-pass over the
//! results in input order:
//!
//! - label ids are assigned first-seen over runs in input order, so the
//!   `LabelMap` is identical no matter how workers were scheduled;
//! - the global steps-per-cycle is the configured value when non-zero,
//!   otherwise the count established by the first run that produced one;
//!   cycles disagreeing with it are excluded in the post-pass.
//!
//! Per-run failures are collected by default (`ErrorMode::CollectErrors`)
//! so one corrupt run never discards a whole session's work; `FailFast`
//! aborts on the first failure for debugging.
//!
//! # Example
//!
//! ```ignore
//! use enose_dataprep::batch::{BatchConfig, BatchProcessor, ErrorMode};
//!
//! let batch_config = BatchConfig::new().with_threads(8);
//! let processor = BatchProcessor::new(pipeline, batch_config);
//! let batch = processor.process_feature_runs(&run_dirs)?;
//! println!("{} runs ok, {} failed", batch.runs.len(), batch.errors.len());
//! ```

use crate::cycles::ExclusionReason;
use crate::error::{PrepError, Result};
use crate::label::LabelMap;
use crate::pipeline::{Pipeline, RunCycles, RunWindows};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

// ============================================================================
// Configuration
// ============================================================================

/// How the batch reacts to a failing run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorMode {
    /// Log the failure with run identity, skip the run, continue (default).
    #[default]
    CollectErrors,

    /// Abort the whole batch on the first failing run.
    FailFast,
}

/// Batch-level configuration, separate from the per-run `PrepConfig`.
#[derive(Debug, Clone, Default)]
pub struct BatchConfig {
    /// Worker threads. `None` uses Rayon's default.
    pub num_threads: Option<usize>,

    pub error_mode: ErrorMode,
}

impl BatchConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the worker thread count.
    ///
    /// # Panics
    ///
    /// Panics if `threads` is 0.
    pub fn with_threads(mut self, threads: usize) -> Self {
        assert!(threads > 0, "thread count must be > 0");
        self.num_threads = Some(threads);
        self
    }

    pub fn with_error_mode(mut self, mode: ErrorMode) -> Self {
        self.error_mode = mode;
        self
    }

    /// Configured threads, or Rayon's default.
    pub fn effective_threads(&self) -> usize {
        self.num_threads.unwrap_or_else(rayon::current_num_threads)
    }
}

// ============================================================================
// Results
// ============================================================================

/// One failed run, with enough identity to locate it.
#[derive(Debug, Clone)]
pub struct RunError {
    pub run: String,
    pub path: PathBuf,
    pub error: String,
}

/// Windowed-feature results over a whole batch.
#[derive(Debug)]
pub struct FeatureBatch {
    /// Successful runs, in input order.
    pub runs: Vec<RunWindows>,

    /// Failed runs (`CollectErrors` mode only).
    pub errors: Vec<RunError>,

    pub elapsed: Duration,
    pub threads_used: usize,
}

impl FeatureBatch {
    pub fn total_windows(&self) -> usize {
        self.runs.iter().map(|r| r.windows.len()).sum()
    }

    pub fn all_successful(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Cycle-tensor results over a whole batch, labels reconciled.
#[derive(Debug)]
pub struct CycleBatch {
    /// Successful runs in input order, post-pass exclusions applied.
    pub runs: Vec<RunCycles>,

    /// Label ids assigned first-seen over runs in input order.
    pub label_map: LabelMap,

    /// The step count every kept cycle conforms to. 0 when no run produced
    /// a valid cycle.
    pub steps_per_cycle: usize,

    pub errors: Vec<RunError>,
    pub elapsed: Duration,
    pub threads_used: usize,
}

impl CycleBatch {
    pub fn total_cycles(&self) -> usize {
        self.runs.iter().map(|r| r.extraction.cycles.len()).sum()
    }

    pub fn all_successful(&self) -> bool {
        self.errors.is_empty()
    }
}

// ============================================================================
// Batch Processor
// ============================================================================

enum RunOutcome<T> {
    Ok(Box<T>),
    Err { path: PathBuf, error: PrepError },
}

/// Maps run directories over a local Rayon pool and reconciles the results.
pub struct BatchProcessor {
    pipeline: Pipeline,
    batch_config: BatchConfig,
}

impl BatchProcessor {
    pub fn new(pipeline: Pipeline, batch_config: BatchConfig) -> Self {
        Self {
            pipeline,
            batch_config,
        }
    }

    pub fn batch_config(&self) -> &BatchConfig {
        &self.batch_config
    }

    /// Process runs through the tabular path in parallel.
    pub fn process_feature_runs<P: AsRef<Path> + Sync>(&self, run_dirs: &[P]) -> Result<FeatureBatch> {
        let start = Instant::now();
        let threads_used = self.batch_config.effective_threads();

        let outcomes = self.map_runs(run_dirs, threads_used, |pipeline, dir| {
            pipeline.process_windows(dir)
        })?;

        let mut runs = Vec::new();
        let mut errors = Vec::new();
        for outcome in outcomes {
            match outcome {
                RunOutcome::Ok(run) => runs.push(*run),
                RunOutcome::Err { path, error } => {
                    self.record_error(path, error, &mut errors)?;
                }
            }
        }

        Ok(FeatureBatch {
            runs,
            errors,
            elapsed: start.elapsed(),
            threads_used,
        })
    }

    /// Process runs through the tensor path in parallel, then reconcile
    /// label ids and the global step count sequentially.
    pub fn process_cycle_runs<P: AsRef<Path> + Sync>(&self, run_dirs: &[P]) -> Result<CycleBatch> {
        let start = Instant::now();
        let threads_used = self.batch_config.effective_threads();
        let configured_steps = self.pipeline.config().expected_steps;

        // Workers infer locally when nothing is configured; the post-pass
        // below settles the global count.
        let outcomes = self.map_runs(run_dirs, threads_used, |pipeline, dir| {
            pipeline.process_cycles(dir, configured_steps)
        })?;

        let mut runs: Vec<RunCycles> = Vec::new();
        let mut errors = Vec::new();
        for outcome in outcomes {
            match outcome {
                RunOutcome::Ok(run) => runs.push(*run),
                RunOutcome::Err { path, error } => {
                    self.record_error(path, error, &mut errors)?;
                }
            }
        }

        // Sequential post-pass, input order: settle the global step count
        // and drop cycles from runs that inferred a different one.
        let steps_per_cycle = if configured_steps > 0 {
            configured_steps
        } else {
            runs.iter()
                .map(|r| r.extraction.steps_per_cycle)
                .find(|&s| s > 0)
                .unwrap_or(0)
        };
        for run in &mut runs {
            let local = run.extraction.steps_per_cycle;
            if local != 0 && local != steps_per_cycle {
                log::warn!(
                    "run {}: inferred {local} steps per cycle, batch established {steps_per_cycle}; excluding {} cycles",
                    run.run_id,
                    run.extraction.cycles.len()
                );
                // Dropped cycles stay accounted for in the run's report.
                let dropped = std::mem::take(&mut run.extraction.cycles);
                for cycle in &dropped {
                    run.extraction.report.excluded.push((
                        cycle.cycle_index,
                        ExclusionReason::StepCountMismatch {
                            found: local,
                            expected: steps_per_cycle,
                        },
                    ));
                }
                run.extraction.report.kept = 0;
            }
        }

        // Label ids, first-seen over runs in input order.
        let mut label_map = LabelMap::new();
        for run in &runs {
            if !run.extraction.cycles.is_empty() {
                label_map.get_or_insert(&run.label.target);
            }
        }

        Ok(CycleBatch {
            runs,
            label_map,
            steps_per_cycle,
            errors,
            elapsed: start.elapsed(),
            threads_used,
        })
    }

    /// Map `f` over the run directories on a local pool, preserving input
    /// order. A local pool is used so different processors can use
    /// different thread counts within one process.
    fn map_runs<P, T, F>(
        &self,
        run_dirs: &[P],
        threads: usize,
        f: F,
    ) -> Result<Vec<RunOutcome<T>>>
    where
        P: AsRef<Path> + Sync,
        T: Send,
        F: Fn(&Pipeline, &Path) -> Result<T> + Sync,
    {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .map_err(|e| PrepError::InvalidConfig(format!("cannot build thread pool: {e}")))?;

        let outcomes = pool.install(|| {
            run_dirs
                .par_iter()
                .map(|dir| {
                    let dir = dir.as_ref();
                    match f(&self.pipeline, dir) {
                        Ok(result) => RunOutcome::Ok(Box::new(result)),
                        Err(error) => RunOutcome::Err {
                            path: dir.to_path_buf(),
                            error,
                        },
                    }
                })
                .collect()
        });
        Ok(outcomes)
    }

    fn record_error(
        &self,
        path: PathBuf,
        error: PrepError,
        errors: &mut Vec<RunError>,
    ) -> Result<()> {
        if self.batch_config.error_mode == ErrorMode::FailFast {
            return Err(error);
        }
        let run = crate::ingest::run_id_of(&path);
        log::error!("run {run} failed: {error}");
        errors.push(RunError {
            run,
            path,
            error: error.to_string(),
        });
        Ok(())
    }
}
