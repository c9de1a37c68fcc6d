//! Error types for the preparation pipeline.
//!
//! Errors fall into three tiers:
//!
//! 1. **Fatal before any work**: invalid parameters (`InvalidConfig`) and
//!    output-destination conflicts (`OutputConflict`). These are rejected
//!    before a single run is touched.
//! 2. **Per-run**: `MissingMetadata`, `EmptyRun`, `InsufficientBaseline`,
//!    `AmbiguousLabel`. Batch processing logs these with run identity and
//!    continues with the remaining runs.
//! 3. **Per-cycle**: `InconsistentCycle` describes a structural mismatch that
//!    excludes one cycle from tensor output. It never aborts a run; the
//!    variant exists so exclusions can be reported uniformly.

use std::path::PathBuf;
use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, PrepError>;

/// All errors produced by the preparation pipeline.
#[derive(Debug, Error)]
pub enum PrepError {
    /// Metadata record is absent, unparseable, or missing `specimen_id`.
    #[error("run {run}: missing or invalid metadata: {reason}")]
    MissingMetadata { run: String, reason: String },

    /// No valid rows remain after filtering.
    #[error("run {run}: no valid rows after filtering")]
    EmptyRun { run: String },

    /// The baseline window contains no resampled points.
    #[error("run {run}: baseline window of {baseline_sec}s contains no data")]
    InsufficientBaseline { run: String, baseline_sec: u32 },

    /// A cycle's structure does not match the established step count.
    #[error("cycle {cycle_index}: {reason}")]
    InconsistentCycle { cycle_index: u32, reason: String },

    /// The run's hierarchical label is empty or malformed (strict mode only).
    #[error("run {run}: empty or malformed sample_name")]
    AmbiguousLabel { run: String },

    /// Parameter-level misconfiguration. Fatal before any run is processed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Output destination already exists and is non-empty.
    #[error("output destination {0} exists and is not empty; refusing to overwrite")]
    OutputConflict(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("array write error: {0}")]
    NpyWrite(String),

    #[error("array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

impl PrepError {
    /// True for errors that skip one run without aborting the batch.
    pub fn is_per_run(&self) -> bool {
        matches!(
            self,
            PrepError::MissingMetadata { .. }
                | PrepError::EmptyRun { .. }
                | PrepError::InsufficientBaseline { .. }
                | PrepError::AmbiguousLabel { .. }
        )
    }
}

impl From<ndarray_npy::WriteNpyError> for PrepError {
    fn from(e: ndarray_npy::WriteNpyError) -> Self {
        PrepError::NpyWrite(e.to_string())
    }
}
