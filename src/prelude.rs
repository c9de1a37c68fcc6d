//! Prelude module for convenient imports.
//!
//! Re-exports the types most invocations need.
//!
//! # Usage
//!
//! ```ignore
//! use enose_dataprep::prelude::*;
//!
//! let config = PrepConfig::default();
//! let pipeline = Pipeline::new(config)?;
//! let windows = pipeline.process_windows(run_dir)?;
//! ```

// ============================================================================
// Core Pipeline
// ============================================================================

pub use crate::config::PrepConfig;
pub use crate::error::{PrepError, Result};
pub use crate::pipeline::{Pipeline, RunCycles, RunLabel, RunWindows};

// ============================================================================
// Ingest
// ============================================================================

pub use crate::ingest::{discover_runs, load_run, RawSample, RunData, RunMetadata};

// ============================================================================
// Stages
// ============================================================================

pub use crate::baseline::baseline_correct;
pub use crate::cycles::{build_cycles, CycleExtraction, CycleSample, CHANNEL_NAMES, NUM_CHANNELS};
pub use crate::features::{
    extract_windows, feature_columns, ChannelStats, WindowFeatures, NUM_FEATURES,
};
pub use crate::label::{LabelMap, LabelPath};
pub use crate::resample::{
    drop_warmup, resample_uniform, worst_quality, QualityClass, ResampledPoint,
};
pub use crate::streaming::StreamingExtractor;

// ============================================================================
// Batch Processing
// ============================================================================

pub use crate::batch::{
    BatchConfig, BatchProcessor, CycleBatch, ErrorMode, FeatureBatch, RunError,
};

// ============================================================================
// Export
// ============================================================================

pub use crate::export::{ArtifactWriter, CycleSummary, FeatureSummary};
