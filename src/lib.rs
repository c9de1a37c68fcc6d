//! enose-dataprep
//!
//! Dataset preparation for gas-sensor (e-nose) time series: turns raw
//! heater-cycle sensor logs into model-ready training artifacts.
//!
//! # Overview
//!
//! The collector writes one directory per acquisition run: a row-oriented
//! `samples.csv` and a `metadata.json` record. This library ingests those
//! runs and produces two artifact families:
//!
//! - **Tabular**: gap-aware resampling, baseline correction, and
//!   sliding-window statistics over four channels — `features.csv` plus
//!   row-aligned `labels.csv` for classical models.
//! - **Tensor**: heater cycles grouped into fixed-shape `[N, steps,
//!   channels]` arrays in `sequences.npz` for convolutional models.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                       enose-dataprep                          │
//! ├───────────────────────────────────────────────────────────────┤
//! │  ingest/     - run discovery, CSV + metadata loading          │
//! │  label/      - hierarchical label parsing, id table           │
//! │  resample/   - warm-up trim, uniform grid, quality classes    │
//! │  baseline/   - per-run gas baseline correction                │
//! │  features/   - sliding-window channel statistics              │
//! │  cycles/     - heater-cycle grouping into tensors             │
//! │  streaming/  - incremental extraction for live feeds          │
//! │  pipeline/   - per-run stage orchestration                    │
//! │  batch/      - parallel multi-run processing                  │
//! │  export/     - CSV / JSON / NPZ artifact writing              │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use enose_dataprep::prelude::*;
//!
//! let config = PrepConfig::default().with_window(600, 60);
//! let pipeline = Pipeline::new(config.clone())?;
//! let processor = BatchProcessor::new(pipeline, BatchConfig::new().with_threads(8));
//!
//! let runs = discover_runs("data/runs");
//! let batch = processor.process_feature_runs(&runs)?;
//! ArtifactWriter::create("data/prepared")?.write_feature_dataset(&batch, &config)?;
//! ```

pub mod baseline;
pub mod batch;
pub mod config;
pub mod cycles;
pub mod error;
pub mod export;
pub mod features;
pub mod ingest;
pub mod label;
pub mod pipeline;
pub mod prelude;
pub mod resample;
pub mod streaming;

// Re-exports - Errors
pub use error::{PrepError, Result};

// Re-exports - Config
pub use config::PrepConfig;

// Re-exports - Ingest
pub use ingest::{discover_runs, load_run, RawSample, RunData, RunMetadata};

// Re-exports - Labels
pub use label::{LabelMap, LabelPath};

// Re-exports - Resampling
pub use resample::{drop_warmup, resample_uniform, QualityClass, ResampledPoint};

// Re-exports - Features
pub use features::{feature_columns, ChannelStats, WindowFeatures, NUM_FEATURES};

// Re-exports - Cycles
pub use cycles::{build_cycles, CycleExtraction, CycleSample, CHANNEL_NAMES};

// Re-exports - Streaming
pub use streaming::StreamingExtractor;

// Re-exports - Pipeline
pub use pipeline::{Pipeline, RunCycles, RunLabel, RunWindows};

// Re-exports - Batch
pub use batch::{BatchConfig, BatchProcessor, CycleBatch, ErrorMode, FeatureBatch};

// Re-exports - Export
pub use export::{ArtifactWriter, CycleSummary, FeatureSummary};
