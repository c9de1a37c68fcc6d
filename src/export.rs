//! Artifact writing for ML training.
//!
//! Two artifact sets, one per path:
//!
//! **Tabular** (`write_feature_dataset`):
//! - `features.csv`  — one row per window: key columns, the 28 fixed
//!   feature columns, `quality_class` and `label`
//! - `labels.csv`    — row-aligned provenance and labels for `features.csv`
//! - `params.json`   — the exact configuration used
//! - `summary.json`  — counts by quality and label, plus the configuration
//!
//! **Tensor** (`write_cycle_dataset`):
//! - `sequences.npz` — `signals` `[N, steps, channels]` f32, `labels` `[N]`
//!   i64, `feature_names` as a NumPy unicode array
//! - `index.csv`     — one row of provenance per cycle
//! - `label_map.json`— label string to id
//! - `summary.json`  — counts, plus the configuration
//!
//! Artifacts are deterministic: no wall-clock timestamps are embedded and
//! iteration orders are fixed, so re-running over unchanged inputs
//! reproduces every file byte for byte. The output directory must not
//! already contain files; existing data is never overwritten.

use crate::batch::{CycleBatch, FeatureBatch};
use crate::config::PrepConfig;
use crate::cycles::{CHANNEL_NAMES, NUM_CHANNELS};
use crate::error::{PrepError, Result};
use crate::features::feature_columns;
use ndarray::{Array1, Array3};
use ndarray_npy::WriteNpyExt;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Tensor archive file name.
pub const SEQUENCES_FILE: &str = "sequences.npz";

/// Summary of a written tabular artifact set.
#[derive(Debug, Clone, Serialize)]
pub struct FeatureSummary {
    pub runs_processed: usize,
    pub runs_failed: usize,
    pub n_windows: usize,
    pub n_features: usize,
    pub windows_by_quality: BTreeMap<String, usize>,
    pub windows_by_label: BTreeMap<String, usize>,
    /// The configuration the dataset was produced with.
    pub params: PrepConfig,
}

/// Summary of a written tensor artifact set.
#[derive(Debug, Clone, Serialize)]
pub struct CycleSummary {
    pub runs_processed: usize,
    pub runs_failed: usize,
    pub n_cycles: usize,
    pub cycles_excluded: usize,
    pub steps_per_cycle: usize,
    pub n_channels: usize,
    /// Channel order of the tensor's last axis.
    pub feature_columns: Vec<String>,
    pub cycles_by_label: BTreeMap<String, usize>,
    /// The configuration the dataset was produced with.
    pub params: PrepConfig,
}

/// Writes one artifact set into a fresh output directory.
#[derive(Debug)]
pub struct ArtifactWriter {
    out_dir: PathBuf,
}

impl ArtifactWriter {
    /// Claim an output directory.
    ///
    /// # Errors
    ///
    /// `OutputConflict` when the directory exists and is not empty.
    pub fn create<P: AsRef<Path>>(out_dir: P) -> Result<Self> {
        let out_dir = out_dir.as_ref().to_path_buf();
        if out_dir.exists() && fs::read_dir(&out_dir)?.next().is_some() {
            return Err(PrepError::OutputConflict(out_dir));
        }
        fs::create_dir_all(&out_dir)?;
        Ok(Self { out_dir })
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    /// Write the tabular artifact set.
    pub fn write_feature_dataset(
        &self,
        batch: &FeatureBatch,
        config: &PrepConfig,
    ) -> Result<FeatureSummary> {
        let columns = feature_columns();

        // Key columns, the fixed feature columns, then class columns, so the
        // file is self-describing without a join against labels.csv.
        let mut features = csv::Writer::from_path(self.out_dir.join("features.csv"))?;
        let mut header: Vec<&str> = vec!["specimen_id", "window_start_ms"];
        header.extend(columns.iter().map(String::as_str));
        header.extend(["quality_class", "label"]);
        features.write_record(&header)?;

        let mut labels = csv::Writer::from_path(self.out_dir.join("labels.csv"))?;
        labels.write_record([
            "run_id",
            "specimen_id",
            "window_start_ms",
            "window_end_ms",
            "quality",
            "category",
            "primary_label",
            "target_label",
        ])?;

        let mut by_quality: BTreeMap<String, usize> = BTreeMap::new();
        let mut by_label: BTreeMap<String, usize> = BTreeMap::new();
        let mut n_windows = 0usize;

        for run in &batch.runs {
            for window in &run.windows {
                let mut record: Vec<String> =
                    vec![run.specimen_id.clone(), window.start_ms.to_string()];
                record.extend(window.values.iter().map(|v| format!("{v:.6}")));
                record.push(window.quality.as_str().to_string());
                record.push(run.label.target.clone());
                features.write_record(&record)?;

                labels.write_record([
                    run.run_id.clone(),
                    run.specimen_id.clone(),
                    window.start_ms.to_string(),
                    window.end_ms.to_string(),
                    window.quality.as_str().to_string(),
                    run.label.path.category().to_string(),
                    run.label.path.primary_label().to_string(),
                    run.label.target.clone(),
                ])?;

                *by_quality.entry(window.quality.as_str().to_string()).or_default() += 1;
                *by_label.entry(run.label.target.clone()).or_default() += 1;
                n_windows += 1;
            }
        }
        features.flush()?;
        labels.flush()?;

        config.save_json(self.out_dir.join("params.json"))?;

        let summary = FeatureSummary {
            runs_processed: batch.runs.len(),
            runs_failed: batch.errors.len(),
            n_windows,
            n_features: columns.len(),
            windows_by_quality: by_quality,
            windows_by_label: by_label,
            params: config.clone(),
        };
        self.write_summary(&summary)?;

        log::info!(
            "wrote tabular artifacts to {}: {} windows from {} runs",
            self.out_dir.display(),
            summary.n_windows,
            summary.runs_processed
        );
        Ok(summary)
    }

    /// Write the tensor artifact set.
    pub fn write_cycle_dataset(
        &self,
        batch: &CycleBatch,
        config: &PrepConfig,
    ) -> Result<CycleSummary> {
        let cycles: Vec<_> = batch
            .runs
            .iter()
            .flat_map(|r| r.extraction.cycles.iter().map(move |c| (r, c)))
            .collect();

        let n = cycles.len();
        let steps = batch.steps_per_cycle;
        let mut signals = Array3::<f32>::zeros((n, steps, NUM_CHANNELS));
        let mut label_ids = Vec::with_capacity(n);
        for (i, (_, cycle)) in cycles.iter().enumerate() {
            signals
                .index_axis_mut(ndarray::Axis(0), i)
                .assign(&cycle.signal);
            // Every kept cycle's label was inserted during the batch
            // post-pass.
            let id = batch.label_map.id_of(&cycle.label).unwrap_or(-1);
            label_ids.push(id);
        }

        self.write_sequences_npz(&signals, &label_ids)?;

        let mut index = csv::Writer::from_path(self.out_dir.join("index.csv"))?;
        index.write_record([
            "run_id",
            "specimen_id",
            "cycle_index",
            "start_ms",
            "sample_name",
            "storage",
            "profile_name",
            "label_path",
            "category",
            "primary_label",
            "label",
            "label_id",
        ])?;
        for ((run, cycle), id) in cycles.iter().zip(&label_ids) {
            index.write_record([
                run.run_id.clone(),
                run.specimen_id.clone(),
                cycle.cycle_index.to_string(),
                cycle.start_ms.to_string(),
                run.metadata.sample_name.clone(),
                run.metadata.storage.clone(),
                run.metadata.profile_name.clone(),
                run.label.path.joined(),
                run.label.path.category().to_string(),
                run.label.path.primary_label().to_string(),
                cycle.label.clone(),
                id.to_string(),
            ])?;
        }
        index.flush()?;

        let file = File::create(self.out_dir.join("label_map.json"))?;
        serde_json::to_writer_pretty(file, &batch.label_map)?;

        config.save_json(self.out_dir.join("params.json"))?;

        let cycles_excluded = batch
            .runs
            .iter()
            .map(|r| r.extraction.report.excluded.len())
            .sum();
        let summary = CycleSummary {
            runs_processed: batch.runs.len(),
            runs_failed: batch.errors.len(),
            n_cycles: n,
            cycles_excluded,
            steps_per_cycle: steps,
            n_channels: NUM_CHANNELS,
            feature_columns: CHANNEL_NAMES.iter().map(|s| s.to_string()).collect(),
            cycles_by_label: batch.label_map.counts(&label_ids),
            params: config.clone(),
        };
        self.write_summary(&summary)?;

        log::info!(
            "wrote tensor artifacts to {}: {} cycles of {} steps",
            self.out_dir.display(),
            n,
            steps
        );
        Ok(summary)
    }

    /// Write `sequences.npz`: a zip archive of `.npy` entries, the layout
    /// NumPy's `savez` produces.
    fn write_sequences_npz(&self, signals: &Array3<f32>, label_ids: &[i64]) -> Result<()> {
        let file = File::create(self.out_dir.join(SEQUENCES_FILE))?;
        let mut archive = ZipWriter::new(file);
        // Fixed options keep the archive byte-stable across reruns.
        let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

        let mut buf = Vec::new();
        signals.write_npy(&mut buf)?;
        archive.start_file("signals.npy", options)?;
        archive.write_all(&buf)?;

        buf.clear();
        Array1::from_vec(label_ids.to_vec()).write_npy(&mut buf)?;
        archive.start_file("labels.npy", options)?;
        archive.write_all(&buf)?;

        buf.clear();
        write_unicode_npy(&mut buf, &CHANNEL_NAMES)?;
        archive.start_file("feature_names.npy", options)?;
        archive.write_all(&buf)?;

        archive.finish()?;
        Ok(())
    }

    fn write_summary<S: Serialize>(&self, summary: &S) -> Result<()> {
        let file = File::create(self.out_dir.join("summary.json"))?;
        serde_json::to_writer_pretty(file, summary)?;
        Ok(())
    }
}

/// Encode a string slice as a NumPy `<U` (UTF-32-LE, fixed-width) array.
///
/// `ndarray-npy` has no unicode dtype, but NumPy consumers expect name
/// arrays in this format, so the `.npy` framing is produced directly:
/// magic, version 1.0, a dict header padded to a 64-byte boundary, then
/// each string as `width` little-endian code points, zero padded.
fn write_unicode_npy<W: Write>(writer: &mut W, strings: &[&str]) -> Result<()> {
    let width = strings
        .iter()
        .map(|s| s.chars().count())
        .max()
        .unwrap_or(1)
        .max(1);

    let dict = format!(
        "{{'descr': '<U{width}', 'fortran_order': False, 'shape': ({},), }}",
        strings.len()
    );
    // magic(6) + version(2) + header_len(2) + dict + padding + '\n', padded
    // so the data section starts 64-byte aligned.
    let unpadded = 6 + 2 + 2 + dict.len() + 1;
    let padding = (64 - unpadded % 64) % 64;
    let header_len = dict.len() + padding + 1;

    writer.write_all(b"\x93NUMPY\x01\x00")?;
    writer.write_all(&(header_len as u16).to_le_bytes())?;
    writer.write_all(dict.as_bytes())?;
    writer.write_all(&vec![b' '; padding])?;
    writer.write_all(b"\n")?;

    for s in strings {
        let mut written = 0usize;
        for c in s.chars() {
            writer.write_all(&(c as u32).to_le_bytes())?;
            written += 1;
        }
        for _ in written..width {
            writer.write_all(&0u32.to_le_bytes())?;
        }
    }
    Ok(())
}
