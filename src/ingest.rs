//! Run ingestion and validation.
//!
//! A *run* is one acquisition session: a directory containing a row-oriented
//! `samples.csv` produced by the collector and a `metadata.json` record.
//! Ingestion loads both, drops structurally invalid rows, and returns an
//! in-memory `RunData`. Raw inputs are never mutated.
//!
//! Row filtering:
//! - rows without a gas reading are always dropped (the primary channel is
//!   required);
//! - when `drop_unstable` is configured, rows whose `heater_heat_stable`
//!   flag is false or absent are dropped as well;
//! - surviving rows are sorted by timestamp.
//!
//! `MissingMetadata` and `EmptyRun` are per-run errors: batch callers log
//! them with run identity and continue.

use crate::config::PrepConfig;
use crate::error::{PrepError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// File name of the row-oriented samples log inside a run directory.
pub const SAMPLES_FILE: &str = "samples.csv";

/// File name of the metadata record inside a run directory.
pub const METADATA_FILE: &str = "metadata.json";

/// One sensor reading. Owned by the run that produced it; immutable once
/// read.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RawSample {
    /// Milliseconds since epoch. Monotonic-non-decreasing after ingest sort.
    pub timestamp_ms: i64,

    /// Heater cycle this row belongs to (cycle-oriented runs only).
    #[serde(default)]
    pub cycle_index: Option<u32>,

    /// Position within the heater cycle (cycle-oriented runs only).
    #[serde(default)]
    pub step_index: Option<u32>,

    /// Heater set-point for this step.
    #[serde(rename = "commanded_heater_temp_C", default)]
    pub commanded_heater_temp_c: Option<f64>,

    /// Whether the heater had reached its set-point when the row was read.
    #[serde(default, deserialize_with = "deserialize_loose_bool")]
    pub heater_heat_stable: Option<bool>,

    /// Primary gas-sensing channel. Rows without it are dropped.
    #[serde(rename = "gas_resistance_ohm", default)]
    pub gas_resistance_ohm: Option<f64>,

    #[serde(rename = "temperature_C", default)]
    pub temperature_c: Option<f64>,

    #[serde(default)]
    pub humidity_pct: Option<f64>,

    #[serde(rename = "pressure_Pa", default)]
    pub pressure_pa: Option<f64>,
}

impl RawSample {
    /// Gas reading, present and finite.
    pub fn gas(&self) -> Option<f64> {
        self.gas_resistance_ohm.filter(|v| v.is_finite())
    }
}

/// Accept the boolean spellings the collector has historically written:
/// `true`/`false`, Python-style `True`/`False`, `1`/`0`, and empty.
fn deserialize_loose_bool<'de, D>(deserializer: D) -> std::result::Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.and_then(|s| match s.trim() {
        "true" | "True" | "TRUE" | "1" => Some(true),
        "false" | "False" | "FALSE" | "0" => Some(false),
        _ => None,
    }))
}

/// One metadata record per run, written by the collector.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RunMetadata {
    /// Identifier of the physical specimen under the sensor.
    pub specimen_id: String,

    /// Hierarchical label string, e.g. `"Coffee > Dunkin > Hazelnut"`.
    #[serde(default)]
    pub sample_name: String,

    /// Storage condition of the specimen.
    #[serde(default)]
    pub storage: String,

    /// Heater profile the collector ran.
    #[serde(default)]
    pub profile_name: String,

    /// Seconds of sensor warm-up to trim from the start of the run.
    #[serde(default)]
    pub warmup_sec: u32,

    /// Explicit label override; takes precedence over the parsed
    /// `sample_name` hierarchy when present.
    #[serde(default)]
    pub freshness_label: Option<String>,

    #[serde(default)]
    pub notes: String,

    /// Collector-side creation time, when recorded.
    #[serde(default)]
    pub created_utc: Option<DateTime<Utc>>,
}

/// One run, loaded and validated: metadata plus its filtered sample rows.
#[derive(Debug, Clone)]
pub struct RunData {
    /// Run directory the data came from.
    pub run_dir: PathBuf,

    /// Short run identity (directory name) used in logs and errors.
    pub run_id: String,

    pub metadata: RunMetadata,

    /// Rows surviving validation, sorted by `timestamp_ms`.
    pub samples: Vec<RawSample>,
}

/// Recursively discover run directories under `root`.
///
/// A directory qualifies when it contains both `samples.csv` and
/// `metadata.json`. Results are sorted by path so batch input order is
/// stable across invocations.
pub fn discover_runs<P: AsRef<Path>>(root: P) -> Vec<PathBuf> {
    let mut runs = Vec::new();
    collect_runs(root.as_ref(), &mut runs);
    runs.sort();
    runs
}

fn collect_runs(dir: &Path, runs: &mut Vec<PathBuf>) {
    if !dir.is_dir() {
        return;
    }
    if dir.join(SAMPLES_FILE).is_file() && dir.join(METADATA_FILE).is_file() {
        runs.push(dir.to_path_buf());
        return;
    }
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_runs(&path, runs);
        }
    }
}

/// Short run identity derived from the run directory name.
pub fn run_id_of(run_dir: &Path) -> String {
    run_dir
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("unknown")
        .to_string()
}

/// Load and validate one run directory.
///
/// # Errors
///
/// `MissingMetadata` when `metadata.json` is absent, unparseable, or has an
/// empty `specimen_id`; `EmptyRun` when no valid rows remain after
/// filtering.
pub fn load_run(run_dir: &Path, config: &PrepConfig) -> Result<RunData> {
    let run_id = run_id_of(run_dir);
    let metadata = load_metadata(run_dir, &run_id)?;
    let samples = load_samples(run_dir, &run_id, config)?;
    Ok(RunData {
        run_dir: run_dir.to_path_buf(),
        run_id,
        metadata,
        samples,
    })
}

fn load_metadata(run_dir: &Path, run_id: &str) -> Result<RunMetadata> {
    let path = run_dir.join(METADATA_FILE);
    let contents = fs::read_to_string(&path).map_err(|e| PrepError::MissingMetadata {
        run: run_id.to_string(),
        reason: format!("cannot read {}: {e}", path.display()),
    })?;
    let metadata: RunMetadata =
        serde_json::from_str(&contents).map_err(|e| PrepError::MissingMetadata {
            run: run_id.to_string(),
            reason: format!("invalid metadata: {e}"),
        })?;
    if metadata.specimen_id.trim().is_empty() {
        return Err(PrepError::MissingMetadata {
            run: run_id.to_string(),
            reason: "specimen_id is empty".to_string(),
        });
    }
    Ok(metadata)
}

fn load_samples(run_dir: &Path, run_id: &str, config: &PrepConfig) -> Result<Vec<RawSample>> {
    let path = run_dir.join(SAMPLES_FILE);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .from_path(&path)?;

    let mut samples: Vec<RawSample> = Vec::new();
    let mut dropped_no_gas = 0usize;
    let mut dropped_unstable = 0usize;

    for record in reader.deserialize::<RawSample>() {
        let sample = record?;
        if sample.gas().is_none() {
            dropped_no_gas += 1;
            continue;
        }
        if config.drop_unstable && sample.heater_heat_stable != Some(true) {
            dropped_unstable += 1;
            continue;
        }
        samples.push(sample);
    }

    if dropped_no_gas > 0 {
        log::warn!("run {run_id}: dropped {dropped_no_gas} rows without gas reading");
    }
    if dropped_unstable > 0 {
        log::debug!("run {run_id}: dropped {dropped_unstable} heater-unstable rows");
    }

    if samples.is_empty() {
        return Err(PrepError::EmptyRun {
            run: run_id.to_string(),
        });
    }

    samples.sort_by_key(|s| s.timestamp_ms);
    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    pub(crate) const SAMPLES_HEADER: &str = "timestamp_ms,cycle_index,step_index,commanded_heater_temp_C,heater_heat_stable,gas_resistance_ohm,temperature_C,humidity_pct,pressure_Pa";

    fn write_run(dir: &Path, metadata: &str, rows: &[&str]) {
        fs::create_dir_all(dir).unwrap();
        fs::write(dir.join(METADATA_FILE), metadata).unwrap();
        let mut file = fs::File::create(dir.join(SAMPLES_FILE)).unwrap();
        writeln!(file, "{SAMPLES_HEADER}").unwrap();
        for row in rows {
            writeln!(file, "{row}").unwrap();
        }
    }

    fn minimal_metadata() -> &'static str {
        r#"{"specimen_id": "SPEC-1", "sample_name": "Meat > Chicken > Day3", "warmup_sec": 0}"#
    }

    #[test]
    fn test_discover_runs_nested_and_sorted() {
        let tmp = TempDir::new().unwrap();
        write_run(
            &tmp.path().join("2024-05-02/spec-b/run_001"),
            minimal_metadata(),
            &["1000,,,,,50000.0,25.0,40.0,101000.0"],
        );
        write_run(
            &tmp.path().join("2024-05-01/spec-a/run_001"),
            minimal_metadata(),
            &["1000,,,,,50000.0,25.0,40.0,101000.0"],
        );
        // A directory without metadata.json is not a run.
        fs::create_dir_all(tmp.path().join("2024-05-03/incomplete")).unwrap();
        fs::write(
            tmp.path().join("2024-05-03/incomplete").join(SAMPLES_FILE),
            "x",
        )
        .unwrap();

        let runs = discover_runs(tmp.path());
        assert_eq!(runs.len(), 2);
        assert!(runs[0].ends_with("2024-05-01/spec-a/run_001"));
        assert!(runs[1].ends_with("2024-05-02/spec-b/run_001"));
    }

    #[test]
    fn test_load_run_drops_rows_without_gas() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("run_001");
        write_run(
            &dir,
            minimal_metadata(),
            &[
                "1000,,,,,50000.0,25.0,40.0,101000.0",
                "2000,,,,,,25.0,40.0,101000.0",
                "3000,,,,,51000.0,25.1,40.2,101000.0",
            ],
        );

        let run = load_run(&dir, &PrepConfig::default()).unwrap();
        assert_eq!(run.samples.len(), 2);
        assert_eq!(run.samples[0].timestamp_ms, 1000);
        assert_eq!(run.samples[1].timestamp_ms, 3000);
        assert_eq!(run.metadata.specimen_id, "SPEC-1");
        assert_eq!(run.run_id, "run_001");
    }

    #[test]
    fn test_load_run_sorts_by_timestamp() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("run_001");
        write_run(
            &dir,
            minimal_metadata(),
            &[
                "3000,,,,,51000.0,25.0,40.0,101000.0",
                "1000,,,,,50000.0,25.0,40.0,101000.0",
            ],
        );

        let run = load_run(&dir, &PrepConfig::default()).unwrap();
        assert_eq!(run.samples[0].timestamp_ms, 1000);
        assert_eq!(run.samples[1].timestamp_ms, 3000);
    }

    #[test]
    fn test_drop_unstable_rows() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("run_001");
        write_run(
            &dir,
            minimal_metadata(),
            &[
                "1000,0,0,200.0,True,50000.0,25.0,40.0,101000.0",
                "2000,0,1,250.0,False,51000.0,25.0,40.0,101000.0",
                "3000,0,2,300.0,,52000.0,25.0,40.0,101000.0",
            ],
        );

        let config = PrepConfig::default().with_drop_unstable(true);
        let run = load_run(&dir, &config).unwrap();
        assert_eq!(run.samples.len(), 1);
        assert_eq!(run.samples[0].timestamp_ms, 1000);

        // Without the flag all three rows survive.
        let run = load_run(&dir, &PrepConfig::default()).unwrap();
        assert_eq!(run.samples.len(), 3);
    }

    #[test]
    fn test_missing_metadata_is_per_run_error() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("run_001");
        fs::create_dir_all(&dir).unwrap();
        let mut file = fs::File::create(dir.join(SAMPLES_FILE)).unwrap();
        writeln!(file, "{SAMPLES_HEADER}").unwrap();
        writeln!(file, "1000,,,,,50000.0,25.0,40.0,101000.0").unwrap();

        let err = load_run(&dir, &PrepConfig::default()).unwrap_err();
        assert!(matches!(err, PrepError::MissingMetadata { .. }));
        assert!(err.is_per_run());
    }

    #[test]
    fn test_empty_specimen_id_rejected() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("run_001");
        write_run(
            &dir,
            r#"{"specimen_id": "  ", "sample_name": "X"}"#,
            &["1000,,,,,50000.0,25.0,40.0,101000.0"],
        );

        let err = load_run(&dir, &PrepConfig::default()).unwrap_err();
        assert!(matches!(err, PrepError::MissingMetadata { .. }));
    }

    #[test]
    fn test_all_rows_filtered_is_empty_run() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("run_001");
        write_run(
            &dir,
            minimal_metadata(),
            &["1000,,,,,,25.0,40.0,101000.0"],
        );

        let err = load_run(&dir, &PrepConfig::default()).unwrap_err();
        assert!(matches!(err, PrepError::EmptyRun { .. }));
    }
}
