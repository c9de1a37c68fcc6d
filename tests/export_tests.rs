//! End-to-end artifact tests: process synthetic runs and inspect what lands
//! on disk.

use enose_dataprep::batch::{BatchConfig, BatchProcessor};
use enose_dataprep::config::PrepConfig;
use enose_dataprep::error::PrepError;
use enose_dataprep::export::ArtifactWriter;
use enose_dataprep::features::feature_columns;
use enose_dataprep::pipeline::Pipeline;
use ndarray::{Array1, Array3};
use ndarray_npy::ReadNpyExt;
use std::fs;
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const SAMPLES_HEADER: &str = "timestamp_ms,cycle_index,step_index,commanded_heater_temp_C,heater_heat_stable,gas_resistance_ohm,temperature_C,humidity_pct,pressure_Pa";

fn write_run(dir: &Path, specimen: &str, sample_name: &str, rows: &[String]) {
    fs::create_dir_all(dir).unwrap();
    let metadata = format!(
        r#"{{"specimen_id": "{specimen}", "sample_name": "{sample_name}", "warmup_sec": 0}}"#
    );
    fs::write(dir.join("metadata.json"), metadata).unwrap();
    let mut file = fs::File::create(dir.join("samples.csv")).unwrap();
    writeln!(file, "{SAMPLES_HEADER}").unwrap();
    for row in rows {
        writeln!(file, "{row}").unwrap();
    }
}

/// Rows that serve both paths: cycle-indexed, 1 Hz, several minutes long.
fn session_rows(cycles: u32, steps: u32, gas_base: f64) -> Vec<String> {
    let mut rows = Vec::new();
    for c in 0..cycles {
        for s in 0..steps {
            let i = c * steps + s;
            let ts = i64::from(i) * 1000;
            let heater = 200.0 + f64::from(s) * 20.0;
            let gas = gas_base + f64::from(i) * 5.0;
            rows.push(format!(
                "{ts},{c},{s},{heater},True,{gas},25.0,40.0,101000.0"
            ));
        }
    }
    rows
}

fn build_root(tmp: &TempDir) -> (PathBuf, Vec<PathBuf>) {
    let root = tmp.path().join("data");
    write_run(
        &root.join("run_001"),
        "SPEC-1",
        "Meat > Chicken > Day1",
        &session_rows(20, 8, 50_000.0),
    );
    write_run(
        &root.join("run_002"),
        "SPEC-2",
        "Meat > Chicken > Day3",
        &session_rows(20, 8, 48_000.0),
    );
    let runs = enose_dataprep::discover_runs(&root);
    (root, runs)
}

fn config() -> PrepConfig {
    PrepConfig::default()
        .with_window(60, 30)
        .with_expected_steps(8)
}

// ============================================================================
// Tabular artifacts
// ============================================================================

#[test]
fn test_features_csv_header_is_the_fixed_contract() {
    let tmp = TempDir::new().unwrap();
    let (_root, runs) = build_root(&tmp);
    let out = tmp.path().join("out");

    let pipeline = Pipeline::new(config()).unwrap();
    let processor = BatchProcessor::new(pipeline, BatchConfig::new().with_threads(2));
    let batch = processor.process_feature_runs(&runs).unwrap();
    assert!(batch.all_successful());
    assert!(batch.total_windows() > 0);

    let writer = ArtifactWriter::create(&out).unwrap();
    writer.write_feature_dataset(&batch, &config()).unwrap();

    let features = fs::read_to_string(out.join("features.csv")).unwrap();
    let header = features.lines().next().unwrap();
    let mut expected = vec!["specimen_id".to_string(), "window_start_ms".to_string()];
    expected.extend(feature_columns());
    expected.push("quality_class".to_string());
    expected.push("label".to_string());
    assert_eq!(header, expected.join(","));
    // Rows are keyed and class-annotated without a join against labels.csv.
    assert!(features.lines().nth(1).unwrap().starts_with("SPEC-1,"));
    assert!(features.contains(",clean,Day1"));

    // Row alignment between the two tables.
    let labels = fs::read_to_string(out.join("labels.csv")).unwrap();
    assert_eq!(features.lines().count(), labels.lines().count());
    assert!(labels.contains("run_001,SPEC-1"));
    assert!(labels.contains("Day3"));

    // The exact parameters are persisted alongside.
    let params: PrepConfig =
        serde_json::from_str(&fs::read_to_string(out.join("params.json")).unwrap()).unwrap();
    assert_eq!(params.window_sec, 60);
    assert_eq!(params.expected_steps, 8);
}

// ============================================================================
// Tensor artifacts
// ============================================================================

#[test]
fn test_tensor_archive_shape_and_labels() {
    let tmp = TempDir::new().unwrap();
    let (_root, runs) = build_root(&tmp);
    let out = tmp.path().join("out");

    let pipeline = Pipeline::new(config()).unwrap();
    let processor = BatchProcessor::new(pipeline, BatchConfig::new().with_threads(2));
    let batch = processor.process_cycle_runs(&runs).unwrap();
    assert_eq!(batch.total_cycles(), 40);

    let writer = ArtifactWriter::create(&out).unwrap();
    let summary = writer.write_cycle_dataset(&batch, &config()).unwrap();
    assert_eq!(summary.n_cycles, 40);
    assert_eq!(summary.steps_per_cycle, 8);

    let file = fs::File::open(out.join("sequences.npz")).unwrap();
    let mut archive = zip::ZipArchive::new(file).unwrap();

    let mut buf = Vec::new();
    archive.by_name("signals.npy").unwrap().read_to_end(&mut buf).unwrap();
    let signals = Array3::<f32>::read_npy(Cursor::new(&buf)).unwrap();
    assert_eq!(signals.dim(), (40, 8, 5));
    assert!(signals.iter().all(|v| v.is_finite()));

    buf.clear();
    archive.by_name("labels.npy").unwrap().read_to_end(&mut buf).unwrap();
    let labels = Array1::<i64>::read_npy(Cursor::new(&buf)).unwrap();
    assert_eq!(labels.len(), 40);
    // First 20 cycles from run_001 ("Day1" = id 0), rest "Day3" = id 1.
    assert!(labels.iter().take(20).all(|&l| l == 0));
    assert!(labels.iter().skip(20).all(|&l| l == 1));

    buf.clear();
    archive.by_name("feature_names.npy").unwrap().read_to_end(&mut buf).unwrap();
    assert!(buf.starts_with(b"\x93NUMPY"));

    let map = fs::read_to_string(out.join("label_map.json")).unwrap();
    assert!(map.contains("\"Day1\": 0"));
    assert!(map.contains("\"Day3\": 1"));

    let index = fs::read_to_string(out.join("index.csv")).unwrap();
    // Header plus one row per cycle, aligned with the archive.
    assert_eq!(index.lines().count(), 41);
    // Provenance columns come straight from the run metadata.
    let header = index.lines().next().unwrap();
    assert_eq!(
        header,
        "run_id,specimen_id,cycle_index,start_ms,sample_name,storage,\
         profile_name,label_path,category,primary_label,label,label_id"
    );
    assert!(index.contains("Meat > Chicken > Day1"));

    let summary_json = fs::read_to_string(out.join("summary.json")).unwrap();
    assert!(summary_json.contains("\"feature_columns\""));
    assert!(summary_json.contains("\"expected_steps\""));
}

// ============================================================================
// Determinism and overwrite safety
// ============================================================================

#[test]
fn test_full_rerun_is_byte_identical() {
    let tmp = TempDir::new().unwrap();
    let (_root, runs) = build_root(&tmp);

    let prepare = |out: &Path| {
        let pipeline = Pipeline::new(config()).unwrap();
        let processor = BatchProcessor::new(pipeline, BatchConfig::new().with_threads(4));

        let features = processor.process_feature_runs(&runs).unwrap();
        let writer = ArtifactWriter::create(out.join("features")).unwrap();
        writer.write_feature_dataset(&features, &config()).unwrap();

        let cycles = processor.process_cycle_runs(&runs).unwrap();
        let writer = ArtifactWriter::create(out.join("tensors")).unwrap();
        writer.write_cycle_dataset(&cycles, &config()).unwrap();
    };

    let a = tmp.path().join("a");
    let b = tmp.path().join("b");
    prepare(&a);
    prepare(&b);

    let artifacts = [
        "features/features.csv",
        "features/labels.csv",
        "features/params.json",
        "features/summary.json",
        "tensors/sequences.npz",
        "tensors/index.csv",
        "tensors/label_map.json",
        "tensors/summary.json",
    ];
    for name in artifacts {
        let left = fs::read(a.join(name)).unwrap();
        let right = fs::read(b.join(name)).unwrap();
        assert_eq!(left, right, "{name} differs between reruns");
    }
}

#[test]
fn test_existing_artifacts_never_overwritten() {
    let tmp = TempDir::new().unwrap();
    let out = tmp.path().join("out");
    fs::create_dir_all(&out).unwrap();
    fs::write(out.join("features.csv"), "precious").unwrap();

    let err = ArtifactWriter::create(&out).unwrap_err();
    assert!(matches!(err, PrepError::OutputConflict(_)));
    assert_eq!(fs::read_to_string(out.join("features.csv")).unwrap(), "precious");
}
