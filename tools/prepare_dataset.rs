//! Dataset Preparation Tool
//!
//! Turns a tree of raw run directories into model-ready training artifacts.
//!
//! # Output
//!
//! - `features` mode: `features.csv`, `labels.csv`, `params.json`,
//!   `summary.json`
//! - `tensors` mode: `sequences.npz`, `index.csv`, `label_map.json`,
//!   `params.json`, `summary.json`
//! - `both` mode: the two sets under `<out>/features/` and `<out>/tensors/`
//!
//! # Usage
//!
//! ```bash
//! # Tabular features with explicit parameters
//! cargo run --release --bin prepare_dataset -- \
//!     --data-root data/runs --out data/prepared --mode features \
//!     --window-sec 600 --stride-sec 60
//!
//! # Cycle tensors from a TOML config
//! cargo run --release --bin prepare_dataset -- \
//!     --data-root data/runs --out data/prepared --mode tensors \
//!     --config configs/experiment.toml
//!
//! # Generate a config to edit
//! cargo run --release --bin prepare_dataset -- --generate-config prep.toml
//! ```

use enose_dataprep::batch::{BatchConfig, BatchProcessor, ErrorMode};
use enose_dataprep::config::PrepConfig;
use enose_dataprep::export::ArtifactWriter;
use enose_dataprep::ingest::discover_runs;
use enose_dataprep::pipeline::Pipeline;
use std::path::PathBuf;
use std::process;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Features,
    Tensors,
    Both,
}

struct CliArgs {
    data_root: PathBuf,
    out: PathBuf,
    mode: Mode,
    config: PrepConfig,
    threads: Option<usize>,
    fail_fast: bool,
}

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        print_usage(&args[0]);
        process::exit(1);
    }
    if args[1] == "--help" || args[1] == "-h" {
        print_usage(&args[0]);
        return;
    }
    if args[1] == "--generate-config" {
        let Some(path) = args.get(2) else {
            eprintln!("Error: --generate-config requires a path argument");
            process::exit(1);
        };
        generate_sample_config(path);
        return;
    }

    let cli = match parse_args(&args[1..]) {
        Ok(cli) => cli,
        Err(msg) => {
            eprintln!("Error: {msg}");
            print_usage(&args[0]);
            process::exit(1);
        }
    };

    if let Err(e) = run(&cli) {
        eprintln!("❌ Preparation failed: {e}");
        process::exit(1);
    }
}

fn print_usage(program: &str) {
    eprintln!(
        r#"
Dataset Preparation Tool

Usage:
    {program} --data-root <dir> --out <dir> [options]
    {program} --generate-config <path.toml>
    {program} --help

Required:
    --data-root <dir>       Root directory scanned recursively for runs
    --out <dir>             Output directory (must be empty or absent)

Options:
    --mode <m>              features | tensors | both   [default: features]
    --config <path.toml>    Load parameters from a TOML file
    --window-sec <n>        Sliding-window duration     [default: 60]
    --stride-sec <n>        Window advance              [default: 10]
    --baseline-sec <n>      Baseline reference window   [default: 30]
    --resample-hz <f>       Uniform grid frequency      [default: 1.0]
    --max-gap-sec <f>       Largest interpolatable gap  [default: 3.0]
    --expected-steps <n>    Heater steps per cycle, 0 = infer [default: 0]
    --drop-unstable         Drop rows before heater stabilization
    --strict-labels         Fail runs without a usable label
    --threads <n>           Worker threads              [default: all cores]
    --fail-fast             Abort on the first failing run

Command-line parameters override values loaded via --config.
"#
    );
}

fn generate_sample_config(path: &str) {
    let config = PrepConfig::default();
    match config.save_toml(path) {
        Ok(()) => {
            println!("✅ Generated sample config: {path}");
            println!("\nEdit the parameters, then run:");
            println!("    prepare_dataset --data-root <dir> --out <dir> --config {path}");
        }
        Err(e) => {
            eprintln!("Error generating config: {e}");
            process::exit(1);
        }
    }
}

fn parse_args(args: &[String]) -> Result<CliArgs, String> {
    let mut data_root: Option<PathBuf> = None;
    let mut out: Option<PathBuf> = None;
    let mut mode = Mode::Features;
    let mut config = PrepConfig::default();
    let mut threads = None;
    let mut fail_fast = false;

    // Overrides are applied after an optional --config load, so collect
    // them first.
    let mut overrides: Vec<(String, String)> = Vec::new();

    let mut i = 0;
    while i < args.len() {
        let flag = args[i].as_str();
        let value = |i: &mut usize| -> Result<String, String> {
            *i += 1;
            args.get(*i)
                .cloned()
                .ok_or_else(|| format!("{flag} requires a value"))
        };
        match flag {
            "--data-root" => data_root = Some(PathBuf::from(value(&mut i)?)),
            "--out" => out = Some(PathBuf::from(value(&mut i)?)),
            "--mode" => {
                mode = match value(&mut i)?.as_str() {
                    "features" => Mode::Features,
                    "tensors" => Mode::Tensors,
                    "both" => Mode::Both,
                    other => return Err(format!("unknown mode '{other}'")),
                };
            }
            "--config" => {
                let path = value(&mut i)?;
                config = PrepConfig::load_toml(&path).map_err(|e| e.to_string())?;
            }
            "--window-sec" | "--stride-sec" | "--baseline-sec" | "--resample-hz"
            | "--max-gap-sec" | "--expected-steps" => {
                overrides.push((flag.to_string(), value(&mut i)?));
            }
            "--drop-unstable" => overrides.push((flag.to_string(), String::new())),
            "--strict-labels" => overrides.push((flag.to_string(), String::new())),
            "--threads" => {
                threads = Some(
                    value(&mut i)?
                        .parse::<usize>()
                        .map_err(|_| "--threads expects an integer".to_string())?,
                );
            }
            "--fail-fast" => fail_fast = true,
            other => return Err(format!("unknown argument '{other}'")),
        }
        i += 1;
    }

    for (flag, raw) in overrides {
        apply_override(&mut config, &flag, &raw)?;
    }

    config.validate().map_err(|e| e.to_string())?;

    Ok(CliArgs {
        data_root: data_root.ok_or("--data-root is required")?,
        out: out.ok_or("--out is required")?,
        mode,
        config,
        threads,
        fail_fast,
    })
}

fn apply_override(config: &mut PrepConfig, flag: &str, raw: &str) -> Result<(), String> {
    let int = |raw: &str| {
        raw.parse::<u32>()
            .map_err(|_| format!("{flag} expects an integer"))
    };
    let float = |raw: &str| {
        raw.parse::<f64>()
            .map_err(|_| format!("{flag} expects a number"))
    };
    match flag {
        "--window-sec" => config.window_sec = int(raw)?,
        "--stride-sec" => config.stride_sec = int(raw)?,
        "--baseline-sec" => config.baseline_sec = int(raw)?,
        "--resample-hz" => config.resample_hz = float(raw)?,
        "--max-gap-sec" => config.max_gap_sec = float(raw)?,
        "--expected-steps" => {
            config.expected_steps = raw
                .parse::<usize>()
                .map_err(|_| format!("{flag} expects an integer"))?;
        }
        "--drop-unstable" => config.drop_unstable = true,
        "--strict-labels" => config.strict_labels = true,
        _ => unreachable!("unhandled override flag {flag}"),
    }
    Ok(())
}

fn run(cli: &CliArgs) -> Result<(), Box<dyn std::error::Error>> {
    let runs = discover_runs(&cli.data_root);
    if runs.is_empty() {
        return Err(format!("no runs found under {}", cli.data_root.display()).into());
    }
    println!("📁 Discovered {} runs under {}", runs.len(), cli.data_root.display());

    let pipeline = Pipeline::new(cli.config.clone())?;
    let mut batch_config = BatchConfig::new().with_error_mode(if cli.fail_fast {
        ErrorMode::FailFast
    } else {
        ErrorMode::CollectErrors
    });
    if let Some(threads) = cli.threads {
        batch_config = batch_config.with_threads(threads);
    }
    println!("🚀 Processing with {} threads", batch_config.effective_threads());
    let processor = BatchProcessor::new(pipeline, batch_config);

    let (features_out, tensors_out) = match cli.mode {
        Mode::Features => (Some(cli.out.clone()), None),
        Mode::Tensors => (None, Some(cli.out.clone())),
        Mode::Both => (
            Some(cli.out.join("features")),
            Some(cli.out.join("tensors")),
        ),
    };

    if let Some(out) = features_out {
        let batch = processor.process_feature_runs(&runs)?;
        report_failures(&batch.errors);
        let writer = ArtifactWriter::create(&out)?;
        let summary = writer.write_feature_dataset(&batch, &cli.config)?;
        println!(
            "✅ Tabular: {} windows from {} runs -> {}",
            summary.n_windows,
            summary.runs_processed,
            out.display()
        );
    }

    if let Some(out) = tensors_out {
        let batch = processor.process_cycle_runs(&runs)?;
        report_failures(&batch.errors);
        let writer = ArtifactWriter::create(&out)?;
        let summary = writer.write_cycle_dataset(&batch, &cli.config)?;
        println!(
            "✅ Tensor: {} cycles of {} steps ({} labels) -> {}",
            summary.n_cycles,
            summary.steps_per_cycle,
            summary.cycles_by_label.len(),
            out.display()
        );
    }

    Ok(())
}

fn report_failures(errors: &[enose_dataprep::batch::RunError]) {
    if errors.is_empty() {
        return;
    }
    eprintln!("⚠️  {} runs failed:", errors.len());
    for err in errors {
        eprintln!("    ❌ {}: {}", err.path.display(), err.error);
    }
}
