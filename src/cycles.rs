//! Heater-cycle grouping into fixed-shape tensors.
//!
//! Cycle-oriented runs drive the heater through a repeating profile; each
//! row carries a `cycle_index` and a `step_index` within that cycle. The
//! tensor path groups rows into cycles and emits one `(steps, channels)`
//! matrix per structurally valid cycle, all with identical shape so they
//! stack into a single training tensor.
//!
//! Structural validation excludes a cycle, never repairs it:
//!
//! - step count differs from the established count → excluded;
//! - duplicate `step_index` within the cycle → excluded;
//! - any tracked channel missing or non-finite at any step → excluded.
//!
//! Cycles are never padded or truncated. A configured `expected_steps > 0`
//! is authoritative; otherwise the count is inferred from the first
//! structurally valid cycle.

use crate::error::Result;
use crate::ingest::RawSample;
use ndarray::Array2;
use std::collections::BTreeMap;

/// Tensor channel names, in channel-axis order.
pub const CHANNEL_NAMES: [&str; 5] = [
    "gas_resistance_ohm",
    "temperature_C",
    "humidity_pct",
    "pressure_Pa",
    "commanded_heater_temp_C",
];

/// Number of tensor channels.
pub const NUM_CHANNELS: usize = CHANNEL_NAMES.len();

/// One heater cycle, shaped `(steps, channels)`, with provenance.
#[derive(Debug, Clone)]
pub struct CycleSample {
    /// Run the cycle came from.
    pub run_id: String,
    pub cycle_index: u32,
    /// Timestamp of the cycle's first step.
    pub start_ms: i64,
    /// Signal matrix, rows in `step_index` order, columns per
    /// `CHANNEL_NAMES`.
    pub signal: Array2<f32>,
    /// Target label string; filled by the pipeline from run metadata.
    pub label: String,
}

/// Why a cycle was excluded from tensor output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExclusionReason {
    StepCountMismatch { found: usize, expected: usize },
    DuplicateStep { step_index: u32 },
    NonFiniteChannel { channel: &'static str, step_index: u32 },
}

impl std::fmt::Display for ExclusionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExclusionReason::StepCountMismatch { found, expected } => {
                write!(f, "has {found} steps, expected {expected}")
            }
            ExclusionReason::DuplicateStep { step_index } => {
                write!(f, "duplicate step_index {step_index}")
            }
            ExclusionReason::NonFiniteChannel { channel, step_index } => {
                write!(f, "missing or non-finite {channel} at step {step_index}")
            }
        }
    }
}

/// Per-run accounting of cycle extraction.
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    /// Cycles observed in the input.
    pub total: usize,
    /// Cycles that passed structural validation.
    pub kept: usize,
    /// Excluded cycles with their reasons, in `cycle_index` order.
    pub excluded: Vec<(u32, ExclusionReason)>,
    /// Rows without cycle or step indices, ignored entirely.
    pub unindexed_rows: usize,
}

/// Result of grouping one run's rows into cycles.
#[derive(Debug, Clone)]
pub struct CycleExtraction {
    /// Valid cycles in `cycle_index` order, labels not yet filled.
    pub cycles: Vec<CycleSample>,
    /// The step count the cycles conform to. 0 when no valid cycle exists.
    pub steps_per_cycle: usize,
    pub report: CycleReport,
}

/// Group one run's rows into fixed-shape cycles.
///
/// `expected_steps > 0` is authoritative; 0 means infer from the first
/// cycle whose structure is internally consistent. Rows lacking either
/// index are counted and skipped.
pub fn build_cycles(
    samples: &[RawSample],
    expected_steps: usize,
    run_id: &str,
) -> Result<CycleExtraction> {
    let mut report = CycleReport::default();

    // cycle_index -> step_index -> row. BTreeMaps keep both orderings
    // deterministic.
    let mut grouped: BTreeMap<u32, BTreeMap<u32, &RawSample>> = BTreeMap::new();
    let mut duplicates: BTreeMap<u32, u32> = BTreeMap::new();

    for sample in samples {
        let (Some(cycle), Some(step)) = (sample.cycle_index, sample.step_index) else {
            report.unindexed_rows += 1;
            continue;
        };
        let steps = grouped.entry(cycle).or_default();
        if steps.insert(step, sample).is_some() {
            duplicates.entry(cycle).or_insert(step);
        }
    }

    report.total = grouped.len();
    if report.unindexed_rows > 0 {
        log::debug!("run {run_id}: {} rows without cycle indices", report.unindexed_rows);
    }

    let mut steps_per_cycle = expected_steps;
    let mut cycles = Vec::new();

    for (cycle_index, steps) in &grouped {
        if let Some(&step) = duplicates.get(cycle_index) {
            exclude(
                &mut report,
                run_id,
                *cycle_index,
                ExclusionReason::DuplicateStep { step_index: step },
            );
            continue;
        }

        match materialize(steps) {
            Ok(signal) => {
                let found = signal.nrows();
                if steps_per_cycle == 0 {
                    steps_per_cycle = found;
                    log::info!("run {run_id}: inferred {found} steps per cycle");
                }
                if found != steps_per_cycle {
                    exclude(
                        &mut report,
                        run_id,
                        *cycle_index,
                        ExclusionReason::StepCountMismatch {
                            found,
                            expected: steps_per_cycle,
                        },
                    );
                    continue;
                }
                let start_ms = steps
                    .values()
                    .map(|s| s.timestamp_ms)
                    .min()
                    .unwrap_or_default();
                cycles.push(CycleSample {
                    run_id: run_id.to_string(),
                    cycle_index: *cycle_index,
                    start_ms,
                    signal,
                    label: String::new(),
                });
            }
            Err(reason) => {
                exclude(&mut report, run_id, *cycle_index, reason);
            }
        }
    }

    report.kept = cycles.len();
    Ok(CycleExtraction {
        cycles,
        steps_per_cycle,
        report,
    })
}

fn exclude(report: &mut CycleReport, run_id: &str, cycle_index: u32, reason: ExclusionReason) {
    log::warn!("run {run_id}: cycle {cycle_index} excluded: {reason}");
    report.excluded.push((cycle_index, reason));
}

/// Build the `(steps, channels)` matrix of one cycle, or report the first
/// missing or non-finite channel value.
fn materialize(
    steps: &BTreeMap<u32, &RawSample>,
) -> std::result::Result<Array2<f32>, ExclusionReason> {
    let mut signal = Array2::<f32>::zeros((steps.len(), NUM_CHANNELS));
    for (row, (&step_index, sample)) in steps.iter().enumerate() {
        let values = [
            sample.gas_resistance_ohm,
            sample.temperature_c,
            sample.humidity_pct,
            sample.pressure_pa,
            sample.commanded_heater_temp_c,
        ];
        for (col, value) in values.into_iter().enumerate() {
            match value {
                Some(v) if v.is_finite() => signal[(row, col)] = v as f32,
                _ => {
                    return Err(ExclusionReason::NonFiniteChannel {
                        channel: CHANNEL_NAMES[col],
                        step_index,
                    })
                }
            }
        }
    }
    Ok(signal)
}
