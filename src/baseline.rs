//! Baseline correction of the gas channel.
//!
//! Gas resistance drifts between sessions: the same specimen can read at a
//! different absolute level depending on sensor history and ambient
//! conditions. Subtracting a per-run baseline turns the channel into a
//! relative response, comparable across runs.
//!
//! The baseline is the mean gas resistance over the first `baseline_sec`
//! seconds of the resampled grid, measured after warm-up trim. The cutoff is
//! inclusive: a point at exactly `start + baseline_sec` participates in the
//! mean. Correction fills `gas_delta = gas_resistance_ohm - baseline` on
//! every point; the raw channel is left untouched, so correction is a pure
//! shift and never re-orders or re-scales the series.

use crate::error::{PrepError, Result};
use crate::resample::ResampledPoint;

/// Compute the per-run baseline and fill `gas_delta` in place.
///
/// Returns the baseline value used.
///
/// # Errors
///
/// `InsufficientBaseline` when `points` is empty; `run_id` is only used for
/// error reporting.
pub fn baseline_correct(
    points: &mut [ResampledPoint],
    baseline_sec: u32,
    run_id: &str,
) -> Result<f64> {
    if points.is_empty() {
        return Err(PrepError::InsufficientBaseline {
            run: run_id.to_string(),
            baseline_sec,
        });
    }

    let cutoff = points[0].timestamp_ms + i64::from(baseline_sec) * 1000;
    let mut sum = 0.0;
    let mut n = 0usize;
    for point in points.iter() {
        if point.timestamp_ms > cutoff {
            break;
        }
        sum += point.gas_resistance_ohm;
        n += 1;
    }
    // A non-empty grid always has at least its first point inside the window.
    let baseline = sum / n as f64;

    for point in points.iter_mut() {
        point.gas_delta = point.gas_resistance_ohm - baseline;
    }

    log::debug!("run {run_id}: baseline {baseline:.1} ohm over {n} points");
    Ok(baseline)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resample::QualityClass;

    fn point(ts: i64, gas: f64) -> ResampledPoint {
        ResampledPoint {
            timestamp_ms: ts,
            gas_resistance_ohm: gas,
            temperature_c: 25.0,
            humidity_pct: 40.0,
            pressure_pa: 101_000.0,
            gas_delta: 0.0,
            quality: QualityClass::Clean,
        }
    }

    #[test]
    fn test_baseline_is_mean_of_inclusive_window() {
        // Points at 0..=5 s; baseline_sec = 3 covers ts 0, 1000, 2000, 3000.
        let mut points: Vec<_> = (0..6).map(|i| point(i * 1000, 100.0 + i as f64 * 10.0)).collect();
        let baseline = baseline_correct(&mut points, 3, "r1").unwrap();
        assert!((baseline - 115.0).abs() < 1e-9);
        assert!((points[0].gas_delta - (-15.0)).abs() < 1e-9);
        assert!((points[5].gas_delta - 35.0).abs() < 1e-9);
    }

    #[test]
    fn test_correction_is_pure_shift() {
        let mut points: Vec<_> = (0..10).map(|i| point(i * 1000, (i as f64).sin() * 50.0 + 500.0)).collect();
        let raw: Vec<f64> = points.iter().map(|p| p.gas_resistance_ohm).collect();
        let baseline = baseline_correct(&mut points, 4, "r1").unwrap();

        for (p, r) in points.iter().zip(&raw) {
            // Raw channel untouched; delta differs from raw by exactly the
            // baseline everywhere.
            assert_eq!(p.gas_resistance_ohm, *r);
            assert!((p.gas_delta - (r - baseline)).abs() < 1e-9);
        }
        // Shape preserved: pairwise differences of delta equal those of raw.
        for i in 1..points.len() {
            let d_raw = raw[i] - raw[i - 1];
            let d_delta = points[i].gas_delta - points[i - 1].gas_delta;
            assert!((d_raw - d_delta).abs() < 1e-9);
        }
    }

    #[test]
    fn test_empty_grid_is_insufficient() {
        let mut points: Vec<ResampledPoint> = Vec::new();
        let err = baseline_correct(&mut points, 30, "r1").unwrap_err();
        assert!(matches!(err, PrepError::InsufficientBaseline { .. }));
        assert!(err.is_per_run());
    }

    #[test]
    fn test_short_grid_uses_what_exists() {
        // Fewer points than the nominal window: the mean covers all of them.
        let mut points = vec![point(0, 100.0), point(1000, 200.0)];
        let baseline = baseline_correct(&mut points, 30, "r1").unwrap();
        assert!((baseline - 150.0).abs() < 1e-9);
    }
}
