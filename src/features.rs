//! Sliding-window feature statistics.
//!
//! The tabular path summarizes each window of the resampled grid as a fixed
//! vector of per-channel statistics. Four channels are tracked:
//!
//! | channel              | source                        |
//! |----------------------|-------------------------------|
//! | `gas_resistance_ohm` | raw gas channel               |
//! | `gas_delta`          | baseline-corrected gas channel|
//! | `temperature_C`      | sensor die temperature        |
//! | `humidity_pct`       | relative humidity             |
//!
//! and seven statistics per channel: `mean`, `std` (sample, N-1), `min`,
//! `max`, `slope_per_s` (least-squares slope against time in seconds),
//! `mean_abs_diff` (mean absolute first difference), and `early_late_ratio`
//! (mean of the first third over the mean of the last third). The resulting
//! 28 columns are a fixed contract: their names and order never vary with
//! input, so feature matrices from different invocations align by
//! construction.
//!
//! Windows advance by `stride_sec` and only full windows are emitted; a
//! window inherits the worst `QualityClass` among its points.

use crate::config::PrepConfig;
use crate::resample::{worst_quality, QualityClass, ResampledPoint};

/// Names of the tracked channels, in column order.
pub const CHANNELS: [&str; 4] = ["gas_resistance_ohm", "gas_delta", "temperature_C", "humidity_pct"];

/// Names of the per-channel statistics, in column order.
pub const STATS: [&str; 7] = [
    "mean",
    "std",
    "min",
    "max",
    "slope_per_s",
    "mean_abs_diff",
    "early_late_ratio",
];

/// Number of feature columns per window.
pub const NUM_FEATURES: usize = CHANNELS.len() * STATS.len();

/// The fixed feature column names, `<channel>_<stat>`, channel-major.
pub fn feature_columns() -> Vec<String> {
    let mut columns = Vec::with_capacity(NUM_FEATURES);
    for channel in CHANNELS {
        for stat in STATS {
            columns.push(format!("{channel}_{stat}"));
        }
    }
    columns
}

/// The seven summary statistics of one channel over one window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelStats {
    pub mean: f64,
    /// Sample standard deviation (N-1); 0.0 for a single-point window.
    pub std: f64,
    pub min: f64,
    pub max: f64,
    /// Least-squares slope against time, per second.
    pub slope_per_s: f64,
    /// Mean absolute first difference; 0.0 for a single-point window.
    pub mean_abs_diff: f64,
    /// Mean of the first third over the mean of the last third; 0.0 when the
    /// late mean is within 1e-12 of zero.
    pub early_late_ratio: f64,
}

impl ChannelStats {
    /// Compute the statistics of `values` sampled at `timestamps_ms`.
    ///
    /// Both slices must be non-empty and equal length.
    pub fn compute(values: &[f64], timestamps_ms: &[i64]) -> Self {
        debug_assert_eq!(values.len(), timestamps_ms.len());
        let n = values.len();
        let n_f = n as f64;

        let mean = values.iter().sum::<f64>() / n_f;

        let std = if n > 1 {
            let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n_f - 1.0);
            var.sqrt()
        } else {
            0.0
        };

        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for &v in values {
            min = min.min(v);
            max = max.max(v);
        }

        let slope_per_s = slope(values, timestamps_ms);

        let mean_abs_diff = if n > 1 {
            values.windows(2).map(|w| (w[1] - w[0]).abs()).sum::<f64>() / (n_f - 1.0)
        } else {
            0.0
        };

        let third = (n / 3).max(1);
        let early_mean = values[..third].iter().sum::<f64>() / third as f64;
        let late_mean = values[n - third..].iter().sum::<f64>() / third as f64;
        // Epsilon rather than exact zero: a denormal-scale denominator would
        // blow the ratio up to +/-inf.
        let early_late_ratio = if late_mean.abs() < 1e-12 {
            0.0
        } else {
            early_mean / late_mean
        };

        Self {
            mean,
            std,
            min,
            max,
            slope_per_s,
            mean_abs_diff,
            early_late_ratio,
        }
    }

    /// Values in the fixed `STATS` order.
    pub fn as_array(&self) -> [f64; 7] {
        [
            self.mean,
            self.std,
            self.min,
            self.max,
            self.slope_per_s,
            self.mean_abs_diff,
            self.early_late_ratio,
        ]
    }
}

/// Least-squares slope of `values` against time in seconds.
fn slope(values: &[f64], timestamps_ms: &[i64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let t0 = timestamps_ms[0];
    let times: Vec<f64> = timestamps_ms.iter().map(|&t| (t - t0) as f64 / 1000.0).collect();
    let t_mean = times.iter().sum::<f64>() / n as f64;
    let v_mean = values.iter().sum::<f64>() / n as f64;

    let mut num = 0.0;
    let mut den = 0.0;
    for (t, v) in times.iter().zip(values) {
        num += (t - t_mean) * (v - v_mean);
        den += (t - t_mean) * (t - t_mean);
    }
    if den == 0.0 {
        0.0
    } else {
        num / den
    }
}

/// Feature vector of one sliding window, with provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowFeatures {
    /// Grid timestamp of the window's first point.
    pub start_ms: i64,
    /// Grid timestamp of the window's last point.
    pub end_ms: i64,
    /// Worst quality class among the window's points.
    pub quality: QualityClass,
    /// The 28 statistics in `feature_columns()` order.
    pub values: Vec<f64>,
}

/// Slide a window over one run's corrected grid and summarize each position.
///
/// Window length and stride come from the configuration, converted to sample
/// counts on the uniform grid. Positions that would extend past the end of
/// the grid are not emitted.
pub fn extract_windows(points: &[ResampledPoint], config: &PrepConfig) -> Vec<WindowFeatures> {
    let size = config.window_samples();
    let stride = config.stride_samples();
    if points.len() < size {
        return Vec::new();
    }

    let timestamps: Vec<i64> = points.iter().map(|p| p.timestamp_ms).collect();
    let channels: [Vec<f64>; 4] = [
        points.iter().map(|p| p.gas_resistance_ohm).collect(),
        points.iter().map(|p| p.gas_delta).collect(),
        points.iter().map(|p| p.temperature_c).collect(),
        points.iter().map(|p| p.humidity_pct).collect(),
    ];

    let mut windows = Vec::new();
    let mut start = 0usize;
    while start + size <= points.len() {
        let end = start + size;
        let ts = &timestamps[start..end];

        let mut values = Vec::with_capacity(NUM_FEATURES);
        for channel in &channels {
            let stats = ChannelStats::compute(&channel[start..end], ts);
            values.extend_from_slice(&stats.as_array());
        }

        windows.push(WindowFeatures {
            start_ms: ts[0],
            end_ms: ts[size - 1],
            quality: worst_quality(&points[start..end]),
            values,
        });
        start += stride;
    }
    windows
}
