//! Incremental feature extraction over a live sample feed.
//!
//! The offline pipeline reads whole runs from disk; deployment reads one
//! row at a time from the sensor. `StreamingExtractor` mirrors the tabular
//! path's semantics over a rolling buffer so a model trained on offline
//! `features.csv` columns sees identically-computed inputs live:
//!
//! - the first `baseline_sec` of readings accumulate the baseline; the
//!   extractor emits nothing until the baseline is sealed;
//! - afterwards each reading is corrected to `gas_delta` and appended to a
//!   rolling window of `window_samples()` points;
//! - once the window is full, a `WindowFeatures` is emitted every
//!   `stride_samples()` readings, with the same 28 columns in the same
//!   order as the offline path.
//!
//! The live feed is taken at face value: no resampling is applied and
//! emitted windows carry `QualityClass::Clean`. Readings without a gas
//! value are skipped, matching offline row filtering.

use crate::config::PrepConfig;
use crate::error::Result;
use crate::features::{ChannelStats, WindowFeatures, NUM_FEATURES};
use crate::ingest::RawSample;
use crate::resample::QualityClass;
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy)]
struct BufferedReading {
    timestamp_ms: i64,
    gas: f64,
    gas_delta: f64,
    temperature: f64,
    humidity: f64,
}

/// Rolling-window feature extractor for live readings.
#[derive(Debug)]
pub struct StreamingExtractor {
    config: PrepConfig,
    buffer: VecDeque<BufferedReading>,
    baseline_sum: f64,
    baseline_count: usize,
    baseline: Option<f64>,
    first_ts: Option<i64>,
    /// Readings accepted since the last emission (or since the window first
    /// filled).
    since_emit: usize,
}

impl StreamingExtractor {
    /// Create an extractor from a validated configuration.
    pub fn new(config: PrepConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            buffer: VecDeque::new(),
            baseline_sum: 0.0,
            baseline_count: 0,
            baseline: None,
            first_ts: None,
            since_emit: 0,
        })
    }

    /// The sealed baseline, once `baseline_sec` of readings have arrived.
    pub fn baseline(&self) -> Option<f64> {
        self.baseline
    }

    /// Accept one reading; returns a feature vector when a window is due.
    ///
    /// Readings without a finite gas value are ignored.
    pub fn push(&mut self, sample: &RawSample) -> Option<WindowFeatures> {
        let gas = sample.gas()?;
        let first_ts = *self.first_ts.get_or_insert(sample.timestamp_ms);

        let baseline = match self.baseline {
            Some(b) => b,
            None => {
                let cutoff = first_ts + i64::from(self.config.baseline_sec) * 1000;
                if sample.timestamp_ms <= cutoff {
                    self.baseline_sum += gas;
                    self.baseline_count += 1;
                    return None;
                }
                let b = self.baseline_sum / self.baseline_count as f64;
                log::info!(
                    "streaming baseline sealed: {b:.1} ohm over {} readings",
                    self.baseline_count
                );
                self.baseline = Some(b);
                b
            }
        };

        self.buffer.push_back(BufferedReading {
            timestamp_ms: sample.timestamp_ms,
            gas,
            gas_delta: gas - baseline,
            temperature: sample.temperature_c.unwrap_or(0.0),
            humidity: sample.humidity_pct.unwrap_or(0.0),
        });

        let size = self.config.window_samples();
        if self.buffer.len() > size {
            self.buffer.pop_front();
        }
        if self.buffer.len() < size {
            return None;
        }

        self.since_emit += 1;
        // First full window emits immediately; then every stride.
        if self.since_emit == 1 || self.since_emit > self.config.stride_samples() {
            self.since_emit = 1;
            return Some(self.extract());
        }
        None
    }

    fn extract(&self) -> WindowFeatures {
        let timestamps: Vec<i64> = self.buffer.iter().map(|r| r.timestamp_ms).collect();
        let channels: [Vec<f64>; 4] = [
            self.buffer.iter().map(|r| r.gas).collect(),
            self.buffer.iter().map(|r| r.gas_delta).collect(),
            self.buffer.iter().map(|r| r.temperature).collect(),
            self.buffer.iter().map(|r| r.humidity).collect(),
        ];

        let mut values = Vec::with_capacity(NUM_FEATURES);
        for channel in &channels {
            values.extend_from_slice(&ChannelStats::compute(channel, &timestamps).as_array());
        }

        WindowFeatures {
            start_ms: timestamps[0],
            end_ms: timestamps[timestamps.len() - 1],
            quality: QualityClass::Clean,
            values,
        }
    }

    /// Discard buffered state, keeping the configuration. The baseline is
    /// re-accumulated from the next reading.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.baseline_sum = 0.0;
        self.baseline_count = 0;
        self.baseline = None;
        self.first_ts = None;
        self.since_emit = 0;
    }
}
