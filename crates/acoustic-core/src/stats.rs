//! # Running Statistics
//!
//! Constant-memory aggregates over a stream of feature samples. The baseline
//! accumulator keeps one [`ProfileAccumulator`] per sensor, so mean/min/max stay
//! exact no matter how many samples a long-lived sensor ingests.

use serde::{Deserialize, Serialize};

use crate::FeatureVector;
use crate::baseline::{AcousticProfile, FeatureStats};

/// Count, sum and extrema of one feature dimension.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RunningStats {
    count: u64,
    sum: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    pub fn new() -> Self {
        Self {
            count: 0,
            sum: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }

    pub fn push(&mut self, value: f64) {
        self.count += 1;
        self.sum += value;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    /// Mean, minimum and maximum, or `None` before the first value.
    pub fn summary(&self) -> Option<FeatureStats> {
        if self.count == 0 {
            return None;
        }
        Some(FeatureStats {
            mean: self.sum / self.count as f64,
            min: self.min,
            max: self.max,
        })
    }
}

impl Default for RunningStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Running statistics for all four acoustic dimensions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileAccumulator {
    frequency: RunningStats,
    amplitude: RunningStats,
    spectral_centroid: RunningStats,
    zero_crossing_rate: RunningStats,
}

impl ProfileAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, sample: &impl FeatureVector) {
        self.frequency.push(sample.frequency());
        self.amplitude.push(sample.amplitude());
        self.spectral_centroid.push(sample.spectral_centroid());
        self.zero_crossing_rate.push(sample.zero_crossing_rate());
    }

    /// Number of samples folded in so far.
    pub fn count(&self) -> u64 {
        self.frequency.count()
    }

    pub fn profile(&self) -> Option<AcousticProfile> {
        Some(AcousticProfile {
            frequency: self.frequency.summary()?,
            amplitude: self.amplitude.summary()?,
            spectral_centroid: self.spectral_centroid.summary()?,
            zero_crossing_rate: self.zero_crossing_rate.summary()?,
        })
    }
}
