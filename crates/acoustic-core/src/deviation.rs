//! # Deviation
//!
//! Heuristic anomaly scoring of a live feature vector against a sensor baseline.
//! Only frequency and amplitude take part in the score; the other dimensions are
//! carried in the profile for display.

use serde::{Deserialize, Serialize};

use crate::FeatureVector;
use crate::baseline::AcousticProfile;

/// Relative distance of `current` from `mean`.
///
/// Returns 0 when `mean` is zero or either input is not finite.
///
/// # Examples
///
/// ```
/// use acoustic_core::relative_delta;
///
/// let d = relative_delta(1600.0, 1100.0);
/// assert!((d - 0.454545).abs() < 1e-6);
/// assert_eq!(relative_delta(5.0, 0.0), 0.0);
/// ```
pub fn relative_delta(current: f64, mean: f64) -> f64 {
    if mean == 0.0 || !mean.is_finite() || !current.is_finite() {
        return 0.0;
    }
    (current - mean).abs() / mean.abs()
}

/// Euclidean norm of the frequency and amplitude deltas. Always `>= 0`.
pub fn deviation(features: &impl FeatureVector, profile: &AcousticProfile) -> f64 {
    let freq_delta = relative_delta(features.frequency(), profile.frequency.mean);
    let amp_delta = relative_delta(features.amplitude(), profile.amplitude.mean);
    (freq_delta * freq_delta + amp_delta * amp_delta).sqrt()
}

/// Confidence boost applied to readings that stray from their baseline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeviationPolicy {
    /// Deviation above which the classifier confidence is boosted.
    pub boost_threshold: f64,
    /// Confidence added per unit of deviation.
    pub boost_gain: f64,
    /// Upper bound for a boosted confidence.
    pub confidence_ceiling: f64,
}

impl Default for DeviationPolicy {
    fn default() -> Self {
        Self {
            boost_threshold: 0.3,
            boost_gain: 0.3,
            confidence_ceiling: 0.95,
        }
    }
}

impl DeviationPolicy {
    pub fn adjust_confidence(&self, raw_confidence: f64, deviation: f64) -> f64 {
        if deviation > self.boost_threshold {
            (raw_confidence + deviation * self.boost_gain).min(self.confidence_ceiling)
        } else {
            raw_confidence
        }
    }

    /// Deviation and adjusted confidence in one step.
    pub fn score(
        &self,
        features: &impl FeatureVector,
        profile: &AcousticProfile,
        raw_confidence: f64,
    ) -> (f64, f64) {
        let deviation = deviation(features, profile);
        (deviation, self.adjust_confidence(raw_confidence, deviation))
    }
}
