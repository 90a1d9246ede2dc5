//! Baseline snapshot types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::AcousticFeatures;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureStats {
    pub mean: f64,
    pub min: f64,
    pub max: f64,
}

impl FeatureStats {
    pub fn new(mean: f64, min: f64, max: f64) -> Self {
        Self { mean, min, max }
    }
}

/// Mean/min/max per acoustic dimension.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcousticProfile {
    pub frequency: FeatureStats,
    pub amplitude: FeatureStats,
    pub spectral_centroid: FeatureStats,
    pub zero_crossing_rate: FeatureStats,
}

impl AcousticProfile {
    /// Typical quiet-field conditions, used when a sensor cannot record at all.
    pub fn nominal() -> Self {
        Self {
            frequency: FeatureStats::new(1400.0, 800.0, 2000.0),
            amplitude: FeatureStats::new(0.2, 0.05, 0.3),
            spectral_centroid: FeatureStats::new(2750.0, 2500.0, 3000.0),
            zero_crossing_rate: FeatureStats::new(0.1, 0.08, 0.12),
        }
    }

    pub fn means(&self) -> AcousticFeatures {
        AcousticFeatures::new(
            self.frequency.mean,
            self.amplitude.mean,
            self.spectral_centroid.mean,
            self.zero_crossing_rate.mean,
        )
    }
}

/// Frozen statistical summary of a sensor's normal conditions.
///
/// Recomputed and republished on every new sample. `synthetic` marks a
/// profile substituted because the sensor could not capture audio; such a
/// baseline carries `sample_count == 0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Baseline {
    pub sensor_id: String,
    pub established_at: DateTime<Utc>,
    pub is_establishing: bool,
    pub total_seconds: f64,
    pub profile: AcousticProfile,
    pub sample_count: u64,
    pub last_update: DateTime<Utc>,
    #[serde(default)]
    pub synthetic: bool,
}
