//! # Acoustic Core
//!
//! This crate provides the core data structures for the acoustic field monitor.
//! It defines the `FeatureVector` trait, a generic interface over the four acoustic
//! features a classifier extracts from a clip, and the sensor, reading and alert
//! records shared by the runtime and the storage layer.
//! Baseline statistics live in [`stats`] and [`baseline`], the anomaly heuristic in
//! [`deviation`], and the event stream payloads in [`events`].

pub mod baseline;
pub mod deviation;
pub mod events;
pub mod stats;

pub use baseline::{AcousticProfile, Baseline, FeatureStats};
pub use deviation::{DeviationPolicy, relative_delta};
pub use events::{FieldSnapshot, MonitorEvent};
pub use stats::{ProfileAccumulator, RunningStats};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub trait FeatureVector {
    fn frequency(&self) -> f64;
    fn amplitude(&self) -> f64;
    fn spectral_centroid(&self) -> f64;
    fn zero_crossing_rate(&self) -> f64;
}

/// Feature vector produced by the classifier for one clip.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AcousticFeatures {
    pub frequency: f64,
    pub amplitude: f64,
    pub spectral_centroid: f64,
    pub zero_crossing_rate: f64,
}

impl AcousticFeatures {
    pub fn new(frequency: f64, amplitude: f64, spectral_centroid: f64, zero_crossing_rate: f64) -> Self {
        Self {
            frequency,
            amplitude,
            spectral_centroid,
            zero_crossing_rate,
        }
    }
}

impl FeatureVector for AcousticFeatures {
    fn frequency(&self) -> f64 {
        self.frequency
    }

    fn amplitude(&self) -> f64 {
        self.amplitude
    }

    fn spectral_centroid(&self) -> f64 {
        self.spectral_centroid
    }

    fn zero_crossing_rate(&self) -> f64 {
        self.zero_crossing_rate
    }
}

/// Features as reported by the classifier. A dimension the classifier left out
/// (or reported as a non-finite number) is `None`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ReportedFeatures {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amplitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spectral_centroid: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zero_crossing_rate: Option<f64>,
}

impl ReportedFeatures {
    /// Takes each absent dimension from `fallback`.
    pub fn resolve(&self, fallback: &impl FeatureVector) -> AcousticFeatures {
        AcousticFeatures {
            frequency: self.frequency.unwrap_or_else(|| fallback.frequency()),
            amplitude: self.amplitude.unwrap_or_else(|| fallback.amplitude()),
            spectral_centroid: self
                .spectral_centroid
                .unwrap_or_else(|| fallback.spectral_centroid()),
            zero_crossing_rate: self
                .zero_crossing_rate
                .unwrap_or_else(|| fallback.zero_crossing_rate()),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.frequency.is_some()
            && self.amplitude.is_some()
            && self.spectral_centroid.is_some()
            && self.zero_crossing_rate.is_some()
    }

    /// Drops non-finite dimensions.
    pub fn sanitized(self) -> Self {
        let finite = |value: Option<f64>| value.filter(|v| v.is_finite());
        Self {
            frequency: finite(self.frequency),
            amplitude: finite(self.amplitude),
            spectral_centroid: finite(self.spectral_centroid),
            zero_crossing_rate: finite(self.zero_crossing_rate),
        }
    }
}

impl From<AcousticFeatures> for ReportedFeatures {
    fn from(features: AcousticFeatures) -> Self {
        Self {
            frequency: Some(features.frequency),
            amplitude: Some(features.amplitude),
            spectral_centroid: Some(features.spectral_centroid),
            zero_crossing_rate: Some(features.zero_crossing_rate),
        }
    }
}

/// One baseline sample. Immutable once created.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureSample {
    pub timestamp: DateTime<Utc>,
    pub frequency: f64,
    pub amplitude: f64,
    pub spectral_centroid: f64,
    pub zero_crossing_rate: f64,
}

impl FeatureSample {
    pub fn new(timestamp: DateTime<Utc>, features: &impl FeatureVector) -> Self {
        Self {
            timestamp,
            frequency: features.frequency(),
            amplitude: features.amplitude(),
            spectral_centroid: features.spectral_centroid(),
            zero_crossing_rate: features.zero_crossing_rate(),
        }
    }

    pub fn features(&self) -> AcousticFeatures {
        AcousticFeatures::new(
            self.frequency,
            self.amplitude,
            self.spectral_centroid,
            self.zero_crossing_rate,
        )
    }
}

impl FeatureVector for FeatureSample {
    fn frequency(&self) -> f64 {
        self.frequency
    }

    fn amplitude(&self) -> f64 {
        self.amplitude
    }

    fn spectral_centroid(&self) -> f64 {
        self.spectral_centroid
    }

    fn zero_crossing_rate(&self) -> f64 {
        self.zero_crossing_rate
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lng: f64,
}

/// A registered field microphone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sensor {
    pub id: String,
    pub device_ref: String,
    pub name: String,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub registered_at: DateTime<Utc>,
}

impl Sensor {
    /// Map position, only when both coordinates are known.
    pub fn location(&self) -> Option<Location> {
        Some(Location {
            lat: self.lat?,
            lng: self.lng?,
        })
    }
}

/// A classifier-proposed pest type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PestCandidate {
    #[serde(rename = "type")]
    pub pest_type: String,
    pub confidence: f64,
    #[serde(default)]
    pub severity: f64,
}

/// Output of the external classifier for one clip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    pub confidence: f64,
    #[serde(default, alias = "pestTypes")]
    pub pest_candidates: Vec<PestCandidate>,
    #[serde(default, alias = "acousticFeatures")]
    pub features: ReportedFeatures,
}

impl Classification {
    /// Clamps confidences and severities into [0, 1] and drops non-finite features.
    pub fn sanitized(self) -> Self {
        Self {
            confidence: clamp_unit(self.confidence),
            pest_candidates: self
                .pest_candidates
                .into_iter()
                .map(|candidate| PestCandidate {
                    confidence: clamp_unit(candidate.confidence),
                    severity: clamp_unit(candidate.severity),
                    ..candidate
                })
                .collect(),
            features: self.features.sanitized(),
        }
    }
}

/// Which path produced a reading. Baseline captures never raise alerts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReadingSource {
    Baseline,
    Periodic,
    Manual,
}

/// The latest scored observation of a sensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reading {
    pub sensor_id: String,
    pub timestamp: DateTime<Utc>,
    pub confidence: f64,
    pub baseline_deviation: f64,
    pub pest_candidates: Vec<PestCandidate>,
    pub features: AcousticFeatures,
    pub source: ReadingSource,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: u64,
    pub timestamp: DateTime<Utc>,
    pub sensor_id: String,
    pub sensor_name: Option<String>,
    pub pest_candidates: Vec<PestCandidate>,
    pub severity: f64,
    pub confidence: f64,
    pub location: Option<Location>,
}

/// Clamps a score into [0, 1]; NaN and infinities become 0.
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn features() -> AcousticFeatures {
        AcousticFeatures::new(1200.0, 0.2, 2600.0, 0.09)
    }

    #[test]
    fn feature_sample_trait_impl_works() {
        let sample = FeatureSample::new(Utc::now(), &features());

        assert_eq!(sample.frequency(), 1200.0);
        assert_eq!(sample.amplitude(), 0.2);
        assert_eq!(sample.spectral_centroid(), 2600.0);
        assert_eq!(sample.zero_crossing_rate(), 0.09);
        assert_eq!(sample.features(), features());
    }

    #[test]
    fn location_requires_both_coordinates() {
        let mut sensor = Sensor {
            id: "mic-1".to_string(),
            device_ref: "hw:1,0".to_string(),
            name: "North Field Mic".to_string(),
            lat: Some(40.7128),
            lng: None,
            registered_at: Utc::now(),
        };
        assert_eq!(sensor.location(), None);

        sensor.lng = Some(-74.006);
        assert_eq!(
            sensor.location(),
            Some(Location {
                lat: 40.7128,
                lng: -74.006
            })
        );
    }

    #[test]
    fn classification_sanitizing_clamps_scores() {
        let raw = Classification {
            confidence: 1.7,
            pest_candidates: vec![PestCandidate {
                pest_type: "aphid".to_string(),
                confidence: f64::NAN,
                severity: -0.4,
            }],
            features: AcousticFeatures::new(f64::INFINITY, 0.1, 2000.0, 0.05).into(),
        };

        let clean = raw.sanitized();
        assert_eq!(clean.confidence, 1.0);
        assert_eq!(clean.pest_candidates[0].confidence, 0.0);
        assert_eq!(clean.pest_candidates[0].severity, 0.0);
        assert_eq!(clean.features.frequency, None);
        assert_eq!(clean.features.amplitude, Some(0.1));
    }

    #[test]
    fn pest_candidate_uses_type_on_the_wire() {
        let json = r#"{"confidence":0.8,"pestCandidates":[{"type":"bark_beetle","confidence":0.9,"severity":0.7}],"features":{"frequency":3000.0,"amplitude":0.3,"spectralCentroid":3100.0,"zeroCrossingRate":0.12}}"#;
        let parsed: Classification = serde_json::from_str(json).unwrap();

        assert_eq!(parsed.pest_candidates[0].pest_type, "bark_beetle");
        assert_eq!(parsed.features.spectral_centroid, Some(3100.0));
        assert!(parsed.features.is_complete());
    }

    #[test]
    fn missing_feature_is_absent_not_zero() {
        let json = r#"{"confidence":0.5,"acousticFeatures":{"frequency":1100}}"#;
        let parsed: Classification = serde_json::from_str(json).unwrap();

        assert_eq!(parsed.features.frequency, Some(1100.0));
        assert_eq!(parsed.features.amplitude, None);
        assert!(!parsed.features.is_complete());
    }

    #[test]
    fn resolve_fills_only_absent_dimensions() {
        let reported = ReportedFeatures {
            frequency: Some(1100.0),
            zero_crossing_rate: Some(0.2),
            ..ReportedFeatures::default()
        };

        let resolved = reported.resolve(&features());
        assert_eq!(resolved, AcousticFeatures::new(1100.0, 0.2, 2600.0, 0.2));
    }
}
