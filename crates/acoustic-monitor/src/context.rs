//! State and collaborators shared by the scheduler loops and the facade.

use std::sync::Arc;
use std::time::Duration;

use acoustic_core::{
    AcousticFeatures, Alert, Baseline, Classification, MonitorEvent, Reading, ReadingSource,
    ReportedFeatures, Sensor, clamp_unit,
};
use chrono::Utc;
use thiserror::Error;
use tokio::time::timeout;
use tracing::info;

use crate::broadcast::Broadcaster;
use crate::capture::{AudioCapture, CaptureError};
use crate::classifier::{Classifier, ClassifierError};
use crate::config::MonitorConfig;
use crate::lease::CaptureLocks;
use crate::store::FieldStore;

/// Failure of one capture-then-classify cycle.
#[derive(Debug, Error)]
pub(crate) enum CycleError {
    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Classify(#[from] ClassifierError),
}

pub(crate) struct MonitorContext {
    pub config: MonitorConfig,
    pub store: FieldStore,
    pub broadcaster: Broadcaster,
    pub capture: Arc<dyn AudioCapture>,
    pub classifier: Arc<dyn Classifier>,
    pub locks: CaptureLocks,
}

impl MonitorContext {
    pub fn new(
        config: MonitorConfig,
        capture: Arc<dyn AudioCapture>,
        classifier: Arc<dyn Classifier>,
    ) -> Self {
        Self {
            store: FieldStore::new(&config),
            broadcaster: Broadcaster::new(),
            locks: CaptureLocks::new(),
            config,
            capture,
            classifier,
        }
    }

    /// Records `clip` from the sensor and classifies it. The caller must hold
    /// the sensor's capture lease.
    pub async fn capture_and_classify(
        &self,
        sensor: &Sensor,
        clip: Duration,
    ) -> Result<Classification, CycleError> {
        let deadline = self.config.capture_deadline(clip);
        let audio = timeout(
            deadline,
            self.capture.record(&sensor.id, &sensor.device_ref, clip),
        )
        .await
        .map_err(|_| CaptureError::TimedOut {
            timeout_ms: deadline.as_millis() as u64,
        })??;

        Ok(self.classify(&audio).await?)
    }

    /// Classifier call bounded by `classify_timeout`, output sanitized.
    pub async fn classify(&self, audio: &[u8]) -> Result<Classification, ClassifierError> {
        let limit = self.config.classify_timeout;
        let classification = timeout(limit, self.classifier.classify(audio))
            .await
            .map_err(|_| ClassifierError::TimedOut {
                timeout_ms: limit.as_millis() as u64,
            })??;
        Ok(classification.sanitized())
    }

    /// Fills the dimensions the classifier left out from the sensor's baseline
    /// means, or zero while it has no baseline.
    pub fn resolve_features(
        &self,
        sensor_id: &str,
        reported: &ReportedFeatures,
    ) -> AcousticFeatures {
        let means = self
            .store
            .accumulator
            .snapshot(sensor_id)
            .map(|baseline| baseline.profile.means())
            .unwrap_or_default();
        reported.resolve(&means)
    }

    /// Scores a classification against the sensor's current baseline. Without
    /// a baseline the deviation is zero and the confidence passes through.
    /// Missing feature dimensions count as matching the baseline.
    pub fn score(
        &self,
        sensor_id: &str,
        classification: Classification,
        source: ReadingSource,
    ) -> Reading {
        let baseline = self.store.accumulator.snapshot(sensor_id);
        let (features, baseline_deviation, confidence) = match baseline {
            Some(baseline) => {
                let features = classification.features.resolve(&baseline.profile.means());
                let (deviation, confidence) = self.config.deviation.score(
                    &features,
                    &baseline.profile,
                    classification.confidence,
                );
                (features, deviation, confidence)
            }
            None => (
                classification.features.resolve(&AcousticFeatures::default()),
                0.0,
                classification.confidence,
            ),
        };

        Reading {
            sensor_id: sensor_id.to_string(),
            timestamp: Utc::now(),
            confidence: clamp_unit(confidence),
            baseline_deviation,
            pest_candidates: classification.pest_candidates,
            features,
            source,
        }
    }

    /// Stores the reading, publishes it and raises an alert when it qualifies.
    /// Nothing happens for a sensor that has been unregistered meanwhile.
    pub async fn record_reading(&self, sensor: &Sensor, reading: Reading) -> Option<Alert> {
        if !self.store.set_reading(reading.clone()) {
            return None;
        }
        self.broadcaster
            .publish(MonitorEvent::ReadingUpdate(reading.clone()))
            .await;

        let alert = self.store.dispatcher.dispatch(&reading, Some(sensor)).await?;
        info!(
            alert_id = alert.id,
            sensor_id = %alert.sensor_id,
            severity = alert.severity,
            candidates = alert.pest_candidates.len(),
            "pest alert raised"
        );
        self.broadcaster
            .publish(MonitorEvent::NewAlert(alert.clone()))
            .await;
        Some(alert)
    }

    pub async fn publish_baseline(&self, baseline: Option<Baseline>) {
        if let Some(baseline) = baseline {
            self.broadcaster
                .publish(MonitorEvent::BaselineUpdate(baseline))
                .await;
        }
    }
}
