//! The public face of the monitor.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use acoustic_core::{
    AcousticFeatures, Alert, Baseline, FieldSnapshot, MonitorEvent, Reading, ReadingSource, Sensor,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::broadcast::Subscription;
use crate::capture::AudioCapture;
use crate::classifier::Classifier;
use crate::config::MonitorConfig;
use crate::context::MonitorContext;
use crate::error::{MonitorError, MonitorResult};
use crate::registry::{RegisterRequest, Registration};
use crate::scheduler::{CaptureState, RecordingScheduler};

/// Requested change to a sensor's baseline mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BaselineAction {
    Start,
    Stop,
}

impl FromStr for BaselineAction {
    type Err = MonitorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "start" => Ok(BaselineAction::Start),
            "stop" => Ok(BaselineAction::Stop),
            other => Err(MonitorError::Validation(format!(
                "unknown baseline action: {other}"
            ))),
        }
    }
}

impl fmt::Display for BaselineAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BaselineAction::Start => f.write_str("start"),
            BaselineAction::Stop => f.write_str("stop"),
        }
    }
}

/// Sensor registry, baseline establishment, periodic sampling, deviation
/// scoring, alerting and event fan-out behind one handle.
///
/// Must be created inside a Tokio runtime; registering a sensor spawns its
/// baseline task.
pub struct FieldMonitor {
    ctx: Arc<MonitorContext>,
    scheduler: RecordingScheduler,
}

impl FieldMonitor {
    pub fn new(
        config: MonitorConfig,
        capture: Arc<dyn AudioCapture>,
        classifier: Arc<dyn Classifier>,
    ) -> MonitorResult<Self> {
        config.validate()?;
        let ctx = Arc::new(MonitorContext::new(config, capture, classifier));
        Ok(Self {
            scheduler: RecordingScheduler::new(ctx.clone()),
            ctx,
        })
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.ctx.config
    }

    /// Registers a sensor, or updates an existing one in place. A new sensor
    /// starts establishing its baseline immediately.
    pub async fn register(&self, request: RegisterRequest) -> MonitorResult<Sensor> {
        let registration = self.ctx.store.registry.register(request)?;
        if let Registration::Created(sensor) = &registration {
            self.ctx.store.accumulator.start(&sensor.id);
            self.scheduler.attach(&sensor.id);
        }

        let sensor = registration.into_sensor();
        self.ctx
            .broadcaster
            .publish(MonitorEvent::SensorRegistered(sensor.clone()))
            .await;
        Ok(sensor)
    }

    /// Stops the sensor's recording and deletes the sensor together with its
    /// baseline, accumulation and current reading.
    pub async fn unregister(&self, sensor_id: &str) -> MonitorResult<()> {
        if !self.ctx.store.registry.contains(sensor_id) {
            return Err(MonitorError::NotFound(sensor_id.to_string()));
        }

        self.scheduler.detach(sensor_id);
        if !self.ctx.store.remove_sensor(sensor_id) {
            return Err(MonitorError::NotFound(sensor_id.to_string()));
        }
        // An in-flight capture keeps its lock; its task releases it on exit.
        self.ctx.locks.release(sensor_id);
        info!(sensor_id, "sensor unregistered");

        self.ctx
            .broadcaster
            .publish(MonitorEvent::SensorRemoved {
                sensor_id: sensor_id.to_string(),
            })
            .await;
        Ok(())
    }

    pub fn list(&self) -> Vec<Sensor> {
        self.ctx.store.registry.list()
    }

    pub fn sensor(&self, sensor_id: &str) -> Option<Sensor> {
        self.ctx.store.registry.get(sensor_id)
    }

    /// Starts or stops baseline establishment. Returns the baseline as it
    /// stands after the change, if any samples exist.
    pub async fn set_baseline_mode(
        &self,
        sensor_id: &str,
        action: BaselineAction,
    ) -> MonitorResult<Option<Baseline>> {
        if !self.ctx.store.registry.contains(sensor_id) {
            return Err(MonitorError::NotFound(sensor_id.to_string()));
        }

        let baseline = match action {
            BaselineAction::Start => {
                self.ctx.store.accumulator.start(sensor_id);
                self.scheduler.start_baseline(sensor_id);
                self.ctx.store.accumulator.snapshot(sensor_id)
            }
            BaselineAction::Stop => {
                let baseline = self.ctx.store.accumulator.stop(sensor_id);
                self.ctx.publish_baseline(baseline.clone()).await;
                baseline
            }
        };
        info!(sensor_id, %action, "baseline mode changed");
        Ok(baseline)
    }

    pub fn baseline(&self, sensor_id: &str) -> Option<Baseline> {
        self.ctx.store.accumulator.snapshot(sensor_id)
    }

    pub fn reading(&self, sensor_id: &str) -> Option<Reading> {
        self.ctx.store.reading(sensor_id)
    }

    /// Alert history, most recent first.
    pub async fn alerts(&self) -> Vec<Alert> {
        self.ctx.store.dispatcher.recent().await
    }

    /// Classifies an uploaded clip outside the recording loops.
    ///
    /// Classifier failures come back as [`MonitorError::Classification`]
    /// carrying a zero-confidence fallback reading; no state changes in that
    /// case.
    #[instrument(skip(self, audio), fields(bytes = audio.len()))]
    pub async fn analyze_once(&self, sensor_id: &str, audio: &[u8]) -> MonitorResult<Reading> {
        let sensor = self
            .ctx
            .store
            .registry
            .get(sensor_id)
            .ok_or_else(|| MonitorError::NotFound(sensor_id.to_string()))?;

        let classification = match self.ctx.classify(audio).await {
            Ok(classification) => classification,
            Err(source) => {
                warn!(sensor_id, error = %source, "manual analysis failed");
                return Err(MonitorError::Classification {
                    sensor_id: sensor_id.to_string(),
                    source,
                    fallback: Box::new(self.fallback_reading(sensor_id)),
                });
            }
        };

        let reading = self
            .ctx
            .score(sensor_id, classification, ReadingSource::Manual);
        self.ctx.record_reading(&sensor, reading.clone()).await;
        Ok(reading)
    }

    /// Classifies an uploaded clip and feeds its features into the sensor's
    /// baseline. The reading is scored against the baseline as it stood
    /// before this sample and never raises an alert.
    #[instrument(skip(self, audio), fields(bytes = audio.len()))]
    pub async fn analyze_for_baseline(
        &self,
        sensor_id: &str,
        audio: &[u8],
    ) -> MonitorResult<Reading> {
        let sensor = self
            .ctx
            .store
            .registry
            .get(sensor_id)
            .ok_or_else(|| MonitorError::NotFound(sensor_id.to_string()))?;

        let classification = match self.ctx.classify(audio).await {
            Ok(classification) => classification,
            Err(source) => {
                return Err(MonitorError::Classification {
                    sensor_id: sensor_id.to_string(),
                    source,
                    fallback: Box::new(self.fallback_reading(sensor_id)),
                });
            }
        };

        let reading = self
            .ctx
            .score(sensor_id, classification, ReadingSource::Baseline);

        let baseline = self
            .ctx
            .store
            .accumulator
            .add_sample(sensor_id, &reading.features);
        self.ctx.publish_baseline(baseline).await;

        self.ctx.record_reading(&sensor, reading.clone()).await;
        Ok(reading)
    }

    /// Connects an event subscriber. Its first event is a full snapshot.
    pub async fn subscribe(&self) -> Subscription {
        let store = &self.ctx.store;
        self.ctx.broadcaster.connect(|| store.snapshot()).await
    }

    pub async fn snapshot(&self) -> FieldSnapshot {
        self.ctx.store.snapshot().await
    }

    pub fn capture_state(&self, sensor_id: &str) -> Option<CaptureState> {
        self.scheduler.capture_state(sensor_id)
    }

    /// Starts the periodic sampling tick.
    pub async fn start(&self) {
        self.scheduler.start().await;
    }

    /// Runs one periodic sampling pass now. Returns the number of sensors
    /// that were free and started a capture.
    pub fn trigger_sampling(&self) -> usize {
        self.scheduler.trigger_sampling()
    }

    pub async fn shutdown(&self) {
        self.scheduler.shutdown().await;
    }

    fn fallback_reading(&self, sensor_id: &str) -> Reading {
        let features = self
            .ctx
            .store
            .accumulator
            .snapshot(sensor_id)
            .map(|baseline| baseline.profile.means())
            .unwrap_or_else(AcousticFeatures::default);

        Reading {
            sensor_id: sensor_id.to_string(),
            timestamp: Utc::now(),
            confidence: 0.0,
            baseline_deviation: 0.0,
            pest_candidates: Vec::new(),
            features,
            source: ReadingSource::Manual,
        }
    }
}
