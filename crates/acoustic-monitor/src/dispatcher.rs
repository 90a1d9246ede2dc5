//! Alert qualification and bounded alert history.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use acoustic_core::{Alert, Reading, ReadingSource, Sensor, clamp_unit};
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::debug;

pub struct AlertDispatcher {
    history: RwLock<VecDeque<Alert>>,
    capacity: usize,
    next_id: AtomicU64,
}

impl AlertDispatcher {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            history: RwLock::new(VecDeque::with_capacity(capacity)),
            capacity,
            next_id: AtomicU64::new(1),
        }
    }

    /// Builds an alert when the reading carries pest candidates and did not
    /// come from baseline establishment. Severity is the highest candidate
    /// severity.
    pub fn evaluate(&self, reading: &Reading, sensor: Option<&Sensor>) -> Option<Alert> {
        if reading.source == ReadingSource::Baseline || reading.pest_candidates.is_empty() {
            return None;
        }

        let severity = reading
            .pest_candidates
            .iter()
            .map(|candidate| clamp_unit(candidate.severity))
            .fold(0.0_f64, f64::max);

        Some(Alert {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            timestamp: Utc::now(),
            sensor_id: reading.sensor_id.clone(),
            sensor_name: sensor.map(|s| s.name.clone()),
            pest_candidates: reading.pest_candidates.clone(),
            severity,
            confidence: clamp_unit(reading.confidence),
            location: sensor.and_then(Sensor::location),
        })
    }

    /// Prepends to the history, evicting the oldest entries past capacity.
    pub async fn push(&self, alert: Alert) {
        let mut history = self.history.write().await;
        history.push_front(alert);
        while history.len() > self.capacity {
            if let Some(evicted) = history.pop_back() {
                debug!(alert_id = evicted.id, "alert evicted from history");
            }
        }
    }

    /// Evaluate and, when the reading qualifies, record the alert.
    pub async fn dispatch(&self, reading: &Reading, sensor: Option<&Sensor>) -> Option<Alert> {
        let alert = self.evaluate(reading, sensor)?;
        self.push(alert.clone()).await;
        Some(alert)
    }

    /// Most recent first.
    pub async fn recent(&self) -> Vec<Alert> {
        self.history.read().await.iter().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.history.read().await.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
