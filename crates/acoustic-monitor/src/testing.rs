//! Scripted capture and classifier doubles.
//!
//! Used by this crate's tests and available to downstream integration tests
//! that need a deterministic monitor.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use acoustic_core::Classification;
use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::capture::{AudioCapture, CaptureError};
use crate::classifier::{Classifier, ClassifierError};

/// Replays queued capture results, then returns a short silent clip.
///
/// Tracks how many recordings are in flight per sensor so tests can assert
/// exclusivity.
#[derive(Default)]
pub struct ScriptedCapture {
    script: Mutex<VecDeque<Result<Vec<u8>, CaptureError>>>,
    latency: Duration,
    calls: AtomicUsize,
    in_flight: DashMap<String, usize>,
    peak: DashMap<String, usize>,
}

impl ScriptedCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every recording takes `latency` before returning.
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            ..Self::default()
        }
    }

    pub async fn push(&self, result: Result<Vec<u8>, CaptureError>) {
        self.script.lock().await.push_back(result);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn peak_in_flight(&self, sensor_id: &str) -> usize {
        self.peak.get(sensor_id).map(|p| *p).unwrap_or(0)
    }

    fn enter(&self, sensor_id: &str) {
        let mut current = self.in_flight.entry(sensor_id.to_string()).or_insert(0);
        *current += 1;
        let now = *current;
        drop(current);

        let mut peak = self.peak.entry(sensor_id.to_string()).or_insert(0);
        *peak = (*peak).max(now);
    }

    fn exit(&self, sensor_id: &str) {
        if let Some(mut current) = self.in_flight.get_mut(sensor_id) {
            *current = current.saturating_sub(1);
        }
    }
}

#[async_trait]
impl AudioCapture for ScriptedCapture {
    async fn record(
        &self,
        sensor_id: &str,
        _device_ref: &str,
        _duration: Duration,
    ) -> Result<Vec<u8>, CaptureError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.enter(sensor_id);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let result = self
            .script
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Ok(vec![0; 32]));
        self.exit(sensor_id);
        result
    }
}

/// Replays queued classifier results, then repeats the fallback.
pub struct ScriptedClassifier {
    script: Mutex<VecDeque<Result<Classification, ClassifierError>>>,
    fallback: Classification,
    calls: AtomicUsize,
}

impl ScriptedClassifier {
    pub fn new(fallback: Classification) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback,
            calls: AtomicUsize::new(0),
        }
    }

    pub async fn push(&self, result: Result<Classification, ClassifierError>) {
        self.script.lock().await.push_back(result);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Classifier for ScriptedClassifier {
    async fn classify(&self, _audio: &[u8]) -> Result<Classification, ClassifierError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.script
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Ok(self.fallback.clone()))
    }
}
