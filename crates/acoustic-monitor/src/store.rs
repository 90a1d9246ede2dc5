//! Shared monitor state: sensors, baselines, current readings and alerts.

use acoustic_core::{FieldSnapshot, Reading};
use dashmap::DashMap;

use crate::accumulator::BaselineAccumulator;
use crate::config::MonitorConfig;
use crate::dispatcher::AlertDispatcher;
use crate::registry::SensorRegistry;

pub struct FieldStore {
    pub registry: SensorRegistry,
    pub accumulator: BaselineAccumulator,
    pub dispatcher: AlertDispatcher,
    readings: DashMap<String, Reading>,
}

impl FieldStore {
    pub fn new(config: &MonitorConfig) -> Self {
        Self {
            registry: SensorRegistry::new(),
            accumulator: BaselineAccumulator::new(
                config.baseline_history_limit,
                config.baseline_clip.as_secs_f64(),
            ),
            dispatcher: AlertDispatcher::new(config.alert_capacity),
            readings: DashMap::new(),
        }
    }

    /// Overwrites the sensor's current reading. Returns `false`, storing
    /// nothing, when the sensor is no longer registered.
    pub fn set_reading(&self, reading: Reading) -> bool {
        // Inserted under the registry entry so a concurrent unregister either
        // runs first or removes this reading afterwards.
        let sensor_id = reading.sensor_id.clone();
        self.registry
            .with_sensor(&sensor_id, |_| {
                self.readings.insert(sensor_id.clone(), reading);
            })
            .is_some()
    }

    pub fn reading(&self, sensor_id: &str) -> Option<Reading> {
        self.readings.get(sensor_id).map(|r| r.clone())
    }

    /// Drops the sensor and everything derived from it.
    pub fn remove_sensor(&self, sensor_id: &str) -> bool {
        let removed = self.registry.unregister(sensor_id).is_ok();
        self.accumulator.remove(sensor_id);
        self.readings.remove(sensor_id);
        removed
    }

    pub async fn snapshot(&self) -> FieldSnapshot {
        let mut readings: Vec<Reading> = self.readings.iter().map(|r| r.value().clone()).collect();
        readings.sort_by(|a, b| a.sensor_id.cmp(&b.sensor_id));

        FieldSnapshot {
            sensors: self.registry.list(),
            baselines: self.accumulator.all_snapshots(),
            readings,
            alerts: self.dispatcher.recent().await,
        }
    }
}
