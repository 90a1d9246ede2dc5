//! Event stream payloads published to dashboard subscribers.

use serde::{Deserialize, Serialize};

use crate::{Alert, Baseline, Reading, Sensor};

/// Complete monitor state, replayed to every subscriber on connect.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldSnapshot {
    pub sensors: Vec<Sensor>,
    pub baselines: Vec<Baseline>,
    pub readings: Vec<Reading>,
    /// Most recent first.
    pub alerts: Vec<Alert>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "kebab-case")]
pub enum MonitorEvent {
    FullSnapshot(FieldSnapshot),
    ReadingUpdate(Reading),
    BaselineUpdate(Baseline),
    NewAlert(Alert),
    SensorRegistered(Sensor),
    SensorRemoved {
        #[serde(rename = "sensorId")]
        sensor_id: String,
    },
}

impl MonitorEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            MonitorEvent::FullSnapshot(_) => "full-snapshot",
            MonitorEvent::ReadingUpdate(_) => "reading-update",
            MonitorEvent::BaselineUpdate(_) => "baseline-update",
            MonitorEvent::NewAlert(_) => "new-alert",
            MonitorEvent::SensorRegistered(_) => "sensor-registered",
            MonitorEvent::SensorRemoved { .. } => "sensor-removed",
        }
    }

    /// Sensor the event concerns, if it concerns exactly one.
    pub fn sensor_id(&self) -> Option<&str> {
        match self {
            MonitorEvent::FullSnapshot(_) => None,
            MonitorEvent::ReadingUpdate(reading) => Some(&reading.sensor_id),
            MonitorEvent::BaselineUpdate(baseline) => Some(&baseline.sensor_id),
            MonitorEvent::NewAlert(alert) => Some(&alert.sensor_id),
            MonitorEvent::SensorRegistered(sensor) => Some(&sensor.id),
            MonitorEvent::SensorRemoved { sensor_id } => Some(sensor_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_tag_matches_event_type() {
        let event = MonitorEvent::SensorRemoved {
            sensor_id: "mic-7".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["event"], event.event_type());
        assert_eq!(json["payload"]["sensorId"], "mic-7");
        assert_eq!(event.sensor_id(), Some("mic-7"));
    }

    #[test]
    fn full_snapshot_serializes_with_kebab_tag() {
        let event = MonitorEvent::FullSnapshot(FieldSnapshot::default());
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["event"], "full-snapshot");
        assert!(json["payload"]["alerts"].as_array().unwrap().is_empty());
        assert_eq!(event.sensor_id(), None);
    }
}
