//! Sensor registry.

use acoustic_core::Sensor;
use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::error::{MonitorError, MonitorResult};

/// Input for [`SensorRegistry::register`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    /// Generated when absent.
    pub id: Option<String>,
    pub device_ref: Option<String>,
    pub name: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
}

impl RegisterRequest {
    pub fn new(device_ref: impl Into<String>) -> Self {
        Self {
            device_ref: Some(device_ref.into()),
            ..Self::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn at(mut self, lat: f64, lng: f64) -> Self {
        self.lat = Some(lat);
        self.lng = Some(lng);
        self
    }
}

/// Outcome of a registration.
#[derive(Debug, Clone, PartialEq)]
pub enum Registration {
    Created(Sensor),
    Updated(Sensor),
}

impl Registration {
    pub fn sensor(&self) -> &Sensor {
        match self {
            Registration::Created(sensor) | Registration::Updated(sensor) => sensor,
        }
    }

    pub fn into_sensor(self) -> Sensor {
        match self {
            Registration::Created(sensor) | Registration::Updated(sensor) => sensor,
        }
    }
}

/// Registered sensors keyed by id.
#[derive(Debug, Default)]
pub struct SensorRegistry {
    sensors: DashMap<String, Sensor>,
}

impl SensorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a sensor, or updates device/name/location of an existing id in place.
    pub fn register(&self, request: RegisterRequest) -> MonitorResult<Registration> {
        let device_ref = non_blank(request.device_ref)
            .ok_or_else(|| MonitorError::Validation("deviceRef is required".to_string()))?;
        if let Some(lat) = request.lat {
            if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
                return Err(MonitorError::Validation(format!("lat out of range: {lat}")));
            }
        }
        if let Some(lng) = request.lng {
            if !lng.is_finite() || !(-180.0..=180.0).contains(&lng) {
                return Err(MonitorError::Validation(format!("lng out of range: {lng}")));
            }
        }

        let id = non_blank(request.id).unwrap_or_else(|| format!("mic-{}", Uuid::new_v4().simple()));
        let name = non_blank(request.name).unwrap_or_else(|| device_ref.clone());

        let registration = match self.sensors.entry(id.clone()) {
            Entry::Occupied(mut occupied) => {
                let sensor = occupied.get_mut();
                sensor.device_ref = device_ref;
                sensor.name = name;
                sensor.lat = request.lat;
                sensor.lng = request.lng;
                Registration::Updated(sensor.clone())
            }
            Entry::Vacant(vacant) => {
                let sensor = Sensor {
                    id,
                    device_ref,
                    name,
                    lat: request.lat,
                    lng: request.lng,
                    registered_at: Utc::now(),
                };
                vacant.insert(sensor.clone());
                Registration::Created(sensor)
            }
        };

        let sensor = registration.sensor();
        info!(
            sensor_id = %sensor.id,
            device_ref = %sensor.device_ref,
            created = matches!(registration, Registration::Created(_)),
            "sensor registered"
        );
        Ok(registration)
    }

    pub fn unregister(&self, sensor_id: &str) -> MonitorResult<Sensor> {
        self.sensors
            .remove(sensor_id)
            .map(|(_, sensor)| sensor)
            .ok_or_else(|| MonitorError::NotFound(sensor_id.to_string()))
    }

    pub fn get(&self, sensor_id: &str) -> Option<Sensor> {
        self.sensors.get(sensor_id).map(|sensor| sensor.clone())
    }

    pub fn contains(&self, sensor_id: &str) -> bool {
        self.sensors.contains_key(sensor_id)
    }

    /// Runs `f` while the sensor entry is held, so a concurrent `unregister`
    /// cannot interleave with it.
    pub fn with_sensor<R>(&self, sensor_id: &str, f: impl FnOnce(&Sensor) -> R) -> Option<R> {
        self.sensors.get(sensor_id).map(|sensor| f(&sensor))
    }

    /// Snapshot ordered by registration time, then id.
    pub fn list(&self) -> Vec<Sensor> {
        let mut sensors: Vec<Sensor> = self.sensors.iter().map(|entry| entry.value().clone()).collect();
        sensors.sort_by(|a, b| a.registered_at.cmp(&b.registered_at).then_with(|| a.id.cmp(&b.id)));
        sensors
    }

    pub fn len(&self) -> usize {
        self.sensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sensors.is_empty()
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
