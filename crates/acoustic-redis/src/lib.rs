//! # Acoustic Redis
//!
//! This crate defines how the monitor state is laid out in Redis and provides
//! functions for mirroring it there, so dashboards running in another process
//! can read sensors, baselines, latest readings and the alert history.
use acoustic_core::{Alert, Baseline, FieldSnapshot, MonitorEvent, Reading, Sensor};
use anyhow::Result;
use redis::{Client, Commands, Connection};
use serde::{Deserialize, Serialize};

pub const ALERTS_KEY: &str = "acoustic:alerts";

// --- Key Builders ---

pub fn sensor_key(sensor_id: &str) -> String {
    format!("acoustic:sensor:{}", sensor_id)
}

pub fn baseline_key(sensor_id: &str) -> String {
    format!("acoustic:baseline:{}", sensor_id)
}

pub fn reading_key(sensor_id: &str) -> String {
    format!("acoustic:reading:{}", sensor_id)
}

// --- Generic I/O Helpers ---

fn write_struct<T: Serialize>(con: &mut Connection, key: &str, value: &T) -> Result<()> {
    let json_string = serde_json::to_string(value)?;
    con.set::<_, _, ()>(key, json_string)?;
    Ok(())
}

fn read_optional<T: for<'de> Deserialize<'de>>(con: &mut Connection, key: &str) -> Result<Option<T>> {
    let json_string: Option<String> = con.get(key)?;
    match json_string {
        Some(json) => Ok(Some(serde_json::from_str(&json)?)),
        None => Ok(None),
    }
}

// --- Read/Write Functions ---

pub fn write_sensor(con: &mut Connection, sensor: &Sensor) -> Result<()> {
    write_struct(con, &sensor_key(&sensor.id), sensor)
}

pub fn read_sensor(con: &mut Connection, sensor_id: &str) -> Result<Option<Sensor>> {
    read_optional(con, &sensor_key(sensor_id))
}

pub fn get_all_sensors(con: &mut Connection) -> Result<Vec<Sensor>> {
    let mut sensors = Vec::new();
    let keys: Vec<String> = con.keys("acoustic:sensor:*")?;
    if keys.is_empty() {
        return Ok(sensors);
    }
    let values: Vec<String> = con.get(keys)?;
    for val in values {
        let sensor: Sensor = serde_json::from_str(&val)?;
        sensors.push(sensor);
    }
    sensors.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(sensors)
}

pub fn write_baseline(con: &mut Connection, baseline: &Baseline) -> Result<()> {
    write_struct(con, &baseline_key(&baseline.sensor_id), baseline)
}

pub fn read_baseline(con: &mut Connection, sensor_id: &str) -> Result<Option<Baseline>> {
    read_optional(con, &baseline_key(sensor_id))
}

/// Stores the latest reading; it expires after `ttl_seconds` unless overwritten.
pub fn write_reading(con: &mut Connection, reading: &Reading, ttl_seconds: usize) -> Result<()> {
    let key = reading_key(&reading.sensor_id);
    write_struct(con, &key, reading)?;
    con.expire::<_, ()>(&key, ttl_seconds as i64)?;
    Ok(())
}

pub fn read_reading(con: &mut Connection, sensor_id: &str) -> Result<Option<Reading>> {
    read_optional(con, &reading_key(sensor_id))
}

/// Prepends an alert and trims the list to `capacity` entries, oldest dropped.
pub fn push_alert(con: &mut Connection, alert: &Alert, capacity: usize) -> Result<()> {
    let json_string = serde_json::to_string(alert)?;
    redis::pipe()
        .atomic()
        .lpush(ALERTS_KEY, json_string)
        .ignore()
        .ltrim(ALERTS_KEY, 0, capacity.saturating_sub(1) as isize)
        .ignore()
        .query::<()>(con)?;
    Ok(())
}

/// Alert history, most recent first.
pub fn read_alerts(con: &mut Connection) -> Result<Vec<Alert>> {
    let values: Vec<String> = con.lrange(ALERTS_KEY, 0, -1)?;
    let mut alerts = Vec::with_capacity(values.len());
    for val in values {
        alerts.push(serde_json::from_str(&val)?);
    }
    Ok(alerts)
}

/// Deletes the sensor record together with its baseline and reading.
pub fn remove_sensor_state(con: &mut Connection, sensor_id: &str) -> Result<()> {
    let keys = vec![
        sensor_key(sensor_id),
        baseline_key(sensor_id),
        reading_key(sensor_id),
    ];
    con.del::<_, ()>(keys)?;
    Ok(())
}

/// Replaces everything under `acoustic:*` with the given snapshot.
pub fn write_snapshot(
    con: &mut Connection,
    snapshot: &FieldSnapshot,
    reading_ttl_seconds: usize,
    alert_capacity: usize,
) -> Result<()> {
    let stale: Vec<String> = con.keys("acoustic:*")?;
    if !stale.is_empty() {
        con.del::<_, ()>(stale)?;
    }
    for sensor in &snapshot.sensors {
        write_sensor(con, sensor)?;
    }
    for baseline in &snapshot.baselines {
        write_baseline(con, baseline)?;
    }
    for reading in &snapshot.readings {
        write_reading(con, reading, reading_ttl_seconds)?;
    }
    // History is most-recent-first; push oldest first so the order survives LPUSH.
    for alert in snapshot.alerts.iter().rev() {
        push_alert(con, alert, alert_capacity)?;
    }
    Ok(())
}

// --- Event Mirror ---

/// Applies monitor events to Redis as they are published.
pub struct StateMirror {
    con: Connection,
    alert_capacity: usize,
    reading_ttl_seconds: usize,
}

impl StateMirror {
    pub fn new(con: Connection, alert_capacity: usize, reading_ttl_seconds: usize) -> Self {
        StateMirror {
            con,
            alert_capacity,
            reading_ttl_seconds,
        }
    }

    pub fn connect(redis_url: &str, alert_capacity: usize, reading_ttl_seconds: usize) -> Result<Self> {
        let client = Client::open(redis_url)?;
        let con = client.get_connection()?;
        Ok(Self::new(con, alert_capacity, reading_ttl_seconds))
    }

    pub fn apply(&mut self, event: &MonitorEvent) -> Result<()> {
        let con = &mut self.con;
        match event {
            MonitorEvent::FullSnapshot(snapshot) => {
                write_snapshot(con, snapshot, self.reading_ttl_seconds, self.alert_capacity)
            }
            MonitorEvent::ReadingUpdate(reading) => write_reading(con, reading, self.reading_ttl_seconds),
            MonitorEvent::BaselineUpdate(baseline) => write_baseline(con, baseline),
            MonitorEvent::NewAlert(alert) => push_alert(con, alert, self.alert_capacity),
            MonitorEvent::SensorRegistered(sensor) => write_sensor(con, sensor),
            MonitorEvent::SensorRemoved { sensor_id } => remove_sensor_state(con, sensor_id),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use acoustic_core::{AcousticFeatures, ReadingSource};
    use chrono::Utc;

    // NOTE: These tests require a running Redis server on the default port (6379).
    // Run them with `cargo test -- --ignored`.

    fn get_redis_connection() -> Connection {
        let client = Client::open("redis://127.0.0.1/").unwrap();
        client.get_connection().unwrap()
    }

    fn flush_db() {
        let mut con = get_redis_connection();
        redis::cmd("FLUSHDB").execute(&mut con);
    }

    fn sensor(id: &str) -> Sensor {
        Sensor {
            id: id.to_string(),
            device_ref: "hw:1,0".to_string(),
            name: "North Field Mic".to_string(),
            lat: Some(40.7128),
            lng: Some(-74.006),
            registered_at: Utc::now(),
        }
    }

    fn alert(id: u64) -> Alert {
        Alert {
            id,
            timestamp: Utc::now(),
            sensor_id: "mic-1".to_string(),
            sensor_name: None,
            pest_candidates: vec![],
            severity: 0.5,
            confidence: 0.7,
            location: None,
        }
    }

    #[test]
    fn test_key_builders() {
        assert_eq!(sensor_key("mic-1"), "acoustic:sensor:mic-1");
        assert_eq!(baseline_key("mic-1"), "acoustic:baseline:mic-1");
        assert_eq!(reading_key("mic-1"), "acoustic:reading:mic-1");
        assert_eq!(ALERTS_KEY, "acoustic:alerts");
    }

    #[test]
    #[ignore]
    fn test_sensor_io_and_removal() {
        flush_db();
        let mut con = get_redis_connection();

        let s = sensor("mic-alpha");
        write_sensor(&mut con, &s).unwrap();
        assert_eq!(read_sensor(&mut con, "mic-alpha").unwrap(), Some(s.clone()));
        assert_eq!(get_all_sensors(&mut con).unwrap(), vec![s]);

        remove_sensor_state(&mut con, "mic-alpha").unwrap();
        assert_eq!(read_sensor(&mut con, "mic-alpha").unwrap(), None);
    }

    #[test]
    #[ignore]
    fn test_reading_expires() {
        flush_db();
        let mut con = get_redis_connection();

        let reading = Reading {
            sensor_id: "mic-beta".to_string(),
            timestamp: Utc::now(),
            confidence: 0.4,
            baseline_deviation: 0.1,
            pest_candidates: vec![],
            features: AcousticFeatures::new(1200.0, 0.2, 2600.0, 0.1),
            source: ReadingSource::Periodic,
        };
        write_reading(&mut con, &reading, 10).unwrap();

        assert_eq!(read_reading(&mut con, "mic-beta").unwrap(), Some(reading));
        let ttl: isize = con.ttl(reading_key("mic-beta")).unwrap();
        assert!(ttl > 0 && ttl <= 10);
    }

    #[test]
    #[ignore]
    fn test_alert_list_is_bounded() {
        flush_db();
        let mut con = get_redis_connection();

        for id in 1..=5 {
            push_alert(&mut con, &alert(id), 3).unwrap();
        }

        let ids: Vec<u64> = read_alerts(&mut con).unwrap().iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![5, 4, 3]);
    }

    #[test]
    #[ignore]
    fn test_mirror_applies_snapshot() {
        flush_db();
        let mut mirror = StateMirror::connect("redis://127.0.0.1/", 50, 60).unwrap();

        let snapshot = FieldSnapshot {
            sensors: vec![sensor("mic-1"), sensor("mic-2")],
            baselines: vec![],
            readings: vec![],
            alerts: vec![alert(2), alert(1)],
        };
        mirror.apply(&MonitorEvent::FullSnapshot(snapshot)).unwrap();
        mirror
            .apply(&MonitorEvent::SensorRemoved { sensor_id: "mic-2".to_string() })
            .unwrap();

        let mut con = get_redis_connection();
        let ids: Vec<String> = get_all_sensors(&mut con).unwrap().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["mic-1".to_string()]);
        let alert_ids: Vec<u64> = read_alerts(&mut con).unwrap().iter().map(|a| a.id).collect();
        assert_eq!(alert_ids, vec![2, 1]);
    }
}
