//! Per-sensor baseline accumulation.
//!
//! Aggregates are exact over every sample ever added to an accumulation; only
//! the raw sample window is bounded. Stopping freezes nothing but the
//! `establishing` flag, and a later start keeps appending to the same history.

use std::collections::VecDeque;

use acoustic_core::{AcousticProfile, Baseline, FeatureSample, FeatureVector, ProfileAccumulator};
use chrono::{DateTime, Utc};
use dashmap::DashMap;

#[derive(Debug, Clone)]
struct BaselineAccumulation {
    samples: VecDeque<FeatureSample>,
    stats: ProfileAccumulator,
    started_at: DateTime<Utc>,
    establishing: bool,
    synthetic: Option<AcousticProfile>,
    last_update: DateTime<Utc>,
}

impl BaselineAccumulation {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            samples: VecDeque::new(),
            stats: ProfileAccumulator::new(),
            started_at: now,
            establishing: true,
            synthetic: None,
            last_update: now,
        }
    }
}

#[derive(Debug)]
pub struct BaselineAccumulator {
    accumulations: DashMap<String, BaselineAccumulation>,
    history_limit: usize,
    seconds_per_sample: f64,
}

impl BaselineAccumulator {
    /// `seconds_per_sample` is the clip length each sample stands for.
    pub fn new(history_limit: usize, seconds_per_sample: f64) -> Self {
        Self {
            accumulations: DashMap::new(),
            history_limit: history_limit.max(1),
            seconds_per_sample,
        }
    }

    /// Creates the accumulation or resumes an existing one.
    pub fn start(&self, sensor_id: &str) {
        let now = Utc::now();
        self.accumulations
            .entry(sensor_id.to_string())
            .and_modify(|acc| {
                acc.establishing = true;
                acc.last_update = now;
            })
            .or_insert_with(|| BaselineAccumulation::new(now));
    }

    /// Appends a sample and returns the refreshed snapshot.
    ///
    /// Samples are accepted whether or not the accumulation is establishing;
    /// `None` means the sensor has no accumulation.
    pub fn add_sample(&self, sensor_id: &str, features: &impl FeatureVector) -> Option<Baseline> {
        let mut acc = self.accumulations.get_mut(sensor_id)?;
        let now = Utc::now();
        let sample = FeatureSample::new(now, features);

        acc.stats.push(&sample);
        acc.samples.push_back(sample);
        while acc.samples.len() > self.history_limit {
            acc.samples.pop_front();
        }
        acc.last_update = now;

        self.build(sensor_id, &acc)
    }

    /// Frozen view of the accumulation; absent until it has samples or a
    /// synthetic profile.
    pub fn snapshot(&self, sensor_id: &str) -> Option<Baseline> {
        let acc = self.accumulations.get(sensor_id)?;
        self.build(sensor_id, &acc)
    }

    /// Clears `establishing` and returns the snapshot at that moment.
    pub fn stop(&self, sensor_id: &str) -> Option<Baseline> {
        let mut acc = self.accumulations.get_mut(sensor_id)?;
        acc.establishing = false;
        acc.last_update = Utc::now();
        self.build(sensor_id, &acc)
    }

    pub fn is_establishing(&self, sensor_id: &str) -> bool {
        self.accumulations
            .get(sensor_id)
            .map(|acc| acc.establishing)
            .unwrap_or(false)
    }

    /// Stops the accumulation and attaches `profile` as a stand-in for sensors
    /// that cannot capture. Real samples, once present, take precedence.
    pub fn degrade(&self, sensor_id: &str, profile: AcousticProfile) -> Option<Baseline> {
        let mut acc = self.accumulations.get_mut(sensor_id)?;
        acc.establishing = false;
        acc.synthetic = Some(profile);
        acc.last_update = Utc::now();
        self.build(sensor_id, &acc)
    }

    pub fn remove(&self, sensor_id: &str) -> bool {
        self.accumulations.remove(sensor_id).is_some()
    }

    pub fn contains(&self, sensor_id: &str) -> bool {
        self.accumulations.contains_key(sensor_id)
    }

    /// Retained raw samples, oldest first.
    pub fn samples(&self, sensor_id: &str) -> Vec<FeatureSample> {
        self.accumulations
            .get(sensor_id)
            .map(|acc| acc.samples.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn all_snapshots(&self) -> Vec<Baseline> {
        let mut baselines: Vec<Baseline> = self
            .accumulations
            .iter()
            .filter_map(|entry| self.build(entry.key(), entry.value()))
            .collect();
        baselines.sort_by(|a, b| a.sensor_id.cmp(&b.sensor_id));
        baselines
    }

    fn build(&self, sensor_id: &str, acc: &BaselineAccumulation) -> Option<Baseline> {
        let (profile, sample_count, synthetic) = match (acc.stats.profile(), acc.synthetic) {
            (Some(profile), _) => (profile, acc.stats.count(), false),
            (None, Some(profile)) => (profile, 0, true),
            (None, None) => return None,
        };

        Some(Baseline {
            sensor_id: sensor_id.to_string(),
            established_at: acc.started_at,
            is_establishing: acc.establishing,
            total_seconds: sample_count as f64 * self.seconds_per_sample,
            profile,
            sample_count,
            last_update: acc.last_update,
            synthetic,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use acoustic_core::AcousticFeatures;
    use approx::assert_relative_eq;

    fn freq(hz: f64) -> AcousticFeatures {
        AcousticFeatures::new(hz, 0.2, 2600.0, 0.1)
    }

    #[test]
    fn snapshot_is_absent_without_samples() {
        let acc = BaselineAccumulator::new(100, 1.0);
        assert!(acc.snapshot("mic-1").is_none());

        acc.start("mic-1");
        assert!(acc.is_establishing("mic-1"));
        assert!(acc.snapshot("mic-1").is_none());
    }

    #[test]
    fn aggregates_follow_samples() {
        let acc = BaselineAccumulator::new(100, 1.0);
        acc.start("mic-1");
        for hz in [1000.0, 1100.0, 1200.0] {
            acc.add_sample("mic-1", &freq(hz));
        }

        let baseline = acc.snapshot("mic-1").unwrap();
        assert_relative_eq!(baseline.profile.frequency.mean, 1100.0);
        assert_eq!(baseline.profile.frequency.min, 1000.0);
        assert_eq!(baseline.profile.frequency.max, 1200.0);
        assert_eq!(baseline.sample_count, 3);
        assert_relative_eq!(baseline.total_seconds, 3.0);
        assert!(baseline.is_establishing);
        assert!(!baseline.synthetic);
    }

    #[test]
    fn add_sample_without_accumulation_is_ignored() {
        let acc = BaselineAccumulator::new(100, 1.0);
        assert!(acc.add_sample("ghost", &freq(1000.0)).is_none());
        assert!(!acc.contains("ghost"));
    }

    #[test]
    fn restart_keeps_appending() {
        let acc = BaselineAccumulator::new(100, 1.0);
        acc.start("mic-1");
        acc.add_sample("mic-1", &freq(1000.0));

        let stopped = acc.stop("mic-1").unwrap();
        assert!(!stopped.is_establishing);
        assert_eq!(stopped.sample_count, 1);

        acc.start("mic-1");
        let resumed = acc.add_sample("mic-1", &freq(1200.0)).unwrap();
        assert_eq!(resumed.sample_count, 2);
        assert_relative_eq!(resumed.profile.frequency.mean, 1100.0);
        assert_eq!(resumed.established_at, stopped.established_at);
    }

    #[test]
    fn sample_window_is_bounded_but_stats_are_exact() {
        let acc = BaselineAccumulator::new(2, 1.0);
        acc.start("mic-1");
        for hz in [1000.0, 2000.0, 3000.0, 4000.0] {
            acc.add_sample("mic-1", &freq(hz));
        }

        let samples = acc.samples("mic-1");
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].frequency, 3000.0);

        let baseline = acc.snapshot("mic-1").unwrap();
        assert_eq!(baseline.sample_count, 4);
        assert_eq!(baseline.profile.frequency.min, 1000.0);
        assert_relative_eq!(baseline.profile.frequency.mean, 2500.0);
    }

    #[test]
    fn degrade_emits_synthetic_profile_until_real_samples_arrive() {
        let acc = BaselineAccumulator::new(100, 1.0);
        acc.start("mic-1");

        let synthetic = acc.degrade("mic-1", AcousticProfile::nominal()).unwrap();
        assert!(synthetic.synthetic);
        assert_eq!(synthetic.sample_count, 0);
        assert!(!synthetic.is_establishing);
        assert!(!acc.is_establishing("mic-1"));

        let real = acc.add_sample("mic-1", &freq(1000.0)).unwrap();
        assert!(!real.synthetic);
        assert_eq!(real.sample_count, 1);
    }

    #[test]
    fn remove_discards_history() {
        let acc = BaselineAccumulator::new(100, 1.0);
        acc.start("mic-1");
        acc.add_sample("mic-1", &freq(1000.0));

        assert!(acc.remove("mic-1"));
        assert!(acc.snapshot("mic-1").is_none());
        assert!(acc.samples("mic-1").is_empty());
        assert!(acc.all_snapshots().is_empty());
    }
}
