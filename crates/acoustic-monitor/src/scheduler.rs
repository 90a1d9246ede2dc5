//! Recording scheduler.
//!
//! Every attached sensor gets a long-lived baseline task. While the sensor's
//! accumulation is establishing, the task records short clips back to back;
//! otherwise it parks until woken or stopped. A separate global tick samples
//! every sensor with a longer clip. Both paths take the sensor's capture lease
//! with `try_acquire`, so at most one recording per sensor is ever in flight
//! and a busy sensor is skipped rather than waited on.

use std::sync::Arc;
use std::time::Duration;

use acoustic_core::{ReadingSource, Sensor};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, Notify, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at, sleep};
use tracing::{debug, info, warn};

use crate::context::{CycleError, MonitorContext};
use crate::lease::CaptureLease;

/// Where a sensor's baseline task currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureState {
    /// Ready for the next capture.
    Idle,
    /// A recording for this sensor is in flight, from either path.
    Capturing,
    /// Waiting out a transient failure.
    Backoff,
    /// Not establishing; the baseline task is parked.
    Stopped,
}

struct SensorControl {
    stop: watch::Sender<bool>,
    wake: Arc<Notify>,
}

struct SchedulerShared {
    ctx: Arc<MonitorContext>,
    controls: DashMap<String, SensorControl>,
    // Resting state written only by the sensor's own baseline task.
    states: DashMap<String, CaptureState>,
}

pub(crate) struct RecordingScheduler {
    shared: Arc<SchedulerShared>,
    tick: Mutex<Option<JoinHandle<()>>>,
}

impl RecordingScheduler {
    pub fn new(ctx: Arc<MonitorContext>) -> Self {
        Self {
            shared: Arc::new(SchedulerShared {
                ctx,
                controls: DashMap::new(),
                states: DashMap::new(),
            }),
            tick: Mutex::new(None),
        }
    }

    /// Spawns the sensor's baseline task. A sensor that is already attached
    /// keeps its running task.
    pub fn attach(&self, sensor_id: &str) {
        let shared = &self.shared;
        let Entry::Vacant(vacant) = shared.controls.entry(sensor_id.to_string()) else {
            return;
        };

        let (stop_tx, stop_rx) = watch::channel(false);
        let wake = Arc::new(Notify::new());
        vacant.insert(SensorControl {
            stop: stop_tx,
            wake: wake.clone(),
        });
        shared.states.insert(sensor_id.to_string(), CaptureState::Idle);

        tokio::spawn(baseline_loop(
            shared.clone(),
            sensor_id.to_string(),
            stop_rx,
            wake,
        ));
        debug!(sensor_id, "baseline task attached");
    }

    /// Wakes a parked baseline task after its accumulation was restarted.
    pub fn start_baseline(&self, sensor_id: &str) {
        if let Some(control) = self.shared.controls.get(sensor_id) {
            control.wake.notify_one();
        }
    }

    /// Signals the baseline task to stop. A capture already in flight runs to
    /// completion and its result is dropped.
    pub fn detach(&self, sensor_id: &str) {
        if let Some((_, control)) = self.shared.controls.remove(sensor_id) {
            control.stop.send_replace(true);
            debug!(sensor_id, "baseline task detached");
        }
        self.shared.states.remove(sensor_id);
    }

    /// Starts the periodic sampling tick. The first tick fires one full
    /// interval after the call.
    pub async fn start(&self) {
        let mut tick = self.tick.lock().await;
        if tick.is_some() {
            warn!("periodic sampling already running");
            return;
        }

        let shared = self.shared.clone();
        let period = shared.ctx.config.sample_interval;
        *tick = Some(tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let started = shared.trigger_sampling();
                debug!(started, "sampling tick");
            }
        }));
        info!(interval_secs = period.as_secs(), "periodic sampling started");
    }

    /// Stops the tick and every baseline task.
    pub async fn shutdown(&self) {
        if let Some(handle) = self.tick.lock().await.take() {
            handle.abort();
        }

        let ids: Vec<String> = self
            .shared
            .controls
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        for id in &ids {
            self.detach(id);
        }
        info!(sensors = ids.len(), "scheduler stopped");
    }

    /// Runs one periodic pass immediately; returns how many captures started.
    pub fn trigger_sampling(&self) -> usize {
        self.shared.trigger_sampling()
    }

    pub fn capture_state(&self, sensor_id: &str) -> Option<CaptureState> {
        let resting = *self.shared.states.get(sensor_id)?;
        if self.shared.ctx.locks.is_capturing(sensor_id) {
            Some(CaptureState::Capturing)
        } else {
            Some(resting)
        }
    }
}

impl SchedulerShared {
    fn trigger_sampling(self: &Arc<Self>) -> usize {
        let mut started = 0;
        for sensor in self.ctx.store.registry.list() {
            let stop = match self.controls.get(&sensor.id) {
                Some(control) if !*control.stop.borrow() => control.stop.subscribe(),
                _ => continue,
            };
            let Some(lease) = self.ctx.locks.try_acquire(&sensor.id) else {
                debug!(sensor_id = %sensor.id, "sensor busy, skipping sample");
                continue;
            };

            tokio::spawn(self.clone().sample(sensor, lease, stop));
            started += 1;
        }
        started
    }

    async fn sample(self: Arc<Self>, sensor: Sensor, lease: CaptureLease, stop: watch::Receiver<bool>) {
        let ctx = &self.ctx;
        let result = ctx
            .capture_and_classify(&sensor, ctx.config.sample_clip)
            .await;
        drop(lease);

        if *stop.borrow() {
            debug!(sensor_id = %sensor.id, "sensor detached during sample, result dropped");
            ctx.locks.release(&sensor.id);
            return;
        }

        match result {
            Ok(classification) => {
                let reading = ctx.score(&sensor.id, classification, ReadingSource::Periodic);
                debug!(
                    sensor_id = %sensor.id,
                    confidence = reading.confidence,
                    deviation = reading.baseline_deviation,
                    "periodic reading"
                );
                ctx.record_reading(&sensor, reading).await;
            }
            Err(e) => warn!(sensor_id = %sensor.id, error = %e, "periodic sample failed"),
        }
    }

    fn set_state(&self, sensor_id: &str, state: CaptureState) {
        // Only update entries still present; a detached sensor stays removed.
        if let Some(mut current) = self.states.get_mut(sensor_id) {
            *current = state;
        }
    }
}

async fn baseline_loop(
    shared: Arc<SchedulerShared>,
    sensor_id: String,
    mut stop: watch::Receiver<bool>,
    wake: Arc<Notify>,
) {
    let ctx = &shared.ctx;
    let config = &ctx.config;

    loop {
        if *stop.borrow() {
            break;
        }

        if !ctx.store.accumulator.is_establishing(&sensor_id) {
            shared.set_state(&sensor_id, CaptureState::Stopped);
            tokio::select! {
                _ = wake.notified() => {}
                changed = stop.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
            continue;
        }

        let Some(lease) = ctx.locks.try_acquire(&sensor_id) else {
            if pause(&mut stop, config.busy_retry_delay).await {
                break;
            }
            continue;
        };
        let Some(sensor) = ctx.store.registry.get(&sensor_id) else {
            break;
        };

        let result = ctx.capture_and_classify(&sensor, config.baseline_clip).await;
        drop(lease);

        if *stop.borrow() || !ctx.store.accumulator.is_establishing(&sensor_id) {
            debug!(sensor_id = %sensor_id, "baseline stopped during capture, sample dropped");
            continue;
        }

        let delay = match result {
            Ok(classification) => {
                let features = ctx.resolve_features(&sensor_id, &classification.features);
                let baseline = ctx.store.accumulator.add_sample(&sensor_id, &features);
                ctx.publish_baseline(baseline).await;
                shared.set_state(&sensor_id, CaptureState::Idle);
                config.baseline_rearm_delay
            }
            Err(CycleError::Capture(e)) if e.is_unavailable() => {
                warn!(
                    sensor_id = %sensor_id,
                    error = %e,
                    "audio capture unavailable, falling back to synthetic baseline"
                );
                let baseline = ctx
                    .store
                    .accumulator
                    .degrade(&sensor_id, config.synthetic_profile);
                ctx.publish_baseline(baseline).await;
                continue;
            }
            Err(e) => {
                warn!(sensor_id = %sensor_id, error = %e, "baseline capture failed, retrying");
                shared.set_state(&sensor_id, CaptureState::Backoff);
                config.retry_backoff
            }
        };

        if pause(&mut stop, delay).await {
            break;
        }
    }

    ctx.locks.release(&sensor_id);
    debug!(sensor_id = %sensor_id, "baseline task exited");
}

/// Sleeps for `duration`; returns `true` if the stop signal fired meanwhile.
async fn pause(stop: &mut watch::Receiver<bool>, duration: Duration) -> bool {
    tokio::select! {
        _ = sleep(duration) => *stop.borrow(),
        changed = stop.changed() => changed.is_err() || *stop.borrow(),
    }
}
