//! Per-sensor capture exclusion.
//!
//! Both the baseline loop and the periodic tick must hold a [`CaptureLease`]
//! for a sensor before recording from it. Leases are only ever taken with
//! `try_acquire`, so a busy sensor is skipped instead of waited on.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::trace;

#[derive(Debug, Default)]
pub struct CaptureLocks {
    // An entry stays while any lease or pending acquire still holds its lock,
    // so a sensor re-registered under the same id contends with a capture
    // still in flight for the old registration.
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl CaptureLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_acquire(&self, sensor_id: &str) -> Option<CaptureLease> {
        let lock = self
            .locks
            .entry(sensor_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let guard = lock.try_lock_owned().ok()?;
        trace!(sensor_id, "capture lease acquired");
        Some(CaptureLease {
            sensor_id: sensor_id.to_string(),
            _guard: guard,
        })
    }

    /// Forgets the sensor's lock unless a lease still holds it. Returns whether
    /// the entry was removed.
    pub fn release(&self, sensor_id: &str) -> bool {
        let removed = self
            .locks
            .remove_if(sensor_id, |_, lock| Arc::strong_count(lock) == 1)
            .is_some();
        if removed {
            trace!(sensor_id, "capture lock released");
        }
        removed
    }

    pub fn is_capturing(&self, sensor_id: &str) -> bool {
        self.locks
            .get(sensor_id)
            .map(|lock| lock.try_lock().is_err())
            .unwrap_or(false)
    }
}

/// Exclusive right to capture from one sensor; released on drop.
#[derive(Debug)]
pub struct CaptureLease {
    sensor_id: String,
    _guard: OwnedMutexGuard<()>,
}

impl CaptureLease {
    pub fn sensor_id(&self) -> &str {
        &self.sensor_id
    }
}

impl Drop for CaptureLease {
    fn drop(&mut self) {
        trace!(sensor_id = %self.sensor_id, "capture lease released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_lease_is_refused_until_release() {
        let locks = CaptureLocks::new();
        let lease = locks.try_acquire("mic-1").unwrap();
        assert_eq!(lease.sensor_id(), "mic-1");
        assert!(locks.is_capturing("mic-1"));
        assert!(locks.try_acquire("mic-1").is_none());

        drop(lease);
        assert!(!locks.is_capturing("mic-1"));
        assert!(locks.try_acquire("mic-1").is_some());
    }

    #[test]
    fn sensors_do_not_block_each_other() {
        let locks = CaptureLocks::new();
        let _a = locks.try_acquire("mic-1").unwrap();
        assert!(locks.try_acquire("mic-2").is_some());
        assert!(!locks.is_capturing("mic-3"));
    }

    #[test]
    fn release_keeps_lock_while_a_lease_is_held() {
        let locks = CaptureLocks::new();
        let lease = locks.try_acquire("mic-1").unwrap();

        assert!(!locks.release("mic-1"));
        assert!(locks.try_acquire("mic-1").is_none());

        drop(lease);
        assert!(locks.release("mic-1"));
        assert!(locks.locks.is_empty());
        assert!(!locks.release("mic-1"));
    }

    #[test]
    fn churn_does_not_grow_the_lock_table() {
        let locks = CaptureLocks::new();
        for n in 0..100 {
            let id = format!("mic-{n}");
            drop(locks.try_acquire(&id));
            locks.release(&id);
        }
        assert!(locks.locks.is_empty());
    }
}
