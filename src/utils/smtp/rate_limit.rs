//! Spacing of probes per (source, destination) pair.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

type Slot = Arc<tokio::sync::Mutex<Option<Instant>>>;

/// Key count above which idle slots are dropped on the next insert.
const PRUNE_ABOVE: usize = 1024;

/// Lets at most one probe per `interval` through for each key. Callers for
/// the same key queue on that key's async mutex; other keys are unaffected.
#[derive(Debug)]
pub struct RateGate {
    interval: Duration,
    slots: Mutex<HashMap<String, Slot>>,
}

impl RateGate {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn key(source: &str, destination: &str) -> String {
        format!("{}|{}", source, destination)
    }

    /// Waits until `key` may send again, then records the send.
    pub async fn wait(&self, key: &str) {
        if self.interval.is_zero() {
            return;
        }
        let slot = {
            let mut slots = self.slots.lock();
            if slots.len() >= PRUNE_ABOVE && !slots.contains_key(key) {
                self.prune(&mut slots);
            }
            slots.entry(key.to_string()).or_default().clone()
        };

        let mut last = slot.lock().await;
        if let Some(previous) = *last {
            let ready_at = previous + self.interval;
            if ready_at > Instant::now() {
                tracing::debug!(target: "smtp_task", "Rate limiting {} for {:?}", key, ready_at - Instant::now());
                tokio::time::sleep_until(ready_at).await;
            }
        }
        *last = Some(Instant::now());
    }

    /// Drops slots nobody is waiting on whose interval has already passed;
    /// they no longer constrain anything.
    fn prune(&self, slots: &mut HashMap<String, Slot>) {
        let now = Instant::now();
        let before = slots.len();
        slots.retain(|_, slot| {
            if Arc::strong_count(slot) > 1 {
                return true;
            }
            match slot.try_lock() {
                Ok(last) => (*last).map_or(false, |at| at + self.interval > now),
                Err(_) => true,
            }
        });
        tracing::trace!(target: "smtp_task", "Pruned {} idle rate slots", before - slots.len());
    }

    pub fn tracked_keys(&self) -> usize {
        self.slots.lock().len()
    }
}
