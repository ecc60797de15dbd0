use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::debug;

use crate::services::delivery::{DeliveryExecutor, ReminderPayload};

/// Deferred-execution facility: at most one pending action per key.
/// Registering under an existing key replaces the pending action so that
/// only the newest registration can ever fire.
pub trait DeferredExecutor: Send + Sync {
    fn register(&self, key: &str, delay: Duration, payload: ReminderPayload);
    fn unregister(&self, key: &str);
}

/// Tokio-backed registration table. Each registration is a spawned sleep
/// task; the key map is the single point of truth and all replace/cancel
/// decisions happen under its lock.
pub struct TokioDeferredExecutor {
    delivery: Arc<DeliveryExecutor>,
    registrations: Arc<Mutex<HashMap<String, Registration>>>,
    seq: AtomicU64,
}

struct Registration {
    seq: u64,
    handle: JoinHandle<()>,
}

impl TokioDeferredExecutor {
    pub fn new(delivery: Arc<DeliveryExecutor>) -> Self {
        Self {
            delivery,
            registrations: Arc::new(Mutex::new(HashMap::new())),
            seq: AtomicU64::new(0),
        }
    }

    pub fn is_registered(&self, key: &str) -> bool {
        self.entries().contains_key(key)
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, Registration>> {
        self.registrations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl DeferredExecutor for TokioDeferredExecutor {
    fn register(&self, key: &str, delay: Duration, payload: ReminderPayload) {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let delivery = Arc::clone(&self.delivery);
        let registrations = Arc::clone(&self.registrations);
        let owned_key = key.to_string();

        // Holding the map lock across spawn and insert keeps the new
        // entry in place before the fired task can attempt its cleanup.
        let mut entries = self.entries();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            delivery.fire(payload).await;

            // Cleanup only if this registration is still the live one;
            // a replacement may have taken the key while we were firing.
            let mut entries = registrations
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if entries.get(&owned_key).is_some_and(|r| r.seq == seq) {
                entries.remove(&owned_key);
            }
        });

        if let Some(previous) = entries.insert(key.to_string(), Registration { seq, handle }) {
            previous.handle.abort();
            debug!(key, "replaced pending registration");
        }
    }

    fn unregister(&self, key: &str) {
        if let Some(registration) = self.entries().remove(key) {
            registration.handle.abort();
            debug!(key, "cancelled pending registration");
        }
    }
}
