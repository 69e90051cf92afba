//! Subscription Broker: fans configuration and reading changes out to any
//! number of independent subscribers (dashboards).
//!
//! Every subscriber owns a bounded queue. Publishing never waits on a
//! subscriber: a full queue is a delivery failure for that subscriber only.
//! It is told so with [`Notification::DeliveryFailed`] and then receives a
//! [`SnapshotCause::Resync`] snapshot of the latest state, so the last value
//! always arrives even when intermediate ones were dropped.
//!
//! Publishing and subscribing take the same registry lock, so a new
//! subscriber sees either the old state in its initial snapshot followed by
//! the change, or the new state directly, never a gap.

use crate::error::SyncError;
use crate::model::{Configuration, Reading};
use log::{debug, info, warn};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc::{self, error::TrySendError};
use uuid::Uuid;

pub type SubscriberId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SnapshotCause {
    /// First notification after attaching.
    Initial,
    /// Sent after a delivery failure, once the queue has drained.
    Resync,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// Complete current state.
    Snapshot {
        cause: SnapshotCause,
        config: Arc<Configuration>,
        reading: Option<Arc<Reading>>,
    },
    Config(Arc<Configuration>),
    Reading(Arc<Reading>),
    /// One or more notifications for this subscriber were dropped.
    DeliveryFailed,
}

struct Slot {
    tx: mpsc::Sender<Notification>,
    lagged: Arc<AtomicBool>,
}

struct Registry {
    config: Arc<Configuration>,
    reading: Option<Arc<Reading>>,
    slots: HashMap<SubscriberId, Slot>,
}

impl Registry {
    fn snapshot(&self, cause: SnapshotCause) -> Notification {
        Notification::Snapshot {
            cause,
            config: self.config.clone(),
            reading: self.reading.clone(),
        }
    }

    fn fan_out(&mut self, notification: Notification) {
        self.slots.retain(|id, slot| match slot.tx.try_send(notification.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                if !slot.lagged.swap(true, Ordering::SeqCst) {
                    let failure = SyncError::DeliveryFailure {
                        subscriber: id.to_string(),
                        reason: "queue full".into(),
                    };
                    warn!("[Broker] {}", failure);
                }
                true
            }
            Err(TrySendError::Closed(_)) => {
                debug!("[Broker] Subscriber {} is gone, dropping it", id);
                false
            }
        });
    }
}

pub struct SubscriptionBroker {
    registry: Arc<Mutex<Registry>>,
    capacity: usize,
}

impl SubscriptionBroker {
    /// `capacity` is the per-subscriber queue length (at least 1).
    pub fn new(config: Configuration, reading: Option<Reading>, capacity: usize) -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry {
                config: Arc::new(config),
                reading: reading.map(Arc::new),
                slots: HashMap::new(),
            })),
            capacity: capacity.max(1),
        }
    }

    /// Attach a subscriber. Its queue already holds an initial snapshot.
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::channel(self.capacity);
        let id = Uuid::new_v4();
        let lagged = Arc::new(AtomicBool::new(false));

        let mut registry = self.registry.lock();
        // Fresh queue with capacity >= 1: cannot be full.
        let _ = tx.try_send(registry.snapshot(SnapshotCause::Initial));
        registry.slots.insert(
            id,
            Slot {
                tx,
                lagged: lagged.clone(),
            },
        );
        info!(
            "[Broker] Subscriber {} attached ({} active)",
            id,
            registry.slots.len()
        );

        Subscription {
            id,
            rx,
            lagged,
            resync_pending: false,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Detach a subscriber. Equivalent to dropping the handle.
    pub fn unsubscribe(&self, subscription: Subscription) {
        drop(subscription);
    }

    pub fn publish_config(&self, config: Arc<Configuration>) {
        let mut registry = self.registry.lock();
        registry.config = config.clone();
        registry.fan_out(Notification::Config(config));
    }

    pub fn publish_reading(&self, reading: Arc<Reading>) {
        let mut registry = self.registry.lock();
        registry.reading = Some(reading.clone());
        registry.fan_out(Notification::Reading(reading));
    }

    pub fn current_config(&self) -> Arc<Configuration> {
        self.registry.lock().config.clone()
    }

    pub fn current_reading(&self) -> Option<Arc<Reading>> {
        self.registry.lock().reading.clone()
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry.lock().slots.len()
    }
}

/// Handle held by one subscriber. Dropping it unsubscribes.
pub struct Subscription {
    id: SubscriberId,
    rx: mpsc::Receiver<Notification>,
    lagged: Arc<AtomicBool>,
    resync_pending: bool,
    registry: Weak<Mutex<Registry>>,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Next notification, waiting if none is queued. `None` once the broker
    /// is gone.
    pub async fn recv(&mut self) -> Option<Notification> {
        if let Some(n) = self.try_recv() {
            return Some(n);
        }
        // A delivery failure implies a full queue, so this wakes immediately
        // if one happens while waiting.
        self.rx.recv().await
    }

    /// Next notification if one is ready.
    pub fn try_recv(&mut self) -> Option<Notification> {
        if let Ok(n) = self.rx.try_recv() {
            return Some(n);
        }
        if self.resync_pending {
            self.resync_pending = false;
            let registry = self.registry.upgrade()?;
            let snapshot = registry.lock().snapshot(SnapshotCause::Resync);
            return Some(snapshot);
        }
        if self.lagged.swap(false, Ordering::SeqCst) {
            self.resync_pending = true;
            return Some(Notification::DeliveryFailed);
        }
        None
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            let mut registry = registry.lock();
            if registry.slots.remove(&self.id).is_some() {
                info!(
                    "[Broker] Subscriber {} detached ({} active)",
                    self.id,
                    registry.slots.len()
                );
            }
        }
    }
}
