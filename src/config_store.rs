//! Config Store Adapter: the only writer of the `config` record.
//!
//! Reads fall back to the built-in defaults without persisting them. Updates
//! are validated before anything is touched, merged field by field into the
//! stored record with the forbidden window forced back to the server values,
//! stamped with the server clock, and published to every subscriber.

use crate::broker::SubscriptionBroker;
use crate::clock::Clock;
use crate::error::{Result, StoreError};
use crate::model::{ConfigUpdate, Configuration, TimeOfDay};
use crate::schedule::ForbiddenWindow;
use crate::store::{self, CONFIG_PATH, Store, WriteBatch};
use log::{error, info};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;

pub const DEFAULT_HUMIDITY_MIN_PERCENT: u8 = 25;
pub const DEFAULT_WATERING_INTERVAL_MINUTES: u32 = 60;

/// Server-owned forbidden window, re-asserted on every update.
pub const FORBIDDEN_WINDOW: ForbiddenWindow = ForbiddenWindow {
    start: hm(11, 0),
    end: hm(14, 30),
};

const fn hm(hour: u8, minute: u8) -> TimeOfDay {
    match TimeOfDay::new(hour, minute) {
        Some(t) => t,
        None => panic!("invalid time of day"),
    }
}

pub struct ConfigStoreAdapter {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    broker: Arc<SubscriptionBroker>,
    /// Serializes read-merge-persist-publish across concurrent updates.
    writer: Mutex<()>,
}

impl ConfigStoreAdapter {
    pub fn new(
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        broker: Arc<SubscriptionBroker>,
    ) -> Self {
        Self {
            store,
            clock,
            broker,
            writer: Mutex::new(()),
        }
    }

    /// Current configuration, or the defaults if none was ever saved.
    pub async fn get_config(&self) -> Result<Configuration> {
        load(self.store.as_ref()).await
    }

    /// Merge `update` into the stored record and notify subscribers.
    ///
    /// Fails with `InvalidInput` before any read or write when either mutable
    /// field is missing or out of range.
    pub async fn update_config(&self, update: &ConfigUpdate) -> Result<Arc<Configuration>> {
        let valid = update.validate()?;

        let _guard = self.writer.lock().await;
        // Raw read: the update overwrites every typed field, so a stored
        // record that no longer decodes must not block it.
        let previous = match self.store.get(CONFIG_PATH).await {
            Ok(previous) => previous,
            Err(e) => {
                error!("[Config] Failed to read configuration: {}", e);
                return Err(e.into());
            }
        };

        let merged = Configuration {
            humidity_min_percent: valid.humidity_min_percent,
            watering_interval_minutes: valid.watering_interval_minutes,
            forbidden_window_start: FORBIDDEN_WINDOW.start,
            forbidden_window_end: FORBIDDEN_WINDOW.end,
            last_updated_at: Some(self.clock.now_millis()),
        };

        let Value::Object(fields) = serde_json::to_value(&merged)? else {
            return Err(StoreError::NotAnObject(CONFIG_PATH.to_string()).into());
        };
        if let Err(e) = self.store.apply(WriteBatch::new().merge(CONFIG_PATH, fields)).await {
            error!("[Config] Failed to save configuration: {}", e);
            return Err(e.into());
        }

        let field = |name: &str| {
            previous
                .as_ref()
                .and_then(|p| p.get(name))
                .map_or_else(|| "unset".to_string(), Value::to_string)
        };
        info!(
            "[Config] Saved: humidityMinPercent {} -> {}, wateringIntervalMinutes {} -> {}",
            field("humidityMinPercent"),
            merged.humidity_min_percent,
            field("wateringIntervalMinutes"),
            merged.watering_interval_minutes
        );

        let merged = Arc::new(merged);
        self.broker.publish_config(merged.clone());
        Ok(merged)
    }
}

/// Read the configuration record, completing missing fields from defaults.
pub(crate) async fn load(store: &dyn Store) -> Result<Configuration> {
    match store::read_record::<Configuration>(store, CONFIG_PATH).await {
        Ok(Some(cfg)) => Ok(cfg),
        Ok(None) => Ok(Configuration::default()),
        Err(e) => {
            error!("[Config] Failed to read configuration: {}", e);
            Err(e.into())
        }
    }
}
