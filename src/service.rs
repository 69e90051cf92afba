//! Wires the store, the two adapters and the broker together.

use crate::broker::{Subscription, SubscriptionBroker};
use crate::clock::Clock;
use crate::config_store::{self, ConfigStoreAdapter};
use crate::error::{Result, StoreError, SyncError};
use crate::model::{ConfigUpdate, Configuration, Reading, ReadingSubmission};
use crate::store::{self, CURRENT_READING_PATH, Store};
use crate::telemetry::TelemetryIngest;
use log::{info, warn};
use std::sync::Arc;

pub struct IrrigationService {
    broker: Arc<SubscriptionBroker>,
    config: ConfigStoreAdapter,
    telemetry: TelemetryIngest,
}

impl IrrigationService {
    /// Load the current state from `store` and seed the broker with it so
    /// that the first subscriber already gets a complete snapshot.
    pub async fn open(
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        queue_capacity: usize,
    ) -> Result<Self> {
        let config = match config_store::load(store.as_ref()).await {
            Ok(config) => config,
            // The next update rewrites every field, so start from defaults.
            Err(SyncError::StoreUnavailable(StoreError::Corrupt { path, .. })) => {
                warn!("[Service] Record at {} does not decode, using defaults", path);
                Configuration::default()
            }
            Err(e) => return Err(e),
        };
        let reading: Option<Reading> =
            store::read_record(store.as_ref(), CURRENT_READING_PATH).await?;

        info!(
            "[Service] Loaded configuration (humidityMinPercent={}, window={}), current reading: {}",
            config.humidity_min_percent,
            config.forbidden_window(),
            reading
                .as_ref()
                .map(|r| format!("{}%", r.moisture_percent))
                .unwrap_or_else(|| "none".into())
        );

        let broker = Arc::new(SubscriptionBroker::new(config, reading, queue_capacity));
        Ok(Self {
            config: ConfigStoreAdapter::new(store.clone(), clock.clone(), broker.clone()),
            telemetry: TelemetryIngest::new(store, clock, broker.clone()),
            broker,
        })
    }

    pub fn broker(&self) -> &Arc<SubscriptionBroker> {
        &self.broker
    }

    pub async fn get_config(&self) -> Result<Configuration> {
        self.config.get_config().await
    }

    pub async fn update_config(&self, update: &ConfigUpdate) -> Result<Arc<Configuration>> {
        self.config.update_config(update).await
    }

    pub async fn ingest(&self, submission: ReadingSubmission) -> Result<Arc<Reading>> {
        self.telemetry.ingest(submission).await
    }

    pub async fn current_reading(&self) -> Result<Option<Reading>> {
        self.telemetry.current().await
    }

    pub async fn history(&self) -> Result<Vec<Reading>> {
        self.telemetry.history().await
    }

    pub fn subscribe(&self) -> Subscription {
        self.broker.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::Notification;
    use crate::clock::SystemClock;
    use crate::store::MemoryStore;

    async fn service(store: Arc<dyn Store>) -> IrrigationService {
        IrrigationService::open(store, Arc::new(SystemClock), 8)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_late_subscriber_gets_latest_state() {
        let svc = service(Arc::new(MemoryStore::new())).await;
        for m in [10, 20, 30] {
            svc.ingest(ReadingSubmission {
                moisture_percent: Some(m),
                ..Default::default()
            })
            .await
            .unwrap();
        }
        svc.update_config(&ConfigUpdate {
            humidity_min_percent: Some(35),
            watering_interval_minutes: Some(90),
        })
        .await
        .unwrap();

        let mut sub = svc.subscribe();
        match sub.try_recv() {
            Some(Notification::Snapshot {
                config,
                reading: Some(reading),
                ..
            }) => {
                assert_eq!(config.humidity_min_percent, 35);
                assert_eq!(config.watering_interval_minutes, 90);
                assert_eq!(reading.moisture_percent, 30);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_open_survives_undecodable_config() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        store
            .apply(store::WriteBatch::new().set(
                store::CONFIG_PATH,
                serde_json::json!({ "forbiddenWindowStart": "11h" }),
            ))
            .await
            .unwrap();

        let svc = service(store).await;
        assert_eq!(*svc.broker().current_config(), Configuration::default());

        let saved = svc
            .update_config(&ConfigUpdate {
                humidity_min_percent: Some(30),
                watering_interval_minutes: Some(45),
            })
            .await
            .unwrap();
        assert_eq!(svc.get_config().await.unwrap(), *saved);
    }

    #[tokio::test]
    async fn test_reopen_seeds_broker_from_store() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        {
            let svc = service(store.clone()).await;
            svc.ingest(ReadingSubmission {
                moisture_percent: Some(55),
                is_irrigating: Some(true),
                captured_at: Some(1),
            })
            .await
            .unwrap();
        }

        let svc = service(store).await;
        let current = svc.broker().current_reading().unwrap();
        assert_eq!(current.moisture_percent, 55);
        assert!(current.is_irrigating);
        assert_eq!(svc.history().await.unwrap().len(), 1);
    }
}
