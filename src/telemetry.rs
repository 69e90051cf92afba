//! Telemetry Ingest: the only writer of the reading history and the current
//! reading slot.
//!
//! One ingest appends to `sensor/readings` and overwrites `sensor/current` in
//! a single store batch, then publishes. Ingests are serialized, so arrival
//! order decides both the history order and which reading is current,
//! whatever the device timestamps say.

use crate::broker::SubscriptionBroker;
use crate::clock::Clock;
use crate::error::Result;
use crate::model::{Reading, ReadingSubmission};
use crate::store::{self, CURRENT_READING_PATH, READINGS_PATH, Store, WriteBatch};
use log::{debug, error};
use std::sync::Arc;
use tokio::sync::Mutex;

pub struct TelemetryIngest {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    broker: Arc<SubscriptionBroker>,
    writer: Mutex<()>,
}

impl TelemetryIngest {
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

    /// Record a reading. Validation happens before anything is written.
    pub async fn ingest(&self, submission: ReadingSubmission) -> Result<Arc<Reading>> {
        let reading = submission.into_reading(self.clock.now_secs())?;
        let value = serde_json::to_value(&reading)?;

        let _guard = self.writer.lock().await;
        let batch = WriteBatch::new()
            .push(READINGS_PATH, value.clone())
            .set(CURRENT_READING_PATH, value);
        let key = match self.store.apply(batch).await {
            Ok(keys) => keys.into_iter().next().unwrap_or_default(),
            Err(e) => {
                error!("[Ingest] Failed to store reading: {}", e);
                return Err(e.into());
            }
        };

        debug!(
            "[Ingest] Reading {}: moisture={}% irrigating={} capturedAt={}",
            key, reading.moisture_percent, reading.is_irrigating, reading.captured_at
        );

        let reading = Arc::new(reading);
        self.broker.publish_reading(reading.clone());
        Ok(reading)
    }

    /// Most recently arrived reading, if any.
    pub async fn current(&self) -> Result<Option<Reading>> {
        Ok(store::read_record(self.store.as_ref(), CURRENT_READING_PATH).await?)
    }

    /// Every reading in arrival order.
    pub async fn history(&self) -> Result<Vec<Reading>> {
        Ok(store::read_list(self.store.as_ref(), READINGS_PATH).await?)
    }
}
