//! Moisture readings posted by the field device.

use crate::error::{Result, SyncError};
use serde::{Deserialize, Serialize};

/// A single telemetry sample.
///
/// `captured_at` is the device's own Unix timestamp (seconds). It may be
/// skewed or stale, so it is never used for ordering; arrival order is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reading {
    pub moisture_percent: u8,
    #[serde(default)]
    pub is_irrigating: bool,
    pub captured_at: i64,
}

/// Body of `POST /sensor`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadingSubmission {
    pub moisture_percent: Option<i64>,
    pub is_irrigating: Option<bool>,
    pub captured_at: Option<i64>,
}

impl ReadingSubmission {
    /// Validate and fill defaults. `received_at` (Unix seconds) is used when
    /// the device did not send a timestamp.
    pub fn into_reading(self, received_at: i64) -> Result<Reading> {
        let moisture = self
            .moisture_percent
            .ok_or_else(|| SyncError::invalid("moisturePercent is required"))?;
        let moisture_percent = u8::try_from(moisture)
            .ok()
            .filter(|m| *m <= 100)
            .ok_or_else(|| {
                SyncError::invalid(format!("moisturePercent out of range: {}", moisture))
            })?;

        Ok(Reading {
            moisture_percent,
            is_irrigating: self.is_irrigating.unwrap_or(false),
            captured_at: self.captured_at.unwrap_or(received_at),
        })
    }
}
