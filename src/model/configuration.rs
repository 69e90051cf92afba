//! Irrigation configuration record and the client-submitted update.

use super::TimeOfDay;
use crate::config_store::{
    DEFAULT_HUMIDITY_MIN_PERCENT, DEFAULT_WATERING_INTERVAL_MINUTES, FORBIDDEN_WINDOW,
};
use crate::error::{Result, SyncError};
use crate::schedule::ForbiddenWindow;
use serde::{Deserialize, Serialize};

/// The canonical configuration record kept at the `config` path.
///
/// Values are immutable once handed out: consumers receive an `Arc` of a
/// fresh record on every change and replace their local copy wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Configuration {
    /// Moisture below this percentage is considered dry (0-100).
    pub humidity_min_percent: u8,
    /// Minimum time between two watering cycles on the device.
    pub watering_interval_minutes: u32,
    /// Inclusive start of the daily forbidden window.
    pub forbidden_window_start: TimeOfDay,
    /// Exclusive end of the daily forbidden window.
    pub forbidden_window_end: TimeOfDay,
    /// Server timestamp (Unix milliseconds) of the last accepted update.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated_at: Option<i64>,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            humidity_min_percent: DEFAULT_HUMIDITY_MIN_PERCENT,
            watering_interval_minutes: DEFAULT_WATERING_INTERVAL_MINUTES,
            forbidden_window_start: FORBIDDEN_WINDOW.start,
            forbidden_window_end: FORBIDDEN_WINDOW.end,
            last_updated_at: None,
        }
    }
}

impl Configuration {
    pub fn forbidden_window(&self) -> ForbiddenWindow {
        ForbiddenWindow {
            start: self.forbidden_window_start,
            end: self.forbidden_window_end,
        }
    }
}

/// Body of a configuration update as submitted by an operator.
///
/// Any forbidden-window fields present in the body are ignored: they are not
/// part of this type, and serde skips unknown fields.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigUpdate {
    pub humidity_min_percent: Option<i64>,
    pub watering_interval_minutes: Option<i64>,
}

/// A configuration update that passed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidConfigUpdate {
    pub humidity_min_percent: u8,
    pub watering_interval_minutes: u32,
}

impl ConfigUpdate {
    /// Both mutable fields are required; a single-field update is rejected.
    pub fn validate(&self) -> Result<ValidConfigUpdate> {
        let (Some(humidity), Some(interval)) =
            (self.humidity_min_percent, self.watering_interval_minutes)
        else {
            return Err(SyncError::invalid(
                "humidityMinPercent and wateringIntervalMinutes are required",
            ));
        };

        let humidity_min_percent = u8::try_from(humidity)
            .ok()
            .filter(|h| *h <= 100)
            .ok_or_else(|| {
                SyncError::invalid(format!("humidityMinPercent out of range: {}", humidity))
            })?;
        let watering_interval_minutes = u32::try_from(interval)
            .ok()
            .filter(|i| *i > 0)
            .ok_or_else(|| {
                SyncError::invalid(format!(
                    "wateringIntervalMinutes must be positive: {}",
                    interval
                ))
            })?;

        Ok(ValidConfigUpdate {
            humidity_min_percent,
            watering_interval_minutes,
        })
    }
}
