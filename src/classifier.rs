//! Moisture classification.
//!
//! Maps a reading and the configured dry threshold to a semantic band and the
//! status a dashboard should display. No I/O.

use serde::Serialize;
use strum::{AsRefStr, Display};

/// Upper bound of the `Ok` band, enforced by the field device firmware.
///
/// Independent of the configured threshold.
pub const SATURATION_LIMIT_PERCENT: u8 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr, Serialize)]
pub enum Band {
    Dry,
    Ok,
    Saturated,
}

impl Band {
    /// `< min` is dry, `> 60` is saturated, anything in between is ok.
    ///
    /// When `min > 60` the dry check wins for values below `min`.
    pub fn of(moisture_percent: u8, humidity_min_percent: u8) -> Self {
        if moisture_percent < humidity_min_percent {
            Band::Dry
        } else if moisture_percent > SATURATION_LIMIT_PERCENT {
            Band::Saturated
        } else {
            Band::Ok
        }
    }
}

/// What a dashboard shows as the authoritative status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr, Serialize)]
pub enum DisplayState {
    Irrigating,
    Dry,
    Ok,
    Saturated,
}

impl DisplayState {
    pub fn status_text(self) -> &'static str {
        match self {
            DisplayState::Irrigating => "Pump on",
            DisplayState::Dry => "Soil dry! Water!",
            DisplayState::Saturated => "Soil soaked!",
            DisplayState::Ok => "Moisture OK.",
        }
    }
}

impl From<Band> for DisplayState {
    fn from(band: Band) -> Self {
        match band {
            Band::Dry => DisplayState::Dry,
            Band::Ok => DisplayState::Ok,
            Band::Saturated => DisplayState::Saturated,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub band: Band,
    pub display: DisplayState,
}

/// Classify a reading. Active irrigation overrides the displayed state but
/// not the band.
pub fn classify(
    moisture_percent: u8,
    humidity_min_percent: u8,
    is_irrigating: bool,
) -> Classification {
    let band = Band::of(moisture_percent, humidity_min_percent);
    let display = if is_irrigating {
        DisplayState::Irrigating
    } else {
        band.into()
    };
    Classification { band, display }
}
