//! Dashboard presentation adapter.
//!
//! A dashboard is just another subscriber: it keeps its own copy of the
//! latest configuration and reading (replaced wholesale on each notification,
//! never edited in place) and turns them into display values. Rendering the
//! values is left to whatever front end consumes a [`DashboardFrame`].

use crate::broker::{Notification, SubscriptionBroker};
use crate::classifier::{Band, Classification, classify};
use crate::liveness::ConnectionTracker;
use crate::model::{Configuration, Reading};
use chrono::{Local, NaiveTime};
use log::info;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use strum::Display;
use tokio::time::{Duration, interval};
use tokio_util::sync::CancellationToken;

/// Characters per line on the device LCD.
pub const LCD_WIDTH: usize = 16;

/// Activity log entries kept per dashboard.
pub const LOG_CAPACITY: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
pub enum LogTag {
    #[strum(serialize = "RTDB")]
    #[serde(rename = "RTDB")]
    Data,
    #[strum(serialize = "ERROR")]
    #[serde(rename = "ERROR")]
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    pub at: String,
    pub tag: LogTag,
    pub message: String,
}

/// Everything a front end needs to draw one refresh of the dashboard.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardFrame {
    pub clock: String,
    pub lcd: [String; 2],
    pub moisture_percent: Option<u8>,
    pub bar_color: Option<&'static str>,
    pub relay: &'static str,
    pub classification: Option<Classification>,
    pub connected: bool,
    pub irrigation_forbidden: bool,
    pub window_label: String,
    pub humidity_min_percent: u8,
    pub watering_interval_minutes: u32,
}

pub fn bar_color(band: Band) -> &'static str {
    match band {
        Band::Dry => "#dc3545",
        Band::Ok => "#ffc107",
        Band::Saturated => "#28a745",
    }
}

fn lcd_line(text: &str) -> String {
    format!("{:<width$}", text, width = LCD_WIDTH)
}

pub struct DashboardView {
    config: Arc<Configuration>,
    reading: Option<Arc<Reading>>,
    connection: ConnectionTracker,
    log: VecDeque<LogEntry>,
}

impl Default for DashboardView {
    fn default() -> Self {
        Self::new()
    }
}

impl DashboardView {
    pub fn new() -> Self {
        Self {
            config: Arc::new(Configuration::default()),
            reading: None,
            connection: ConnectionTracker::new(),
            log: VecDeque::with_capacity(LOG_CAPACITY),
        }
    }

    pub fn config(&self) -> &Arc<Configuration> {
        &self.config
    }

    pub fn reading(&self) -> Option<&Arc<Reading>> {
        self.reading.as_ref()
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    /// Most recent entry first.
    pub fn log(&self) -> impl Iterator<Item = &LogEntry> {
        self.log.iter()
    }

    fn push_log(&mut self, now: NaiveTime, tag: LogTag, message: String) {
        self.log.push_front(LogEntry {
            at: now.format("%H:%M:%S").to_string(),
            tag,
            message,
        });
        self.log.truncate(LOG_CAPACITY);
    }

    pub fn apply(&mut self, notification: &Notification, now: NaiveTime) {
        self.connection.observe(notification);
        match notification {
            Notification::Snapshot { config, reading, .. } => {
                self.config = config.clone();
                self.reading = reading.clone();
                self.push_log(now, LogTag::Data, "Configuration updated in real time.".into());
                if let Some(r) = reading {
                    self.push_log(
                        now,
                        LogTag::Data,
                        format!("Data received: {}%", r.moisture_percent),
                    );
                }
            }
            Notification::Config(config) => {
                self.config = config.clone();
                self.push_log(now, LogTag::Data, "Configuration updated in real time.".into());
            }
            Notification::Reading(reading) => {
                self.reading = Some(reading.clone());
                self.push_log(
                    now,
                    LogTag::Data,
                    format!("Data received: {}%", reading.moisture_percent),
                );
            }
            Notification::DeliveryFailed => {
                self.push_log(now, LogTag::Error, "Sensor stream: updates were dropped".into());
            }
        }
    }

    /// Transport failure reported by whatever carries notifications.
    pub fn record_error(&mut self, message: &str, now: NaiveTime) {
        self.connection.mark_disconnected();
        self.push_log(now, LogTag::Error, format!("Sensor stream: {}", message));
    }

    pub fn classification(&self) -> Option<Classification> {
        self.reading.as_ref().map(|r| {
            classify(
                r.moisture_percent,
                self.config.humidity_min_percent,
                r.is_irrigating,
            )
        })
    }

    pub fn lcd_lines(&self) -> [String; 2] {
        match (&self.reading, self.classification()) {
            (Some(r), Some(c)) => [
                lcd_line(&format!("Moisture:{}%", r.moisture_percent)),
                lcd_line(c.display.status_text()),
            ],
            _ => [lcd_line("Moisture:--%"), lcd_line("Monitoring...")],
        }
    }

    pub fn relay_label(&self) -> &'static str {
        match &self.reading {
            Some(r) if r.is_irrigating => "ON (WATERING)",
            _ => "OFF",
        }
    }

    /// `now` must be a fresh local clock sample.
    pub fn window_label(&self, now: NaiveTime) -> String {
        let window = self.config.forbidden_window();
        if window.is_forbidden_at(now) {
            format!("Forbidden ({})", window)
        } else {
            "Watering allowed".to_string()
        }
    }

    pub fn frame(&self, now: NaiveTime) -> DashboardFrame {
        let classification = self.classification();
        DashboardFrame {
            clock: now.format("%H:%M:%S").to_string(),
            lcd: self.lcd_lines(),
            moisture_percent: self.reading.as_ref().map(|r| r.moisture_percent),
            bar_color: classification.map(|c| bar_color(c.band)),
            relay: self.relay_label(),
            classification,
            connected: self.is_connected(),
            irrigation_forbidden: self.config.forbidden_window().is_forbidden_at(now),
            window_label: self.window_label(now),
            humidity_min_percent: self.config.humidity_min_percent,
            watering_interval_minutes: self.config.watering_interval_minutes,
        }
    }
}

fn log_frame(frame: &DashboardFrame) {
    info!(
        "[Dashboard] {} |{}|{}| relay {} | {} | {}",
        frame.clock,
        frame.lcd[0],
        frame.lcd[1],
        frame.relay,
        if frame.connected { "connected" } else { "DISCONNECTED" },
        frame.window_label
    );
}

/// Local console dashboard: logs a frame on every notification and once a
/// minute so forbidden-window transitions show up without new data.
pub async fn run_console(broker: Arc<SubscriptionBroker>, cancel: CancellationToken) {
    let mut subscription = broker.subscribe();
    let mut view = DashboardView::new();
    let mut tick = interval(Duration::from_secs(60));

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            notification = subscription.recv() => {
                let Some(notification) = notification else { break };
                let now = Local::now().time();
                view.apply(&notification, now);
                log_frame(&view.frame(now));
            }
            _ = tick.tick() => {
                log_frame(&view.frame(Local::now().time()));
            }
        }
    }

    broker.unsubscribe(subscription);
    info!("[Dashboard] Console dashboard stopped");
}
