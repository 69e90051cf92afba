//! Irrigation sync library.
//!
//! Keeps the irrigation configuration and soil-moisture telemetry in a shared
//! store, evaluates the watering schedule and moisture thresholds, and pushes
//! every change to subscribed dashboards.

pub mod broker;
pub mod classifier;
pub mod clock;
pub mod config;
pub mod config_store;
pub mod dashboard;
pub mod error;
pub mod http;
pub mod instance_lock;
pub mod liveness;
pub mod model;
pub mod schedule;
pub mod service;
pub mod store;
pub mod telemetry;
