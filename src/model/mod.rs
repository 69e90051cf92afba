//! Data model shared by the adapters, the broker and the dashboards.
//!
//! All records serialize with camelCase field names, matching the documents
//! kept in the store and the JSON bodies exchanged over HTTP.

pub mod configuration;
pub mod reading;
pub mod time_of_day;

pub use configuration::{ConfigUpdate, Configuration, ValidConfigUpdate};
pub use reading::{Reading, ReadingSubmission};
pub use time_of_day::{ParseTimeOfDayError, TimeOfDay};
