//! The report record sent once per tick, and its timestamp rendering.
//! Keep the serialized field names stable: they are the wire format.

use chrono::{NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::aggregate::Aggregate;
use crate::error::SensorError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub timestamp: String,
    pub sensor: String,
    /// Configured targets, configuration order.
    pub target: Vec<String>,
    pub usage: BTreeMap<String, f64>,
    #[serde(rename = "global_cpu_usage")]
    pub global_usage: f64,
}

impl Report {
    pub fn build(
        captured_at: &NaiveDateTime,
        sensor: &str,
        targets: &[String],
        aggregate: Aggregate,
    ) -> Self {
        Self {
            timestamp: format_timestamp(captured_at),
            sensor: sensor.to_string(),
            target: targets.to_vec(),
            usage: aggregate.per_target.into_iter().collect(),
            global_usage: aggregate.global,
        }
    }

    /// Compact JSON, one object, no trailing newline.
    pub fn to_json_bytes(&self) -> Result<Vec<u8>, SensorError> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// `2024-01-01 12:00:00.123456`; the fraction is dropped when it is exactly zero.
pub fn internal_timestamp(at: &NaiveDateTime) -> String {
    if at.nanosecond() / 1_000 == 0 {
        at.format("%Y-%m-%d %H:%M:%S").to_string()
    } else {
        at.format("%Y-%m-%d %H:%M:%S%.6f").to_string()
    }
}

/// Report form: the date/time separator becomes `T`, no timezone suffix.
pub fn format_timestamp(at: &NaiveDateTime) -> String {
    internal_timestamp(at).replacen(' ', "T", 1)
}

/// Inverse of the `T` substitution done by [`format_timestamp`].
pub fn to_internal_timestamp(report_ts: &str) -> String {
    report_ts.replacen('T', " ", 1)
}
