pub mod actors;
pub mod analytics;
pub mod api;
pub mod config;
pub mod feed;
pub mod registry;
pub mod router;
pub mod source;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single ingested sensor reading: one timestamp, one record id, and a
/// scalar value per named stream.
///
/// `created_at` and `entry_id` are metadata fields; every key in `values`
/// is a stream name. Records are immutable once produced by the source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorRecord {
    pub created_at: DateTime<Utc>,
    pub entry_id: u64,

    /// Set by the ingest pipeline when a gap was filled. Control field,
    /// never treated as a stream.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub was_interpolated: Option<bool>,

    #[serde(flatten)]
    pub values: BTreeMap<String, f64>,
}

/// One sample of a single stream, as delivered inside a broadcast slice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamSample {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    pub entry_id: u64,
}

impl SensorRecord {
    /// Explode this record into per-stream samples.
    pub fn samples(&self) -> impl Iterator<Item = (&str, StreamSample)> {
        self.values.iter().map(|(name, value)| {
            (
                name.as_str(),
                StreamSample {
                    timestamp: self.created_at,
                    value: *value,
                    entry_id: self.entry_id,
                },
            )
        })
    }
}
