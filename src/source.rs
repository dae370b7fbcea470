//! Sample source abstraction
//!
//! The hub never owns sensor data; it reads bounded windows of it through
//! the `SampleSource` trait. The broadcast loop pulls the latest window on
//! every tick and the analytics engine pulls time-filtered slices per
//! request. Sources are read-only from the hub's point of view and must be
//! internally synchronized.

use std::collections::{BTreeSet, VecDeque};
use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::debug;

use crate::SensorRecord;

/// Result type alias for source operations
pub type SourceResult<T> = Result<T, SourceError>;

/// Errors that can occur while reading from a sample source
#[derive(Debug)]
pub enum SourceError {
    /// The backing store could not be reached
    Unavailable(String),

    /// A record could not be decoded
    MalformedRecord(String),

    /// I/O error (dataset file access, etc.)
    IoError(std::io::Error),
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceError::Unavailable(msg) => write!(f, "sample source unavailable: {}", msg),
            SourceError::MalformedRecord(msg) => write!(f, "malformed sensor record: {}", msg),
            SourceError::IoError(err) => write!(f, "I/O error: {}", err),
        }
    }
}

impl std::error::Error for SourceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SourceError::IoError(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for SourceError {
    fn from(err: std::io::Error) -> Self {
        SourceError::IoError(err)
    }
}

/// One scalar observation of a named stream, as handed to the analytics
/// engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamPoint {
    pub stream: String,
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    pub entry_id: u64,
}

/// Read-only access to sensor records
///
/// Implementations must be `Send + Sync`; the broadcast actor and the
/// analytics engine read concurrently. The hub never writes through this
/// trait.
#[async_trait]
pub trait SampleSource: Send + Sync {
    /// The `n` most recent records, oldest first.
    async fn latest_window(&self, n: usize) -> SourceResult<Vec<SensorRecord>>;

    /// All observations of the requested streams within `[from, to]`,
    /// ordered by timestamp. Streams a record does not carry are skipped.
    async fn records_in_window(
        &self,
        streams: &[String],
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> SourceResult<Vec<StreamPoint>>;

    /// Names of all streams present in the dataset, sorted. Metadata and
    /// control fields are never stream names.
    async fn stream_names(&self) -> SourceResult<Vec<String>>;
}

/// Maximum records kept in the in-memory ring buffer
const MAX_RECORDS: usize = 10_000;

/// In-memory sample source
///
/// A ring buffer of records, ordered by insertion. Used in production when
/// fed by the simulated feed or a preloaded dataset, and in tests as the
/// source stub. Oldest records are evicted once the buffer is full.
pub struct MemorySource {
    records: RwLock<VecDeque<SensorRecord>>,
    capacity: usize,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::with_capacity(MAX_RECORDS)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: RwLock::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity,
        }
    }

    /// Load a source from a JSON dataset file (an array of records).
    pub fn from_json_file(path: &Path) -> SourceResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let records: Vec<SensorRecord> = serde_json::from_str(&content)
            .map_err(|e| SourceError::MalformedRecord(e.to_string()))?;

        debug!("loaded {} records from {}", records.len(), path.display());

        Ok(Self {
            records: RwLock::new(records.into()),
            capacity: MAX_RECORDS,
        })
    }

    /// Append a record, evicting the oldest if the buffer is full.
    pub async fn push(&self, record: SensorRecord) {
        let mut records = self.records.write().await;
        if records.len() == self.capacity {
            records.pop_front();
        }
        records.push_back(record);
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

impl Default for MemorySource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SampleSource for MemorySource {
    async fn latest_window(&self, n: usize) -> SourceResult<Vec<SensorRecord>> {
        let records = self.records.read().await;
        let skip = records.len().saturating_sub(n);
        Ok(records.iter().skip(skip).cloned().collect())
    }

    async fn records_in_window(
        &self,
        streams: &[String],
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> SourceResult<Vec<StreamPoint>> {
        let records = self.records.read().await;

        let mut points = Vec::new();
        for record in records
            .iter()
            .filter(|r| r.created_at >= from && r.created_at <= to)
        {
            for stream in streams {
                if let Some(value) = record.values.get(stream) {
                    points.push(StreamPoint {
                        stream: stream.clone(),
                        timestamp: record.created_at,
                        value: *value,
                        entry_id: record.entry_id,
                    });
                }
            }
        }

        points.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        Ok(points)
    }

    async fn stream_names(&self) -> SourceResult<Vec<String>> {
        let records = self.records.read().await;

        let names: BTreeSet<String> = records
            .iter()
            .flat_map(|r| r.values.keys().cloned())
            .collect();

        Ok(names.into_iter().collect())
    }
}
