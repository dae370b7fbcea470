//! Simulated sensor feed
//!
//! Stands in for a real ingest pipeline during development and demos.
//! Generates one record per tick with a deterministic sine wave per
//! stream, phase-shifted so the streams are correlated but not identical.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::SensorRecord;
use crate::config::FeedConfig;
use crate::source::MemorySource;

/// Spawn a background task that pushes synthetic records into the source.
///
/// Each stream oscillates around its own baseline; the phase offset grows
/// with the stream's position so neighbouring streams stay strongly
/// correlated. Entry ids are sequential starting at one.
pub fn spawn_simulated_feed(source: Arc<MemorySource>, config: FeedConfig) -> JoinHandle<()> {
    info!(
        streams = config.streams.len(),
        interval_secs = config.interval_secs,
        "starting simulated feed"
    );

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(config.interval_secs.max(1)));
        let mut entry_id: u64 = 0;

        loop {
            ticker.tick().await;
            entry_id += 1;

            source.push(generate_record(&config.streams, entry_id)).await;
            debug!(entry_id, "pushed synthetic record");
        }
    })
}

fn generate_record(streams: &[String], entry_id: u64) -> SensorRecord {
    let t = entry_id as f64;

    let values = streams
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let baseline = 20.0 + 10.0 * i as f64;
            let phase = i as f64 * 0.5;
            let value = baseline + 5.0 * (t * 0.1 + phase).sin();
            (name.clone(), value)
        })
        .collect();

    SensorRecord {
        created_at: Utc::now(),
        entry_id,
        was_interpolated: None,
        values,
    }
}
