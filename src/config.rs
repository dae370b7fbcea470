use std::net::SocketAddr;
use std::path::PathBuf;

use tracing::trace;

/// Hub configuration, loaded from a JSON file.
///
/// Every field has a default, so an empty object (or no config file at all)
/// yields a working hub with the reference timings: broadcast every 5s over
/// the last 10 samples, heartbeat probe every 10s with a 30s timeout.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    /// Bind address for the WebSocket/REST server
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,

    /// Enable CORS for browser dashboards
    #[serde(default = "default_true")]
    pub enable_cors: bool,

    /// Broadcast tick period in seconds
    #[serde(default = "default_broadcast_interval")]
    pub broadcast_interval_secs: u64,

    /// Number of most recent samples pushed per tick
    #[serde(default = "default_window_len")]
    pub window_len: usize,

    /// Heartbeat probe period in seconds
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,

    /// Seconds of client silence before eviction
    #[serde(default = "default_heartbeat_timeout")]
    pub heartbeat_timeout_secs: u64,

    #[serde(default)]
    pub analytics: AnalyticsConfig,

    /// Optional JSON dataset to preload into the sample source
    pub dataset: Option<PathBuf>,

    /// Optional simulated sensor feed (stands in for the ingest pipeline)
    pub feed: Option<FeedConfig>,
}

/// Tunables for the analytics engine.
///
/// The z-score threshold of 3 and the 0.2 outlier margin are compatibility
/// defaults inherited from existing clients; they are configurable but
/// should not be changed lightly.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct AnalyticsConfig {
    /// |z| above this flags a sample as anomalous
    #[serde(default = "default_z_threshold")]
    pub z_score_threshold: f64,

    /// Fallback outlier cutoff: average correlation minus this margin
    #[serde(default = "default_outlier_margin")]
    pub outlier_margin: f64,

    /// Minimum streams required for a correlation request
    #[serde(default = "default_min_correlation_streams")]
    pub min_correlation_streams: usize,

    /// Upper bound on points fetched per analysis request
    #[serde(default = "default_max_analysis_points")]
    pub max_analysis_points: usize,
}

/// Simulated sensor feed configuration.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct FeedConfig {
    /// Seconds between generated records
    #[serde(default = "default_feed_interval")]
    pub interval_secs: u64,

    /// Stream names to generate values for
    #[serde(default = "default_feed_streams")]
    pub streams: Vec<String>,
}

fn default_bind_addr() -> SocketAddr {
    "127.0.0.1:8080".parse().expect("static bind address")
}

fn default_true() -> bool {
    true
}

fn default_broadcast_interval() -> u64 {
    5
}

fn default_window_len() -> usize {
    10
}

fn default_heartbeat_interval() -> u64 {
    10
}

fn default_heartbeat_timeout() -> u64 {
    30
}

fn default_z_threshold() -> f64 {
    3.0
}

fn default_outlier_margin() -> f64 {
    0.2
}

fn default_min_correlation_streams() -> usize {
    3
}

fn default_max_analysis_points() -> usize {
    50_000
}

fn default_feed_interval() -> u64 {
    1
}

fn default_feed_streams() -> Vec<String> {
    vec![
        "temperature".to_string(),
        "humidity".to_string(),
        "pressure".to_string(),
    ]
}

impl Default for Config {
    fn default() -> Self {
        serde_json::from_str("{}").expect("empty config must deserialize")
    }
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            z_score_threshold: default_z_threshold(),
            outlier_margin: default_outlier_margin(),
            min_correlation_streams: default_min_correlation_streams(),
            max_analysis_points: default_max_analysis_points(),
        }
    }
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content = std::fs::read_to_string(path)?;
    serde_json::from_str(&file_content)
        .map_err(|_| anyhow::anyhow!("Invalid configuration file provided!"))
        .inspect(|config| trace!("loaded config: {config:?}"))
}
