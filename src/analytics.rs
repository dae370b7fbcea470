//! Analytics engine
//!
//! On-demand statistical analyses over a time-windowed slice of the
//! dataset: mean pairwise Pearson correlation with outlier flagging, and
//! z-score anomaly detection. Both run synchronously per client request,
//! read only through the `SampleSource`, and never touch the connection
//! registry, so analysis cannot stall the broadcast loop.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::config::AnalyticsConfig;
use crate::source::{SampleSource, SourceError, StreamPoint};

/// Minimum matching records in the window for a correlation to be
/// statistically meaningful.
const MIN_CORRELATION_RECORDS: usize = 3;

/// Errors produced by analysis requests.
///
/// Everything except `Source` is a client-input error and is reported back
/// to the requesting client as a typed error reply.
#[derive(Debug)]
pub enum AnalyticsError {
    /// Too few streams requested for the algorithm
    InsufficientStreams { required: usize, got: usize },

    /// Too few matching records in the window
    InsufficientData { required: usize, got: usize },

    /// No records at all after filtering
    EmptyWindow,

    /// The window would exceed the configured analysis bound
    WindowTooLarge { max: usize, got: usize },

    /// Requested algorithm is not supported
    UnknownAlgorithm(String),

    /// The sample source failed
    Source(SourceError),
}

impl fmt::Display for AnalyticsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalyticsError::InsufficientStreams { required, got } => write!(
                f,
                "at least {} streams are required for correlation analysis, got {}",
                required, got
            ),
            AnalyticsError::InsufficientData { required, got } => write!(
                f,
                "insufficient data for correlation analysis: need {} records, found {}",
                required, got
            ),
            AnalyticsError::EmptyWindow => {
                write!(f, "no data found for the specified streams and time window")
            }
            AnalyticsError::WindowTooLarge { max, got } => write!(
                f,
                "analysis window too large: {} points exceeds the limit of {}",
                got, max
            ),
            AnalyticsError::UnknownAlgorithm(name) => {
                write!(f, "unknown anomaly detection algorithm: {}", name)
            }
            AnalyticsError::Source(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for AnalyticsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AnalyticsError::Source(err) => Some(err),
            _ => None,
        }
    }
}

impl From<SourceError> for AnalyticsError {
    fn from(err: SourceError) -> Self {
        AnalyticsError::Source(err)
    }
}

/// Per-stream correlation summary
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamCorrelation {
    /// Mean pairwise Pearson coefficient against the other requested streams
    pub avg_corr: f64,
    pub is_outlier: bool,
}

/// Result of a correlation request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelationReport {
    pub streams: BTreeMap<String, StreamCorrelation>,
    /// Distinct records that fell inside the window
    pub sample_size: usize,
}

/// One annotated observation from an anomaly detection run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnomalyPoint {
    pub stream: String,
    pub timestamp: DateTime<Utc>,
    pub entry_id: u64,
    pub value: f64,
    pub z_score: f64,
    pub is_anomaly: bool,
}

/// Result of an anomaly detection request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnomalyReport {
    pub data: Vec<AnomalyPoint>,
    pub anomaly_count: usize,
    /// Distinct records that fell inside the window
    pub total_points: usize,
    pub anomaly_percentage: f64,
    pub algorithm_used: String,
}

pub struct AnalyticsEngine {
    source: Arc<dyn SampleSource>,
    config: AnalyticsConfig,
}

impl AnalyticsEngine {
    pub fn new(source: Arc<dyn SampleSource>, config: AnalyticsConfig) -> Self {
        Self { source, config }
    }

    /// Mean pairwise Pearson correlation per requested stream.
    ///
    /// Each stream is flagged as an outlier when its average correlation
    /// falls below the explicit threshold, or, absent one, below its own
    /// average minus the configured margin. The fallback is a heuristic
    /// contract of existing clients and is preserved as-is.
    pub async fn correlation(
        &self,
        streams: &[String],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        threshold: Option<f64>,
    ) -> Result<CorrelationReport, AnalyticsError> {
        let required = self.config.min_correlation_streams;
        if streams.len() < required {
            return Err(AnalyticsError::InsufficientStreams {
                required,
                got: streams.len(),
            });
        }

        let series = self.fetch_series(streams, start, end).await?;

        let sample_size = distinct_records(&series);
        if sample_size < MIN_CORRELATION_RECORDS {
            return Err(AnalyticsError::InsufficientData {
                required: MIN_CORRELATION_RECORDS,
                got: sample_size,
            });
        }

        let mut report = BTreeMap::new();
        for stream in streams {
            let mut coefficients = Vec::new();
            for other in streams.iter().filter(|other| *other != stream) {
                let (x, y) = align_series(&series, stream, other);
                if !x.is_empty() {
                    coefficients.push(pearson(&x, &y));
                }
            }

            let avg_corr = if coefficients.is_empty() {
                0.0
            } else {
                coefficients.iter().sum::<f64>() / coefficients.len() as f64
            };

            let cutoff = threshold.unwrap_or(avg_corr - self.config.outlier_margin);
            report.insert(
                stream.clone(),
                StreamCorrelation {
                    avg_corr,
                    is_outlier: avg_corr < cutoff,
                },
            );
        }

        debug!(
            streams = streams.len(),
            sample_size, "correlation analysis complete"
        );

        Ok(CorrelationReport {
            streams: report,
            sample_size,
        })
    }

    /// Z-score anomaly detection over the window.
    ///
    /// Every observation is annotated with `(value - mean) / std` computed
    /// per stream; a zero standard deviation defines z as 0 rather than
    /// dividing by it. `threshold` overrides the configured |z| cutoff.
    pub async fn anomaly_detection(
        &self,
        streams: &[String],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        threshold: Option<f64>,
        algorithm: Option<&str>,
    ) -> Result<AnomalyReport, AnalyticsError> {
        let algorithm = algorithm.unwrap_or("z_score");
        if algorithm != "z_score" {
            return Err(AnalyticsError::UnknownAlgorithm(algorithm.to_string()));
        }

        if streams.is_empty() {
            return Err(AnalyticsError::InsufficientStreams {
                required: 1,
                got: 0,
            });
        }

        let series = self.fetch_series(streams, start, end).await?;
        if series.is_empty() {
            return Err(AnalyticsError::EmptyWindow);
        }

        let cutoff = threshold.unwrap_or(self.config.z_score_threshold);

        let mut data = Vec::new();
        let mut anomaly_count = 0;
        for (stream, points) in &series {
            let values: Vec<f64> = points.iter().map(|p| p.value).collect();
            let (mean, std) = mean_and_std(&values);

            for point in points {
                let z_score = if std == 0.0 {
                    0.0
                } else {
                    (point.value - mean) / std
                };
                let is_anomaly = z_score.abs() > cutoff;
                if is_anomaly {
                    anomaly_count += 1;
                }

                data.push(AnomalyPoint {
                    stream: stream.clone(),
                    timestamp: point.timestamp,
                    entry_id: point.entry_id,
                    value: point.value,
                    z_score,
                    is_anomaly,
                });
            }
        }

        data.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.stream.cmp(&b.stream))
        });

        // denominator is the record count in the window, not the number of
        // annotated observations; a multi-stream request must not dilute
        // the percentage by the stream count
        let total_points = distinct_records(&series);
        let anomaly_percentage = (anomaly_count as f64 / total_points as f64) * 100.0;

        debug!(
            total_points,
            anomaly_count, "anomaly detection complete"
        );

        Ok(AnomalyReport {
            data,
            anomaly_count,
            total_points,
            anomaly_percentage,
            algorithm_used: algorithm.to_string(),
        })
    }

    /// Fetch the window and pivot it into per-stream series.
    async fn fetch_series(
        &self,
        streams: &[String],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<BTreeMap<String, Vec<StreamPoint>>, AnalyticsError> {
        let points = self.source.records_in_window(streams, start, end).await?;

        if points.len() > self.config.max_analysis_points {
            return Err(AnalyticsError::WindowTooLarge {
                max: self.config.max_analysis_points,
                got: points.len(),
            });
        }

        let mut series: BTreeMap<String, Vec<StreamPoint>> = BTreeMap::new();
        for point in points {
            series.entry(point.stream.clone()).or_default().push(point);
        }
        Ok(series)
    }
}

fn distinct_records(series: &BTreeMap<String, Vec<StreamPoint>>) -> usize {
    series
        .values()
        .flatten()
        .map(|p| p.entry_id)
        .collect::<BTreeSet<_>>()
        .len()
}

/// Pair up two streams' values by record id so partially missing streams
/// still correlate over their shared records.
fn align_series(
    series: &BTreeMap<String, Vec<StreamPoint>>,
    a: &str,
    b: &str,
) -> (Vec<f64>, Vec<f64>) {
    let (Some(a_points), Some(b_points)) = (series.get(a), series.get(b)) else {
        return (Vec::new(), Vec::new());
    };

    let b_by_entry: HashMap<u64, f64> = b_points.iter().map(|p| (p.entry_id, p.value)).collect();

    let mut x = Vec::new();
    let mut y = Vec::new();
    for point in a_points {
        if let Some(b_value) = b_by_entry.get(&point.entry_id) {
            x.push(point.value);
            y.push(*b_value);
        }
    }
    (x, y)
}

/// Pearson correlation coefficient of two equal-length series.
///
/// Defined as 0 when either series has no variance: no variance carries no
/// correlation signal, and propagating NaN would poison downstream
/// averaging.
pub fn pearson(x: &[f64], y: &[f64]) -> f64 {
    if x.len() != y.len() || x.is_empty() {
        return 0.0;
    }

    let n = x.len() as f64;
    let sum_x: f64 = x.iter().sum();
    let sum_y: f64 = y.iter().sum();
    let sum_xy: f64 = x.iter().zip(y.iter()).map(|(a, b)| a * b).sum();
    let sum_x2: f64 = x.iter().map(|a| a * a).sum();
    let sum_y2: f64 = y.iter().map(|b| b * b).sum();

    let numerator = n * sum_xy - sum_x * sum_y;
    let denominator = ((n * sum_x2 - sum_x.powi(2)) * (n * sum_y2 - sum_y.powi(2))).sqrt();

    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

/// Population mean and standard deviation.
fn mean_and_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }

    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt())
}
