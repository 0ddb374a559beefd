//! Prometheus metrics for the oracle poster.
//!
//! All metrics follow the naming convention: `oo_<component>_<metric>_<unit>`
//!
//! ## Metric Types
//!
//! - **Counter**: Monotonically increasing value (e.g., payloads_total)
//! - **Gauge**: Value that can go up or down (e.g., aggregate_value)
//! - **Histogram**: Distribution of values (e.g., submission_duration_seconds)

use lazy_static::lazy_static;
use prometheus::{
    exponential_buckets, CounterVec, Encoder, GaugeVec, Histogram, HistogramOpts, Opts, Registry,
    TextEncoder,
};
use std::sync::Once;

use crate::TelemetryError;

lazy_static! {
    /// Poster metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // PAYLOAD METRICS
    // =========================================================================

    /// Payloads processed by outcome
    pub static ref PAYLOADS_PROCESSED: CounterVec = CounterVec::new(
        Opts::new("oo_payloads_processed_total", "Payloads processed by the poster"),
        &["outcome"]  // outcome: eligible/stale/decode_failed/invalid_signature
    ).expect("metric creation failed");

    // =========================================================================
    // SUBMISSION METRICS
    // =========================================================================

    /// Write transactions by outcome
    pub static ref SUBMISSIONS: CounterVec = CounterVec::new(
        Opts::new("oo_submissions_total", "Write transactions submitted to the view contract"),
        &["outcome"]  // outcome: confirmed/rejected/timed_out/transport
    ).expect("metric creation failed");

    /// Time from broadcast to confirmation (or failure)
    pub static ref SUBMISSION_DURATION: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "oo_submission_duration_seconds",
            "Time spent waiting on write transactions"
        ).buckets(exponential_buckets(0.01, 2.0, 14).expect("valid buckets"))
    ).expect("metric creation failed");

    // =========================================================================
    // AGGREGATION METRICS
    // =========================================================================

    /// Aggregate recomputations by outcome
    pub static ref AGGREGATIONS: CounterVec = CounterVec::new(
        Opts::new("oo_aggregations_total", "Aggregate recomputations"),
        &["outcome"]  // outcome: updated/superseded/insufficient_data/failed
    ).expect("metric creation failed");

    /// Number of records behind the latest aggregate of each key
    pub static ref AGGREGATE_SOURCES: GaugeVec = GaugeVec::new(
        Opts::new("oo_aggregate_source_records", "Records used by the latest aggregate"),
        &["key"]
    ).expect("metric creation failed");
}

static REGISTER: Once = Once::new();

/// Handle proving the poster metrics are registered.
#[derive(Debug, Clone, Copy)]
pub struct MetricsHandle {
    _private: (),
}

/// Register all metrics with the poster registry.
///
/// Safe to call more than once; registration happens on the first call only.
pub fn register_metrics() -> Result<MetricsHandle, TelemetryError> {
    let mut result = Ok(());

    REGISTER.call_once(|| {
        let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
            Box::new(PAYLOADS_PROCESSED.clone()),
            Box::new(SUBMISSIONS.clone()),
            Box::new(SUBMISSION_DURATION.clone()),
            Box::new(AGGREGATIONS.clone()),
            Box::new(AGGREGATE_SOURCES.clone()),
        ];

        for metric in metrics {
            if let Err(e) = REGISTRY.register(metric) {
                result = Err(TelemetryError::MetricsInit(e.to_string()));
                return;
            }
        }
    });

    result.map(|_| MetricsHandle { _private: () })
}

/// Encode all poster metrics as Prometheus text format.
pub fn encode_metrics() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}

/// Timer guard for automatic histogram observation.
pub struct HistogramTimer {
    histogram: Histogram,
    start: std::time::Instant,
}

impl HistogramTimer {
    /// Start a new timer for the given histogram.
    pub fn new(histogram: &Histogram) -> Self {
        Self {
            histogram: histogram.clone(),
            start: std::time::Instant::now(),
        }
    }
}

impl Drop for HistogramTimer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        self.histogram.observe(duration);
    }
}
