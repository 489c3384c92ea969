//! # Metrics
//!
//! Prometheus metrics for the endpoint discovery path.
//!
//! ## Metrics Exposed
//!
//! - `echo_harness_discoveries_total` - Endpoint discoveries started
//! - `echo_harness_discovery_errors_total` - Endpoint discoveries that failed
//! - `echo_harness_batch_duration_seconds` - Duration of batch initializations
//! - `echo_harness_workloads_active` - Workloads currently committed to instances

use prometheus::{Encoder, Histogram, IntCounter, IntGauge, Registry, TextEncoder};
use std::sync::LazyLock;

// Metrics
pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static DISCOVERIES_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "echo_harness_discoveries_total",
        "Total number of endpoint discoveries started",
    )
    .expect("Failed to create DISCOVERIES_TOTAL metric - this should never happen")
});

static DISCOVERY_ERRORS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "echo_harness_discovery_errors_total",
        "Total number of endpoint discoveries that failed",
    )
    .expect("Failed to create DISCOVERY_ERRORS_TOTAL metric - this should never happen")
});

static BATCH_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "echo_harness_batch_duration_seconds",
            "Duration of batch initializations in seconds",
        )
        .buckets(vec![0.1, 0.5, 1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0]),
    )
    .expect("Failed to create BATCH_DURATION metric - this should never happen")
});

static WORKLOADS_ACTIVE: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "echo_harness_workloads_active",
        "Current number of workloads committed to echo instances",
    )
    .expect("Failed to create WORKLOADS_ACTIVE metric - this should never happen")
});

/// Register all metrics with the harness registry
///
/// Registering twice is not an error.
pub fn register_metrics() -> prometheus::Result<()> {
    let collectors: [Box<dyn prometheus::core::Collector>; 4] = [
        Box::new(DISCOVERIES_TOTAL.clone()),
        Box::new(DISCOVERY_ERRORS_TOTAL.clone()),
        Box::new(BATCH_DURATION.clone()),
        Box::new(WORKLOADS_ACTIVE.clone()),
    ];
    for collector in collectors {
        match REGISTRY.register(collector) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Render the registry in the Prometheus text format
pub fn gather_text() -> prometheus::Result<String> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&REGISTRY.gather(), &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

pub fn increment_discoveries() {
    DISCOVERIES_TOTAL.inc();
}

pub fn increment_discovery_errors(count: usize) {
    DISCOVERY_ERRORS_TOTAL.inc_by(count as u64);
}

pub fn observe_batch_duration(duration: f64) {
    BATCH_DURATION.observe(duration);
}

pub fn add_active_workloads(count: usize) {
    WORKLOADS_ACTIVE.add(i64::try_from(count).unwrap_or(i64::MAX));
}

pub fn remove_active_workloads(count: usize) {
    WORKLOADS_ACTIVE.sub(i64::try_from(count).unwrap_or(i64::MAX));
}
