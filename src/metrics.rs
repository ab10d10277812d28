// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Prometheus metrics for the node endpoint source.
//!
//! All metrics use the namespace prefix `nodedns`.
//!
//! # Metrics Categories
//!
//! - **Derivation Metrics** - Track derivation passes, their outcome and duration
//! - **Node Metrics** - Track nodes skipped by the eligibility checks
//! - **Endpoint Metrics** - Track the endpoints produced by the last pass
//!
//! # Example
//!
//! ```rust,no_run
//! use nodedns::metrics::{gather_metrics, record_node_skipped};
//!
//! record_node_skipped("unschedulable");
//! println!("{}", gather_metrics().unwrap());
//! ```

use prometheus::{
    CounterVec, Encoder, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use std::collections::BTreeMap;
use std::sync::LazyLock;
use std::time::Duration;

use crate::endpoint::Endpoint;

// ============================================================================
// Metric Name Constants
// ============================================================================

/// Namespace prefix for all metrics (prometheus-safe)
const METRICS_NAMESPACE: &str = "nodedns";

// ============================================================================
// Global Metrics Registry
// ============================================================================

/// Global Prometheus metrics registry
pub static METRICS_REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// ============================================================================
// Derivation Metrics
// ============================================================================

/// Total number of derivation passes by outcome
///
/// Labels:
/// - `status`: Outcome (`success`, `error`)
pub static DERIVATIONS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_derivations_total"),
        "Total number of endpoint derivation passes by status",
    );
    let counter = CounterVec::new(opts, &["status"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Duration of derivation passes in seconds
///
/// Labels:
/// - `status`: Outcome (`success`, `error`)
pub static DERIVATION_DURATION_SECONDS: LazyLock<HistogramVec> = LazyLock::new(|| {
    let opts = HistogramOpts::new(
        format!("{METRICS_NAMESPACE}_derivation_duration_seconds"),
        "Duration of endpoint derivation passes in seconds",
    )
    .buckets(vec![0.0001, 0.001, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]);
    let histogram = HistogramVec::new(opts, &["status"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(histogram.clone()))
        .unwrap();
    histogram
});

/// Total number of failed derivation passes by error reason
///
/// Labels:
/// - `reason`: Error category (e.g., `template_execution`, `address_not_found`)
pub static DERIVATION_ERRORS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_derivation_errors_total"),
        "Total number of failed endpoint derivations by reason",
    );
    let counter = CounterVec::new(opts, &["reason"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

// ============================================================================
// Node Metrics
// ============================================================================

/// Total number of nodes skipped by the eligibility checks
///
/// Labels:
/// - `reason`: Why the node was skipped (`annotation_filter`, `controller_mismatch`,
///   `unschedulable`)
pub static NODES_SKIPPED_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_nodes_skipped_total"),
        "Total number of nodes skipped by reason",
    );
    let counter = CounterVec::new(opts, &["reason"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

// ============================================================================
// Endpoint Metrics
// ============================================================================

/// Number of endpoints produced by the most recent successful pass
///
/// Labels:
/// - `record_type`: DNS record type (`A`, `AAAA`, `CNAME`)
pub static ENDPOINTS_GENERATED: LazyLock<GaugeVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_endpoints_generated"),
        "Number of endpoints produced by the last derivation pass by record type",
    );
    let gauge = GaugeVec::new(opts, &["record_type"]).unwrap();
    METRICS_REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

// ============================================================================
// Helper Functions
// ============================================================================

/// Record a node skipped by the eligibility checks
///
/// # Arguments
/// * `reason` - Why the node was skipped
pub fn record_node_skipped(reason: &str) {
    NODES_SKIPPED_TOTAL.with_label_values(&[reason]).inc();
}

/// Record a successful derivation pass
///
/// # Arguments
/// * `duration` - Duration of the pass
/// * `endpoints` - Endpoints the pass produced
pub fn record_derivation_success(duration: Duration, endpoints: &[Endpoint]) {
    DERIVATIONS_TOTAL.with_label_values(&["success"]).inc();
    DERIVATION_DURATION_SECONDS
        .with_label_values(&["success"])
        .observe(duration.as_secs_f64());

    let mut by_type: BTreeMap<&str, f64> = BTreeMap::new();
    for endpoint in endpoints {
        *by_type.entry(endpoint.record_type.as_str()).or_default() += 1.0;
    }

    ENDPOINTS_GENERATED.reset();
    for (record_type, count) in by_type {
        ENDPOINTS_GENERATED
            .with_label_values(&[record_type])
            .set(count);
    }
}

/// Record a failed derivation pass
///
/// # Arguments
/// * `reason` - Error category, see [`crate::errors::SourceError::reason`]
/// * `duration` - Duration of the pass before failure
pub fn record_derivation_error(reason: &str, duration: Duration) {
    DERIVATIONS_TOTAL.with_label_values(&["error"]).inc();
    DERIVATION_DURATION_SECONDS
        .with_label_values(&["error"])
        .observe(duration.as_secs_f64());
    DERIVATION_ERRORS_TOTAL.with_label_values(&[reason]).inc();
}

/// Gather and encode all metrics in Prometheus text format
///
/// # Errors
/// Returns error if encoding fails
pub fn gather_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = METRICS_REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(format!("UTF-8 error: {e}")))
}
