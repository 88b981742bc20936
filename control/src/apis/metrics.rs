//! Controller metrics
//!
//! DAG build timings and outcomes, exported on the debug server's `/metrics`.

use crate::dag::BuildOutcome;
use lazy_static::lazy_static;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder,
};

lazy_static! {
    /// Controller metrics registry
    pub static ref CONTROLLER_METRICS_REGISTRY: Registry = Registry::new();

    /// DAG build duration
    static ref DAG_BUILD_DURATION: Histogram = {
        let opts = HistogramOpts::new(
            "dag_build_duration_seconds",
            "DAG build duration in seconds",
        )
        .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]);
        let histogram = Histogram::with_opts(opts).expect("Failed to create histogram");
        CONTROLLER_METRICS_REGISTRY
            .register(Box::new(histogram.clone()))
            .expect("Failed to register histogram");
        histogram
    };

    /// DAG builds total, by result
    static ref DAG_BUILDS_TOTAL: IntCounterVec = {
        let opts = Opts::new("dag_builds_total", "Total number of DAG builds");
        let counter = IntCounterVec::new(opts, &["result"]).expect("Failed to create counter");
        CONTROLLER_METRICS_REGISTRY
            .register(Box::new(counter.clone()))
            .expect("Failed to register counter");
        counter
    };

    /// Virtual hosts in the most recent DAG
    static ref DAG_VIRTUAL_HOSTS: IntGaugeVec = {
        let opts = Opts::new(
            "dag_virtual_hosts",
            "Number of virtual hosts in the current DAG",
        );
        let gauge = IntGaugeVec::new(opts, &["kind"]).expect("Failed to create gauge");
        CONTROLLER_METRICS_REGISTRY
            .register(Box::new(gauge.clone()))
            .expect("Failed to register gauge");
        gauge
    };

    /// Diagnostics recorded during DAG builds, by kind
    static ref DAG_DIAGNOSTICS_TOTAL: IntCounterVec = {
        let opts = Opts::new(
            "dag_diagnostics_total",
            "Total number of unresolved references found while building the DAG",
        );
        let counter = IntCounterVec::new(opts, &["kind"]).expect("Failed to create counter");
        CONTROLLER_METRICS_REGISTRY
            .register(Box::new(counter.clone()))
            .expect("Failed to register counter");
        counter
    };
}

/// Record one DAG build
pub fn record_dag_build(outcome: &BuildOutcome, duration_secs: f64) {
    DAG_BUILD_DURATION.observe(duration_secs);

    let result = if outcome.is_clean() { "clean" } else { "degraded" };
    DAG_BUILDS_TOTAL.with_label_values(&[result]).inc();

    DAG_VIRTUAL_HOSTS
        .with_label_values(&["insecure"])
        .set(outcome.dag.virtual_hosts.len() as i64);
    DAG_VIRTUAL_HOSTS
        .with_label_values(&["secure"])
        .set(outcome.dag.secure_virtual_hosts.len() as i64);

    for diagnostic in &outcome.diagnostics {
        DAG_DIAGNOSTICS_TOTAL
            .with_label_values(&[diagnostic.kind.as_str()])
            .inc();
    }
}

/// Gather controller metrics
pub fn gather_controller_metrics() -> Result<String, String> {
    let mut buffer = vec![];
    let encoder = TextEncoder::new();
    let metric_families = CONTROLLER_METRICS_REGISTRY.gather();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| format!("Failed to encode metrics: {}", e))?;

    String::from_utf8(buffer).map_err(|e| format!("Failed to convert to UTF-8: {}", e))
}
