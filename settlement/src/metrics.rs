//! Prometheus metrics for the settlement engine
//!
//! # Metrics
//!
//! - `settlement_payments_created_total` - Payments created
//! - `settlement_transitions_total{to}` - Status transitions by target status
//! - `settlement_netting_passes_total{kind}` - Applied netting passes
//! - `settlement_payments_netted_total` - Payments settled by netting
//! - `settlement_netting_skipped_total` - Scheduled passes with nothing to net
//! - `settlement_records_skipped_total` - Malformed records skipped during scans
//! - `settlement_event_failures_total` - Events the sink rejected
//! - `settlement_netting_duration_seconds` - Calculate + apply latency

use crate::Result;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct SettlementMetrics {
    /// Payments created
    pub payments_created: IntCounter,

    /// Status transitions, labelled by target status
    pub transitions: IntCounterVec,

    /// Applied netting passes, labelled `bilateral` / `multilateral`
    pub netting_passes: IntCounterVec,

    /// Payments settled by netting
    pub payments_netted: IntCounter,

    /// Scheduled passes with nothing to net
    pub netting_skipped: IntCounter,

    /// Malformed records skipped
    pub records_skipped: IntCounter,

    /// Events the sink rejected
    pub event_failures: IntCounter,

    /// Netting latency
    pub netting_duration: Histogram,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl SettlementMetrics {
    /// Create new metrics collector
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());

        let payments_created = IntCounter::new(
            "settlement_payments_created_total",
            "Total number of payments created",
        )?;
        registry.register(Box::new(payments_created.clone()))?;

        let transitions = IntCounterVec::new(
            Opts::new("settlement_transitions_total", "Payment status transitions"),
            &["to"],
        )?;
        registry.register(Box::new(transitions.clone()))?;

        let netting_passes = IntCounterVec::new(
            Opts::new("settlement_netting_passes_total", "Applied netting passes"),
            &["kind"],
        )?;
        registry.register(Box::new(netting_passes.clone()))?;

        let payments_netted = IntCounter::new(
            "settlement_payments_netted_total",
            "Payments settled by netting",
        )?;
        registry.register(Box::new(payments_netted.clone()))?;

        let netting_skipped = IntCounter::new(
            "settlement_netting_skipped_total",
            "Scheduled netting passes with nothing to net",
        )?;
        registry.register(Box::new(netting_skipped.clone()))?;

        let records_skipped = IntCounter::new(
            "settlement_records_skipped_total",
            "Malformed records skipped during scans",
        )?;
        registry.register(Box::new(records_skipped.clone()))?;

        let event_failures = IntCounter::new(
            "settlement_event_failures_total",
            "Events rejected by the event sink",
        )?;
        registry.register(Box::new(event_failures.clone()))?;

        let netting_duration = Histogram::with_opts(
            HistogramOpts::new(
                "settlement_netting_duration_seconds",
                "Netting calculate + apply latency",
            )
            .buckets(vec![0.001, 0.005, 0.010, 0.050, 0.100, 0.500, 1.0, 5.0]),
        )?;
        registry.register(Box::new(netting_duration.clone()))?;

        Ok(Self {
            payments_created,
            transitions,
            netting_passes,
            payments_netted,
            netting_skipped,
            records_skipped,
            event_failures,
            netting_duration,
            registry,
        })
    }

    /// Record a status transition
    pub fn record_transition(&self, to: &str) {
        self.transitions.with_label_values(&[to]).inc();
    }

    /// Record an applied netting pass
    pub fn record_netting_pass(&self, kind: &str, payments: usize) {
        self.netting_passes.with_label_values(&[kind]).inc();
        self.payments_netted.inc_by(payments as u64);
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Text exposition of every metric
    pub fn render(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| crate::Error::Other(e.to_string()))
    }
}

impl std::fmt::Debug for SettlementMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettlementMetrics")
            .field("payments_created", &self.payments_created.get())
            .field("payments_netted", &self.payments_netted.get())
            .finish()
    }
}
